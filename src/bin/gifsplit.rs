#[macro_use] extern crate clap;

use clap::{Arg, ArgAction, ArgMatches, Command};
use gifsplit::{ArtifactStore, Engine, Settings, Transform};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

const DEFAULT_OUT_DIR: &str = "processed_gifs";

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {}", e);
        if let Some(e) = e.source() {
            eprintln!("error: {}", e);
        }
        std::process::exit(1);
    }
}

fn out_arg() -> Arg {
    Arg::new("out")
        .long("out")
        .short('o')
        .value_name("dir")
        .default_value(DEFAULT_OUT_DIR)
        .help("Directory holding processed GIFs")
}

fn key_arg() -> Arg {
    Arg::new("KEY")
        .required(true)
        .help("Artifact key printed by `process`")
}

fn bin_main() -> BinResult<()> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("Squares, splits, flips and recolors animated GIFs")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(Arg::new("verbose")
            .long("verbose")
            .short('v')
            .global(true)
            .action(ArgAction::Count)
            .help("More log output; repeat for more detail (RUST_LOG overrides)"))
        .arg(Arg::new("lock-timeout")
            .long("lock-timeout")
            .global(true)
            .value_name("secs")
            .default_value("10")
            .help("Give up waiting for another edit of the same artifact after this long"))
        .subcommand(Command::new("process")
            .about("Squares a GIF, splitting 2:1 animations in two, and stores the results")
            .arg(Arg::new("FILE")
                .required(true)
                .help("GIF file to process"))
            .arg(out_arg())
            .arg(Arg::new("side")
                .long("side")
                .value_name("px")
                .default_value("240")
                .help("Width and height of the outputs"))
            .arg(Arg::new("split-tolerance")
                .long("split-tolerance")
                .value_name("ratio")
                .default_value("0")
                .help("Also split animations whose width/height is this close to 2"))
            .arg(Arg::new("quality")
                .long("quality")
                .short('Q')
                .value_name("1-100")
                .default_value("100")
                .help("Quantization quality for frames with more than 256 colors"))
            .arg(Arg::new("fast")
                .long("fast")
                .action(ArgAction::SetTrue)
                .help("Faster quantization, slightly worse colors")))
        .subcommand(Command::new("flip")
            .about("Mirrors a stored GIF left to right (run again to undo)")
            .arg(key_arg())
            .arg(out_arg()))
        .subcommand(Command::new("swap")
            .about("Permutes the color channels of a stored GIF")
            .arg(key_arg())
            .arg(Arg::new("PERM")
                .required(true)
                .help("New channel order: rgb, rbg, grb, gbr, brg or bgr"))
            .arg(out_arg()))
        .subcommand(Command::new("export")
            .about("Copies the current state of a stored GIF to a file")
            .arg(key_arg())
            .arg(Arg::new("DEST")
                .required(true)
                .help("Destination file"))
            .arg(out_arg()))
        .get_matches();

    init_logging(matches.get_count("verbose"));

    let mut settings = Settings {
        lock_timeout: parse_lock_timeout(value(&matches, "lock-timeout")?)?,
        ..Settings::default()
    };

    match matches.subcommand() {
        Some(("process", m)) => {
            settings.side = parse_arg(m, "side").map_err(|_| "Invalid side")?;
            settings.split_tolerance = parse_arg(m, "split-tolerance").map_err(|_| "Invalid split tolerance")?;
            settings.quality = parse_arg(m, "quality").map_err(|_| "Invalid quality")?;
            settings.fast = m.get_flag("fast");
            check_side(settings.side)?;
            if settings.quality < 1 || settings.quality > 100 {
                return Err("Quality must be between 1 and 100".into());
            }

            let path = PathBuf::from(value(m, "FILE")?);
            let data = fs::read(&path).map_err(|e| format!("Can't read {}: {}", path.display(), e))?;
            let engine = open_engine(m, settings)?;
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            for artifact in engine.upload_file(filename, &data)? {
                println!("{}\t{}\t{}", artifact.key, artifact.duration_seconds, artifact.default_filename);
            }
        },
        Some(("flip", m)) => {
            open_engine(m, settings)?.apply(value(m, "KEY")?, Transform::FlipHorizontal)?;
        },
        Some(("swap", m)) => {
            open_engine(m, settings)?.request(value(m, "KEY")?, "swap", Some(value(m, "PERM")?))?;
        },
        Some(("export", m)) => {
            let data = open_engine(m, settings)?.fetch(value(m, "KEY")?)?;
            let dest = Path::new(value(m, "DEST")?);
            fs::write(dest, data).map_err(|e| format!("Can't write to {}: {}", dest.display(), e))?;
        },
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}

/// Seconds, fractions allowed. Rejects values that don't fit a `Duration`.
fn parse_lock_timeout(secs: &str) -> BinResult<Duration> {
    let secs: f64 = secs.parse().map_err(|_| "Invalid lock timeout")?;
    Ok(Duration::try_from_secs_f64(secs).map_err(|_| "Invalid lock timeout")?)
}

/// Upper bound for any GIF canvas; dual-panel uploads are further limited by the library
fn check_side(side: u32) -> BinResult<()> {
    if side == 0 || side > u32::from(u16::MAX) {
        return Err(format!("Side must be between 1 and {} pixels", u16::MAX).into());
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn open_engine(m: &ArgMatches, settings: Settings) -> BinResult<Engine> {
    let dir = value(m, "out")?;
    let store = ArtifactStore::in_dir(dir, settings.lock_timeout)
        .map_err(|e| format!("Can't use {} for output: {}", dir, e))?;
    Ok(Engine::new(store, settings))
}

fn value<'a>(m: &'a ArgMatches, name: &str) -> BinResult<&'a str> {
    Ok(m.get_one::<String>(name).ok_or_else(|| format!("Missing {}", name))?.as_str())
}

fn parse_arg<T: std::str::FromStr>(m: &ArgMatches, name: &str) -> BinResult<T> {
    value(m, name)?.parse().map_err(|_| format!("Invalid {}", name).into())
}
