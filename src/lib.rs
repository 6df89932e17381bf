/*
 gifsplit animated GIF normalizer and splitter

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
//! Square GIF stickers from arbitrary animated GIFs.
//!
//! An upload is decoded, resized to a fixed canvas, split in two if it is a
//! side-by-side (2:1) animation, and each result is stored under a new key.
//! Stored artifacts can then be flipped or have their color channels
//! swapped in place, any number of times.

mod error;
pub use crate::error::*;
mod minipool;

pub mod decode;
pub mod duration;
pub mod encode;
pub mod frame;
pub mod normalize;
pub mod split;
pub mod store;
pub mod transform;

pub use crate::decode::decode;
pub use crate::duration::{suggest_filename, total_duration};
pub use crate::encode::encode;
pub use crate::frame::{Frame, FrameSequence, Repeat};
pub use crate::normalize::normalize;
pub use crate::split::{maybe_split, Split};
pub use crate::store::{ArtifactStore, Backend, DirBackend, MemoryBackend};
pub use crate::transform::{flip_horizontal, swap_channels, RgbPermutation, Transform};

use log::{info, warn};
use std::path::Path;
use std::time::Duration;

/// Side of the square outputs, in pixels
pub const DEFAULT_SIDE: u32 = 240;

#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// Width and height of every output
    pub side: u32,
    /// How far from exactly 2:1 an upload may be and still get split
    pub split_tolerance: f64,
    /// Longest wait for another request editing the same artifact
    pub lock_timeout: Duration,
    /// 1-100, used only for frames with more than 256 colors
    pub quality: u8,
    /// Lower quality, but faster encode
    pub fast: bool,
    /// Threads for encoding frames; 0 picks one per core
    pub threads: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            side: DEFAULT_SIDE,
            split_tolerance: 0.,
            lock_timeout: Duration::from_secs(10),
            quality: 100,
            fast: false,
            threads: 0,
        }
    }
}

impl Settings {
    pub(crate) fn thread_count(&self) -> u8 {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().min(8) as u8)
            .unwrap_or(1)
    }

    /// Canvas the whole upload is resized to before splitting:
    /// two squares side by side for dual-panel uploads, one square otherwise
    pub fn canonical_canvas(&self, width: usize, height: usize) -> (usize, usize) {
        let side = self.side as usize;
        if split::is_dual_panel(width, height, self.split_tolerance) {
            (side.saturating_mul(2), side)
        } else {
            (side, side)
        }
    }
}

/// What the caller gets back for each stored output of an upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedArtifact {
    /// Stable key for later edits and downloads
    pub key: String,
    /// Length of the animation, one decimal
    pub duration_seconds: f64,
    /// Suggested download name, e.g. `happy_1_1_5s.gif`
    pub default_filename: String,
}

/// Base name for download names: `uploads/Happy.gif` → `Happy`
pub fn base_name_from_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("animation")
        .to_owned()
}

/// GIF stores the canvas width and height as 16-bit numbers
fn check_output_size(width: usize, height: usize) -> GifResult<()> {
    let max = usize::from(u16::MAX);
    if width == 0 || height == 0 || width > max || height > max {
        return Err(Error::InvalidParameter(format!("Output canvas {}×{} is outside the GIF limit of 1 to {} pixels", width, height, max)));
    }
    Ok(())
}

/// Only `.gif` uploads are accepted
pub fn check_upload_filename(filename: &str) -> GifResult<()> {
    if !filename.to_ascii_lowercase().ends_with(".gif") {
        return Err(Error::Decode(format!("Only GIF files are supported (got '{}')", filename)));
    }
    Ok(())
}

/// Decodes, resizes, splits and stores uploads; applies edits to stored artifacts
pub struct Engine {
    store: ArtifactStore,
    settings: Settings,
}

impl Engine {
    pub fn new(store: ArtifactStore, settings: Settings) -> Self {
        Self { store, settings }
    }

    /// Engine with an in-memory store
    pub fn in_memory(settings: Settings) -> Self {
        Self::new(ArtifactStore::in_memory(settings.lock_timeout), settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Like [`Engine::upload`], but checks the extension and derives the base name from `filename`
    pub fn upload_file(&self, filename: &str, data: &[u8]) -> GifResult<Vec<UploadedArtifact>> {
        check_upload_filename(filename)?;
        self.upload(data, &base_name_from_filename(filename))
    }

    /// Processes an uploaded GIF into one or two stored artifacts.
    ///
    /// Either every output is stored, or none is.
    pub fn upload(&self, data: &[u8], base_name: &str) -> GifResult<Vec<UploadedArtifact>> {
        let seq = decode::decode(data)?;
        let (width, height) = seq.canvas_size();

        let (target_width, target_height) = self.settings.canonical_canvas(width, height);
        check_output_size(target_width, target_height)?;
        let seq = normalize::normalize(seq, target_width, target_height)?;
        let outputs = split::maybe_split(seq, self.settings.split_tolerance).into_vec();

        let encoded = outputs.iter().enumerate().map(|(i, out)| -> GifResult<_> {
            let duration_seconds = total_duration(out);
            let bytes = encode::encode(out, &self.settings)?;
            Ok((bytes, duration_seconds, suggest_filename(base_name, duration_seconds, i + 1)))
        }).collect::<GifResult<Vec<_>>>()?;

        let mut created: Vec<UploadedArtifact> = Vec::with_capacity(encoded.len());
        for (bytes, duration_seconds, default_filename) in encoded {
            let key = store::new_key();
            if let Err(err) = self.store.create(&key, &bytes) {
                for done in &created {
                    if let Err(e) = self.store.remove(&done.key) {
                        warn!("couldn't roll back {}: {}", done.key, e);
                    }
                }
                return Err(err);
            }
            info!("stored {} as {} ({}s, {} bytes)", default_filename, key, duration_seconds, bytes.len());
            created.push(UploadedArtifact { key, duration_seconds, default_filename });
        }
        Ok(created)
    }

    /// Edits the artifact's current bytes in place.
    ///
    /// Concurrent edits of one artifact run one after another; a failed edit leaves it unchanged.
    pub fn apply(&self, key: &str, transform: Transform) -> GifResult<()> {
        let settings = &self.settings;
        self.store.update(key, |bytes| {
            let seq = decode::decode(&bytes)?;
            encode::encode(&transform.apply(seq), settings)
        })?;
        info!("applied {} to {}", transform, key);
        Ok(())
    }

    /// Parses and applies a `(kind, parameter)` transform request, e.g. `("swap", Some("gbr"))`
    pub fn request(&self, key: &str, kind: &str, parameter: Option<&str>) -> GifResult<()> {
        let transform = Transform::from_request(kind, parameter)?;
        self.apply(key, transform)
    }

    /// Current bytes of an artifact
    pub fn fetch(&self, key: &str) -> GifResult<Vec<u8>> {
        self.store.read(key)
    }
}
