//! Pixel-only edits: mirroring and channel relabeling
//!
//! Both leave frame delays, loop count and alpha alone, and both are exactly
//! reversible, so editing the stored artifact over and over can't drift.

use crate::error::{Error, GifResult};
use crate::frame::{FrameSequence, RGBA8};
use std::fmt;
use std::str::FromStr;

/// Which source channel feeds each of R, G, B
///
/// The name is read left to right as the new R, G, B: `Gbr` takes the new red
/// from the old green, new green from old blue, and new blue from old red.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RgbPermutation {
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl RgbPermutation {
    pub const ALL: [Self; 6] = [Self::Rgb, Self::Rbg, Self::Grb, Self::Gbr, Self::Brg, Self::Bgr];

    pub fn token(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Rbg => "rbg",
            Self::Grb => "grb",
            Self::Gbr => "gbr",
            Self::Brg => "brg",
            Self::Bgr => "bgr",
        }
    }

    /// Source channel index (0 = R, 1 = G, 2 = B) for each output channel
    pub fn sources(self) -> [usize; 3] {
        match self {
            Self::Rgb => [0, 1, 2],
            Self::Rbg => [0, 2, 1],
            Self::Grb => [1, 0, 2],
            Self::Gbr => [1, 2, 0],
            Self::Brg => [2, 0, 1],
            Self::Bgr => [2, 1, 0],
        }
    }

    /// The permutation that undoes this one
    pub fn inverse(self) -> Self {
        let src = self.sources();
        let mut inv = [0; 3];
        for (out, &from) in src.iter().enumerate() {
            inv[from] = out;
        }
        Self::ALL.into_iter().find(|p| p.sources() == inv).unwrap_or(Self::Rgb)
    }

    #[inline]
    pub fn is_identity(self) -> bool {
        self == Self::Rgb
    }

    #[inline]
    pub fn apply(self, px: RGBA8) -> RGBA8 {
        let ch = [px.r, px.g, px.b];
        let [r, g, b] = self.sources();
        RGBA8::new(ch[r], ch[g], ch[b], px.a)
    }
}

impl FromStr for RgbPermutation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.token() == token).ok_or_else(|| {
            Error::InvalidParameter(format!("Invalid RGB mapping '{}'; it must be a permutation of 'rgb', e.g. 'gbr'", s))
        })
    }
}

impl fmt::Display for RgbPermutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// An edit that can be applied to a stored artifact
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transform {
    FlipHorizontal,
    SwapChannels(RgbPermutation),
}

impl Transform {
    /// Parses the `(kind, parameter)` pair used by transform requests:
    /// `("flip", None)` or `("swap", Some("gbr"))`.
    pub fn from_request(kind: &str, parameter: Option<&str>) -> GifResult<Self> {
        match (kind.trim().to_ascii_lowercase().as_str(), parameter) {
            ("flip", None) => Ok(Self::FlipHorizontal),
            ("flip", Some(p)) => Err(Error::InvalidParameter(format!("flip takes no parameter (got '{}')", p))),
            ("swap", Some(p)) => Ok(Self::SwapChannels(p.parse()?)),
            ("swap", None) => Err(Error::InvalidParameter("swap needs a channel mapping such as 'gbr'".into())),
            (other, _) => Err(Error::InvalidParameter(format!("Unknown transform '{}'", other))),
        }
    }

    pub fn apply(self, seq: FrameSequence) -> FrameSequence {
        match self {
            Self::FlipHorizontal => flip_horizontal(seq),
            Self::SwapChannels(perm) => swap_channels(seq, perm),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlipHorizontal => f.write_str("flip"),
            Self::SwapChannels(p) => write!(f, "swap {}", p),
        }
    }
}

/// Mirrors every frame left to right
pub fn flip_horizontal(seq: FrameSequence) -> FrameSequence {
    seq.map_images(|image| {
        for row in image.rows_mut() {
            row.reverse();
        }
    })
}

/// Relabels color channels of every pixel; alpha is kept
pub fn swap_channels(seq: FrameSequence, perm: RgbPermutation) -> FrameSequence {
    if perm.is_identity() {
        return seq;
    }
    seq.map_images(|image| {
        for row in image.rows_mut() {
            for px in row {
                *px = perm.apply(*px);
            }
        }
    })
}
