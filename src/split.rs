//! Cutting side-by-side (2:1) animations into two square ones

use crate::frame::{Frame, FrameSequence, ImgRef, ImgVec, RGBA8};
use log::debug;

/// Result of [`maybe_split`]
#[derive(Debug, Clone)]
pub enum Split {
    Single(FrameSequence),
    /// Left and right halves
    Dual(FrameSequence, FrameSequence),
}

impl Split {
    pub fn into_vec(self) -> Vec<FrameSequence> {
        match self {
            Self::Single(seq) => vec![seq],
            Self::Dual(left, right) => vec![left, right],
        }
    }
}

/// True if `width / height` is 2, give or take `tolerance`.
///
/// With zero tolerance this is an exact `width == 2 * height` test.
pub fn is_dual_panel(width: usize, height: usize, tolerance: f64) -> bool {
    if height == 0 {
        return false;
    }
    if width == 2 * height {
        return true;
    }
    tolerance > 0. && (width as f64 / height as f64 - 2.).abs() <= tolerance
}

/// Column where the left panel ends. Odd widths give the extra column to the right panel.
#[inline]
pub fn split_point(width: usize) -> usize {
    width / 2
}

/// Splits a dual-panel animation into its left and right halves.
///
/// Both halves keep every frame's delay and the loop count. Anything that
/// isn't (nearly) 2:1 comes back unchanged as [`Split::Single`].
pub fn maybe_split(seq: FrameSequence, tolerance: f64) -> Split {
    let (width, height) = seq.canvas_size();
    if !is_dual_panel(width, height, tolerance) {
        return Split::Single(seq);
    }
    let mid = split_point(width);
    debug!("splitting {}×{} at x={}", width, height, mid);

    let (left, right): (Vec<_>, Vec<_>) = seq.frames.iter().map(|frame| {
        let img = frame.image.as_ref();
        (Frame::new(columns(img, 0, mid), frame.delay_ms), Frame::new(columns(img, mid, width), frame.delay_ms))
    }).unzip();

    Split::Dual(
        FrameSequence { frames: left, repeat: seq.repeat },
        FrameSequence { frames: right, repeat: seq.repeat },
    )
}

fn columns(img: ImgRef<'_, RGBA8>, start: usize, end: usize) -> ImgVec<RGBA8> {
    let mut buf = Vec::with_capacity((end - start) * img.height());
    buf.extend(img.rows().flat_map(|row| row[start..end].iter().copied()));
    ImgVec::new(buf, end - start, img.height())
}
