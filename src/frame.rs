//! Decoded animation frames
//!
//! Frames are always fully color-resolved RGBA at canvas size, so the
//! geometry and pixel operations never have to care about palettes.
//! Alpha 0 marks transparent pixels.

pub use gif::Repeat;
pub use imgref::{ImgRef, ImgVec};
pub use rgb::RGBA8;

use crate::error::{Error, GifResult};

/// One full-canvas frame of an animation
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: ImgVec<RGBA8>,
    /// How long this frame stays on screen, in milliseconds.
    /// GIF stores this in centiseconds; see [`Frame::wire_delay`].
    pub delay_ms: u32,
}

impl Frame {
    #[inline]
    pub fn new(image: ImgVec<RGBA8>, delay_ms: u32) -> Self {
        Self { image, delay_ms }
    }

    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.image.width(), self.image.height())
    }

    /// Delay in GIF centiseconds, rounded to nearest and saturated.
    #[inline]
    pub fn wire_delay(&self) -> u16 {
        let cs = self.delay_ms.saturating_add(5) / 10;
        cs.min(u32::from(u16::MAX)) as u16
    }
}

/// Ordered frames of one animation plus its loop count
///
/// `Repeat::Infinite` is written as loop count 0 in the file;
/// `Repeat::Finite(0)` means the animation plays once.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    pub frames: Vec<Frame>,
    pub repeat: Repeat,
}

impl FrameSequence {
    /// Fails if there are no frames or their sizes differ
    pub fn new(frames: Vec<Frame>, repeat: Repeat) -> GifResult<Self> {
        let seq = Self { frames, repeat };
        seq.check_canvas()?;
        Ok(seq)
    }

    /// Width and height shared by all frames
    pub fn canvas_size(&self) -> (usize, usize) {
        self.frames.first().map_or((0, 0), Frame::size)
    }

    /// Verifies the sequence is non-empty and every frame has the canvas size
    pub fn check_canvas(&self) -> GifResult<(usize, usize)> {
        let first = self.frames.first().ok_or_else(|| Error::Encode("Found no usable frames to encode".into()))?;
        let (width, height) = first.size();
        for (i, frame) in self.frames.iter().enumerate().skip(1) {
            if frame.size() != (width, height) {
                return Err(Error::Encode(format!("Frame {} has wrong size ({}×{}, expected {}×{})", i + 1,
                    frame.image.width(), frame.image.height(), width, height)));
            }
        }
        Ok((width, height))
    }

    pub fn total_delay_ms(&self) -> u64 {
        self.frames.iter().map(|f| u64::from(f.delay_ms)).sum()
    }

    /// Applies `f` to every frame's pixels, keeping timing untouched
    pub(crate) fn map_images(mut self, mut f: impl FnMut(&mut ImgVec<RGBA8>)) -> Self {
        for frame in &mut self.frames {
            f(&mut frame.image);
        }
        self
    }
}

/// Copies the image into a buffer with no row padding
pub(crate) fn contiguous(image: ImgRef<'_, RGBA8>) -> Vec<RGBA8> {
    let mut contig = Vec::with_capacity(image.width() * image.height());
    contig.extend(image.rows().flat_map(|r| r.iter().copied()));
    contig
}
