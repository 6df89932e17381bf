//! Reading GIF bytes into color-resolved frames

use crate::error::{Error, GifResult};
use crate::frame::{Frame, FrameSequence};
use log::debug;

const SIGNATURES: [&[u8; 6]; 2] = [b"GIF87a", b"GIF89a"];

/// Cheap check of the file signature
pub fn is_gif(data: &[u8]) -> bool {
    data.get(..6).map_or(false, |sig| SIGNATURES.iter().any(|s| &s[..] == sig))
}

/// Decodes every frame as it would appear on screen.
///
/// Each frame is composited onto the logical screen (honoring the previous
/// frame's disposal), so the result has one canvas-sized RGBA image per frame.
/// Delays are converted from centiseconds to milliseconds without loss.
pub fn decode(data: &[u8]) -> GifResult<FrameSequence> {
    if !is_gif(data) {
        return Err(Error::Decode("not a GIF file".into()));
    }

    let mut gif_opts = gif::DecodeOptions::new();
    // gif_dispose composites palette indices itself
    gif_opts.set_color_output(gif::ColorOutput::Indexed);

    let mut decoder = gif_opts.read_info(data)?;
    let mut screen = gif_dispose::Screen::new_decoder(&decoder);

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame()? {
        screen.blit_frame(frame)?;
        let pixels = screen.pixels_rgba().map_buf(|b| b.to_owned());
        frames.push(Frame::new(pixels, u32::from(frame.delay) * 10));
    }
    if frames.is_empty() {
        return Err(Error::Decode("GIF contains no frames".into()));
    }

    // The loop extension is only known once the frames have been read
    let seq = FrameSequence { frames, repeat: decoder.repeat() };
    let (width, height) = seq.canvas_size();
    debug!("decoded {} frames, {}×{}, {:?}", seq.frames.len(), width, height, seq.repeat);
    Ok(seq)
}
