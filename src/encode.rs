//! Writing frames back to GIF bytes

use crate::error::GifResult;
use crate::frame::{contiguous, Frame, FrameSequence, ImgRef, Repeat, RGBA8};
use crate::minipool;
use crate::Settings;
use imagequant::Attributes;
use log::debug;
use std::collections::HashMap;

/// Pixels with less alpha than this become the transparent color
pub const ALPHA_THRESHOLD: u8 = 128;

/// Encodes the sequence as a looping GIF.
///
/// Every frame is written as a full-canvas image with its own palette and
/// "restore to background" disposal. Frames with up to 256 distinct colors
/// keep their exact colors; busier frames are quantized with libimagequant,
/// so the output palette is generally not the input's.
pub fn encode(seq: &FrameSequence, settings: &Settings) -> GifResult<Vec<u8>> {
    let (width, height) = seq.check_canvas()?;
    let screen_width = u16::try_from(width)?;
    let screen_height = u16::try_from(height)?;

    let frames = minipool::map_ordered(settings.thread_count(), "quant", seq.frames.iter().collect(), |frame| {
        compress_frame(frame, settings)
    })?;

    let mut out = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut out, screen_width, screen_height, &[])?;
        if let Some(ext) = loop_extension(seq.repeat) {
            enc.write_extension(ext)?;
        }
        for frame in &frames {
            enc.write_lzw_pre_encoded_frame(frame)?;
        }
    }
    debug!("encoded {} frames, {}×{}, {} bytes", frames.len(), width, height, out.len());
    Ok(out)
}

/// The NETSCAPE block stores 0 for "forever", so playing once must have no block at all
fn loop_extension(repeat: Repeat) -> Option<gif::ExtensionData> {
    match repeat {
        Repeat::Finite(0) => None,
        r => Some(gif::ExtensionData::Repetitions(r)),
    }
}

#[inline(never)]
fn compress_frame(f: &Frame, settings: &Settings) -> GifResult<gif::Frame<'static>> {
    let image = f.image.as_ref();
    let (indices, pal) = match exact_palette(image) {
        Some(res) => res,
        None => quantize(image, settings)?,
    };
    let transparent = pal.iter().position(|p| p.a == 0).map(|i| i as u8);

    let mut pal_rgb: Vec<u8> = pal.iter().flat_map(|p| [p.r, p.g, p.b]).collect();
    // Palette should be power-of-two sized
    let needed_size = 3 * pal.len().max(2).next_power_of_two();
    pal_rgb.resize(needed_size, 0);

    let mut frame = gif::Frame {
        delay: f.wire_delay(),
        dispose: gif::DisposalMethod::Background,
        transparent,
        width: u16::try_from(image.width())?,
        height: u16::try_from(image.height())?,
        palette: Some(pal_rgb),
        buffer: indices.into(),
        ..gif::Frame::default()
    };
    frame.make_lzw_pre_encoded();
    Ok(frame)
}

#[inline]
fn palette_color(px: RGBA8) -> RGBA8 {
    if px.a < ALPHA_THRESHOLD {
        RGBA8::new(0, 0, 0, 0)
    } else {
        RGBA8::new(px.r, px.g, px.b, 255)
    }
}

/// Palette made of the frame's own colors, if they fit in 256 entries
fn exact_palette(image: ImgRef<'_, RGBA8>) -> Option<(Vec<u8>, Vec<RGBA8>)> {
    let mut pal = Vec::new();
    let mut lookup = HashMap::new();
    let mut indices = Vec::with_capacity(image.width() * image.height());
    for px in image.pixels() {
        let color = palette_color(px);
        let idx = match lookup.get(&color) {
            Some(&idx) => idx,
            None => {
                if pal.len() == 256 {
                    return None;
                }
                let idx = pal.len() as u8;
                pal.push(color);
                lookup.insert(color, idx);
                idx
            },
        };
        indices.push(idx);
    }
    Some((indices, pal))
}

fn quantize(image: ImgRef<'_, RGBA8>, settings: &Settings) -> GifResult<(Vec<u8>, Vec<RGBA8>)> {
    let mut liq = Attributes::new();
    if settings.fast {
        liq.set_speed(10)?;
    }
    liq.set_quality(0, settings.quality)?;

    let mut pixels = contiguous(image);
    let mut has_transparency = false;
    for px in &mut pixels {
        *px = palette_color(*px);
        has_transparency |= px.a == 0;
    }

    let mut img = liq.new_image_borrowed(&pixels, image.width(), image.height(), 0.)?;
    if has_transparency {
        img.add_fixed_color(RGBA8::new(0, 0, 0, 0))?;
    }
    let mut res = liq.quantize(&mut img)?;
    res.set_dithering_level(0.5)?;

    let (pal, pal_img) = res.remapped(&mut img)?;
    debug_assert_eq!(img.width() * img.height(), pal_img.len());
    Ok((pal_img, pal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::decode::decode;
    use crate::frame::ImgVec;

    fn gradient(width: usize, height: usize, shift: u8, delay_ms: u32) -> Frame {
        let buf = (0..height).flat_map(|y| (0..width).map(move |x| {
            RGBA8::new((x * 255 / width) as u8, (y * 255 / height) as u8, shift, 255)
        })).collect();
        Frame::new(ImgVec::new(buf, width, height), delay_ms)
    }

    #[test]
    fn round_trip_keeps_timing_and_size() {
        let seq = FrameSequence::new(vec![
            gradient(40, 30, 0, 500),
            gradient(40, 30, 100, 120),
            gradient(40, 30, 200, 30),
        ], Repeat::Infinite).unwrap();
        let bytes = encode(&seq, &Settings::default()).unwrap();
        let again = decode(&bytes).unwrap();
        assert_eq!(again.frames.len(), 3);
        assert_eq!(again.canvas_size(), (40, 30));
        assert_eq!(again.frames.iter().map(|f| f.delay_ms).collect::<Vec<_>>(), [500, 120, 30]);
        assert_eq!(again.repeat, Repeat::Infinite);
    }

    #[test]
    fn loop_count_survives() {
        for repeat in [Repeat::Finite(0), Repeat::Finite(1), Repeat::Finite(7), Repeat::Infinite] {
            let seq = FrameSequence::new(vec![gradient(4, 4, 0, 100)], repeat).unwrap();
            let again = decode(&encode(&seq, &Settings::default()).unwrap()).unwrap();
            assert_eq!(again.repeat, repeat);
        }
    }

    #[test]
    fn few_colors_are_kept_exactly() {
        let a = RGBA8::new(12, 34, 56, 255);
        let b = RGBA8::new(200, 100, 0, 255);
        let seq = FrameSequence::new(vec![Frame::new(ImgVec::new(vec![a, b, b, a], 2, 2), 100)], Repeat::Infinite).unwrap();
        let again = decode(&encode(&seq, &Settings::default()).unwrap()).unwrap();
        assert_eq!(again.frames[0].image.pixels().collect::<Vec<_>>(), [a, b, b, a]);
    }

    #[test]
    fn transparency_survives() {
        let clear = RGBA8::new(90, 90, 90, 0);
        let red = RGBA8::new(255, 0, 0, 255);
        let seq = FrameSequence::new(vec![
            Frame::new(ImgVec::new(vec![red, clear, clear, red], 2, 2), 100),
            Frame::new(ImgVec::new(vec![clear, red, red, clear], 2, 2), 100),
        ], Repeat::Infinite).unwrap();
        let again = decode(&encode(&seq, &Settings::default()).unwrap()).unwrap();
        let alpha: Vec<Vec<u8>> = again.frames.iter().map(|f| f.image.pixels().map(|p| p.a).collect()).collect();
        assert_eq!(alpha, [vec![255, 0, 0, 255], vec![0, 255, 255, 0]]);
    }

    #[test]
    fn many_colors_are_quantized() {
        // 64×64 gradient has far more than 256 colors
        let seq = FrameSequence::new(vec![gradient(64, 64, 50, 100)], Repeat::Infinite).unwrap();
        assert!(exact_palette(seq.frames[0].image.as_ref()).is_none());
        let again = decode(&encode(&seq, &Settings { fast: true, ..Settings::default() }).unwrap()).unwrap();
        let diff = again.frames[0].image.pixels().zip(seq.frames[0].image.pixels())
            .map(|(a, b)| (i32::from(a.r) - i32::from(b.r)).abs() + (i32::from(a.g) - i32::from(b.g)).abs())
            .max().unwrap();
        assert!(diff < 40, "{}", diff);
    }

    #[test]
    fn mismatched_frames_fail() {
        let seq = FrameSequence { frames: vec![gradient(4, 4, 0, 10), gradient(5, 4, 0, 10)], repeat: Repeat::Infinite };
        assert!(matches!(encode(&seq, &Settings::default()), Err(Error::Encode(_))));
    }

    #[test]
    fn oversized_canvas_fails() {
        let seq = FrameSequence { frames: vec![gradient(70000, 1, 0, 10)], repeat: Repeat::Infinite };
        assert!(matches!(encode(&seq, &Settings::default()), Err(Error::Encode(_))));
    }
}
