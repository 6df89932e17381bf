//! Resizing whole animations to a fixed canvas

use crate::error::{Error, GifResult};
use crate::frame::{contiguous, Frame, FrameSequence, ImgVec, RGBA8};
use log::debug;

const DITHER: [u8; 64] = [
 0*2+8,48*2+8,12*2+8,60*2+8, 3*2+8,51*2+8,15*2+8,63*2+8,
32*2+8,16*2+8,44*2+8,28*2+8,35*2+8,19*2+8,47*2+8,31*2+8,
 8*2+8,56*2+8, 4*2+8,52*2+8,11*2+8,59*2+8, 7*2+8,55*2+8,
40*2+8,24*2+8,36*2+8,20*2+8,43*2+8,27*2+8,39*2+8,23*2+8,
 2*2+8,50*2+8,14*2+8,62*2+8, 1*2+8,49*2+8,13*2+8,61*2+8,
34*2+8,18*2+8,46*2+8,30*2+8,33*2+8,17*2+8,45*2+8,29*2+8,
10*2+8,58*2+8, 6*2+8,54*2+8, 9*2+8,57*2+8, 5*2+8,53*2+8,
42*2+8,26*2+8,38*2+8,22*2+8,41*2+8,25*2+8,37*2+8,21*2+8];

/// Resizes every frame to exactly `width`×`height`.
///
/// Aspect ratio is not preserved. All frames go through the same Lanczos3
/// resizer, and partially transparent pixels produced by resampling are
/// turned back into fully transparent or fully opaque ones with an ordered
/// dither (the pattern is fixed, so it doesn't shimmer between frames).
///
/// Returns the input untouched if it already has the requested size.
pub fn normalize(seq: FrameSequence, width: usize, height: usize) -> GifResult<FrameSequence> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidParameter(format!("Can't resize to {}×{}", width, height)));
    }
    let (src_width, src_height) = seq.check_canvas()?;
    if (src_width, src_height) == (width, height) {
        return Ok(seq);
    }
    debug!("resizing {} frames from {}×{} to {}×{}", seq.frames.len(), src_width, src_height, width, height);

    let mut r = resize::new(src_width, src_height, width, height, resize::Pixel::RGBA8P, resize::Type::Lanczos3)?;
    let FrameSequence { frames, repeat } = seq;
    let frames = frames.into_iter().map(|frame| -> GifResult<Frame> {
        let src = if frame.image.width() == frame.image.stride() {
            frame.image.into_buf()
        } else {
            contiguous(frame.image.as_ref())
        };
        let mut dst = vec![RGBA8::new(0, 0, 0, 0); width * height];
        r.resize(&src, &mut dst)?;
        let mut image = ImgVec::new(dst, width, height);
        binarize_alpha(&mut image);
        Ok(Frame::new(image, frame.delay_ms))
    }).collect::<GifResult<Vec<_>>>()?;

    Ok(FrameSequence { frames, repeat })
}

/// Makes transparency binary
pub(crate) fn binarize_alpha(image: &mut ImgVec<RGBA8>) {
    for (y, row) in image.rows_mut().enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            if px.a < 255 {
                px.a = if px.a < DITHER[(y & 7) * 8 + (x & 7)] { 0 } else { 255 };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Repeat;

    fn solid(width: usize, height: usize, px: RGBA8, delay_ms: u32) -> Frame {
        Frame::new(ImgVec::new(vec![px; width * height], width, height), delay_ms)
    }

    #[test]
    fn same_size_is_untouched() {
        let seq = FrameSequence::new(vec![solid(240, 240, RGBA8::new(1, 2, 3, 255), 100)], Repeat::Infinite).unwrap();
        let out = normalize(seq.clone(), 240, 240).unwrap();
        assert!(out.frames[0].image.pixels().eq(seq.frames[0].image.pixels()));
    }

    #[test]
    fn resizes_all_frames_and_keeps_timing() {
        let seq = FrameSequence::new(vec![
            solid(100, 50, RGBA8::new(200, 10, 10, 255), 120),
            solid(100, 50, RGBA8::new(10, 200, 10, 255), 40),
        ], Repeat::Finite(5)).unwrap();
        let out = normalize(seq, 240, 240).unwrap();
        assert_eq!(out.canvas_size(), (240, 240));
        assert_eq!(out.frames.iter().map(|f| f.delay_ms).collect::<Vec<_>>(), [120, 40]);
        assert_eq!(out.repeat, Repeat::Finite(5));
        // a flat color stays flat
        let px = out.frames[0].image.buf()[240 * 120 + 120];
        assert!((i32::from(px.r) - 200).abs() <= 1, "{:?}", px);
        assert_eq!(px.a, 255);
    }

    #[test]
    fn alpha_ends_up_binary() {
        let mut pixels = vec![RGBA8::new(255, 255, 255, 255); 16 * 16];
        for px in pixels.iter_mut().step_by(2) {
            *px = RGBA8::new(0, 0, 0, 0);
        }
        let seq = FrameSequence::new(vec![Frame::new(ImgVec::new(pixels, 16, 16), 100)], Repeat::Infinite).unwrap();
        let out = normalize(seq, 37, 23).unwrap();
        assert!(out.frames[0].image.pixels().all(|px| px.a == 0 || px.a == 255));
    }

    #[test]
    fn zero_target_is_invalid() {
        let seq = FrameSequence::new(vec![solid(2, 2, RGBA8::default(), 0)], Repeat::Infinite).unwrap();
        assert!(matches!(normalize(seq, 0, 240), Err(Error::InvalidParameter(_))));
    }
}
