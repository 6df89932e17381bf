//! Animation length and the download names derived from it

use crate::frame::FrameSequence;

/// Total length in tenths of a second, rounding half up
pub fn total_tenths(seq: &FrameSequence) -> u64 {
    (seq.total_delay_ms() + 50) / 100
}

/// Total length in seconds with one decimal (half rounds up: 1.25s → 1.3)
pub fn total_duration(seq: &FrameSequence) -> f64 {
    total_tenths(seq) as f64 / 10.
}

/// `happy`, 1.5s, 1 → `happy_1_1_5s.gif`; whole seconds drop the decimal (`happy_1_5s.gif`).
///
/// `index` tells apart the two halves of a split (1 = left, 2 = right).
/// Unsplit animations always get index 1.
pub fn suggest_filename(base_name: &str, duration_seconds: f64, index: usize) -> String {
    let tenths = (duration_seconds.max(0.) * 10.).round() as u64;
    let (whole, frac) = (tenths / 10, tenths % 10);
    if frac == 0 {
        format!("{base_name}_{index}_{whole}s.gif")
    } else {
        format!("{base_name}_{index}_{whole}_{frac}s.gif")
    }
}
