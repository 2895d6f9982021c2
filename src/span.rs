//! Temporal span selection for defects that apply only within short
//! frame ranges (chroma/luma bleed).

use std::fmt;

use rand::Rng;

/// A contiguous, inclusive frame range `[start, end]` with `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}

/// Draw 1–3 spans of 2–5 frames each from the shared random stream.
///
/// When the clip is long enough (`total_frames > 10`) every span is kept
/// at least 5 frames away from both ends of the sequence; otherwise all
/// spans start at frame 0.  Spans are independent draws and may overlap
/// — the defects they gate are idempotent when stacked.
pub fn pick_spans(total_frames: u64, rng: &mut impl Rng) -> Vec<Span> {
    let count: u32 = rng.random_range(1..=3);
    (0..count)
        .map(|_| {
            let len: u64 = rng.random_range(2..=5);
            let start = if total_frames > 10 {
                let hi = (total_frames - len - 5).max(5);
                rng.random_range(5..=hi)
            } else {
                0
            };
            Span { start, end: start + len }
        })
        .collect()
}

/// `[a..b],[c..d]` form used in manifest details.
pub fn spans_label(spans: &[Span]) -> String {
    spans.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
