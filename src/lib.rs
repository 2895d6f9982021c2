//! Synthetic visual-defect corpus generator for raw YUV video.
//!
//! Given one clean sample, the crate produces a set of degraded variants
//! (blockiness, brightness drift, jitter, blur, highlight clipping,
//! chroma/luma bleed, grain, ringing, banding, ghosting, colorspace
//! mismatch, frame duplication/drop) plus a plain-text manifest recording
//! exactly how each variant was made.  Every parameter is drawn from a
//! single seeded random stream, so a run is fully reproducible from the
//! seed recorded in the manifest.
//!
//! The actual pixel work is delegated to an external ffmpeg process
//! behind the [`executor::TransformExecutor`] trait; everything in this
//! crate is about *deciding* what to do to the video, not doing it.

pub mod context;
pub mod defects;
pub mod executor;
pub mod filter;
pub mod manifest;
pub mod remap;
pub mod span;
