//! Defect generators and the orchestration loop.
//!
//! One routine per defect kind draws its parameters from the shared
//! random stream, builds a filter chain, and hands a `TransformJob` to
//! the executor.  Kinds are always generated in the canonical order of
//! [`ALL_KINDS`]; for a fixed seed that order is part of the
//! reproducibility contract, since every draw shifts the stream for all
//! draws after it.  Each generator's exact draw sequence is therefore
//! stable: parameters first, then the 3-letter output suffix.

use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;

use crate::context::RunContext;
use crate::executor::{Encode, TransformExecutor, TransformJob};
use crate::filter::{enable_between, FilterChain, Stage};
use crate::remap::{splice_graph, RemapPlan, FALLBACK_FRAMES};
use crate::span::{pick_spans, spans_label};

/// Failure sentinel recorded in place of a parameter record.
pub const FAILED: &str = "FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectKind {
    Blocky,
    Brightness,
    Jitter,
    Smooth,
    Highclip,
    Chroma,
    Luma,
    Grain,
    Ringing,
    Banding,
    Ghosting,
    Colorspace,
    Repeat,
}

/// Canonical generation order.  Requested subsets are filtered through
/// this list, so the relative order never depends on how `-t` was
/// spelled.
pub const ALL_KINDS: [DefectKind; 13] = [
    DefectKind::Blocky,
    DefectKind::Brightness,
    DefectKind::Jitter,
    DefectKind::Smooth,
    DefectKind::Highclip,
    DefectKind::Chroma,
    DefectKind::Luma,
    DefectKind::Grain,
    DefectKind::Ringing,
    DefectKind::Banding,
    DefectKind::Ghosting,
    DefectKind::Colorspace,
    DefectKind::Repeat,
];

impl DefectKind {
    /// CLI token accepted by `-t`.
    pub fn token(self) -> &'static str {
        match self {
            DefectKind::Blocky => "blocky",
            DefectKind::Brightness => "brightness",
            DefectKind::Jitter => "jitter",
            DefectKind::Smooth => "smooth",
            DefectKind::Highclip => "highclip",
            DefectKind::Chroma => "chroma",
            DefectKind::Luma => "luma",
            DefectKind::Grain => "grain",
            DefectKind::Ringing => "ringing",
            DefectKind::Banding => "banding",
            DefectKind::Ghosting => "ghosting",
            DefectKind::Colorspace => "colorspace",
            DefectKind::Repeat => "repeat",
        }
    }

    /// Label recorded in the manifest.
    pub fn label(self) -> &'static str {
        match self {
            DefectKind::Blocky => "bitrate_blocky",
            DefectKind::Brightness => "brightness_drift",
            DefectKind::Jitter => "jitter_1px",
            DefectKind::Smooth => "edge_oversmooth",
            DefectKind::Highclip => "highlight_clip",
            DefectKind::Chroma => "chroma_bleed",
            DefectKind::Luma => "luma_bleed",
            DefectKind::Grain => "grain",
            DefectKind::Ringing => "ringing",
            DefectKind::Banding => "banding",
            DefectKind::Ghosting => "ghosting",
            DefectKind::Colorspace => "colorspace_mismatch",
            DefectKind::Repeat => "repeat_frames_keep_count",
        }
    }
}

/// Resolve `-t` tokens against the canonical order.  Empty input, an
/// empty token, or `all` selects every kind.
pub fn resolve_kinds(tokens: &[String]) -> Result<Vec<DefectKind>, String> {
    if tokens.is_empty() || tokens.iter().any(|t| t.is_empty() || t == "all") {
        return Ok(ALL_KINDS.to_vec());
    }
    let mut requested = Vec::with_capacity(tokens.len());
    for t in tokens {
        let kind = ALL_KINDS
            .iter()
            .copied()
            .find(|k| k.token() == t)
            .ok_or_else(|| format!("unknown defect kind: {t}"))?;
        requested.push(kind);
    }
    Ok(ALL_KINDS.iter().copied().filter(|k| requested.contains(k)).collect())
}

/// One attempted defect generation, in generation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectResult {
    pub filename: String,
    pub kind: DefectKind,
    pub details: String,
}

impl DefectResult {
    pub fn failed(&self) -> bool {
        self.details == FAILED
    }
}

struct GenSpec {
    filter: FilterChain,
    encode: Encode,
    extra_flags: Vec<String>,
    details: String,
}

impl GenSpec {
    fn crf22(filter: FilterChain, details: String) -> Self {
        GenSpec { filter, encode: Encode::Crf(22), extra_flags: Vec::new(), details }
    }
}

/// Generate every configured kind against one shared context.  Partial
/// failure tolerant: a failed kind is recorded and the loop continues.
pub fn run_all(ctx: &mut RunContext, exec: &dyn TransformExecutor) -> Vec<DefectResult> {
    let kinds = ctx.cfg.types.clone();
    let pb = ProgressBar::new(kinds.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    let mut outs = Vec::with_capacity(kinds.len());
    for kind in kinds {
        pb.set_message(kind.label());
        outs.push(generate(kind, ctx, exec));
        pb.inc(1);
    }
    pb.finish_and_clear();
    outs
}

/// Sample, build, and invoke one defect; failures become a `FAILED`
/// result rather than an error.
pub fn generate(
    kind: DefectKind,
    ctx: &mut RunContext,
    exec: &dyn TransformExecutor,
) -> DefectResult {
    let spec = match kind {
        DefectKind::Blocky => make_blocky(),
        DefectKind::Brightness => make_brightness(ctx),
        DefectKind::Jitter => make_jitter(ctx),
        DefectKind::Smooth => make_smooth(ctx),
        DefectKind::Highclip => make_highclip(ctx),
        DefectKind::Chroma => make_chroma_bleed(ctx),
        DefectKind::Luma => make_luma_bleed(ctx),
        DefectKind::Grain => make_grain(ctx),
        DefectKind::Ringing => make_ringing(),
        DefectKind::Banding => make_banding(ctx),
        DefectKind::Ghosting => make_ghosting(ctx),
        DefectKind::Colorspace => make_colorspace_mismatch(ctx),
        DefectKind::Repeat => make_repeat(ctx),
    };

    let suffix = ctx.rand_suffix();
    let filename = format!("{}_{}.mp4", ctx.base, suffix);
    let output = ctx.out_dir.join(&filename);
    let output = std::path::absolute(&output).unwrap_or(output);
    let job = TransformJob {
        kind,
        output,
        filter: spec.filter,
        encode: spec.encode,
        extra_flags: spec.extra_flags,
    };
    match exec.apply(&job) {
        Ok(()) => DefectResult { filename, kind, details: spec.details },
        Err(err) => {
            eprintln!("[warn] {}: {}", kind.label(), err);
            DefectResult { filename, kind, details: FAILED.to_string() }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Global, span-free defects
// ────────────────────────────────────────────────────────────────────────────

/// Blockiness via starved-bitrate encoding; the defect is the encoder's
/// own compression artifacts, so the chain is just the even-size scale.
fn make_blocky() -> GenSpec {
    GenSpec {
        filter: FilterChain::new().even_scale(),
        encode: Encode::Bitrate { kbps: 500, preset: "veryfast" },
        extra_flags: Vec::new(),
        details: "b=500k preset=veryfast".to_string(),
    }
}

/// Global luma offset of a few 8-bit levels.
fn make_brightness(ctx: &mut RunContext) -> GenSpec {
    let delta: i32 = ctx.rng.random_range(-3..=3);
    let filter = FilterChain::new()
        .stage(Stage::new("lutyuv").expr("y", format!("clip(val+{delta},0,255)")))
        .even_scale();
    GenSpec::crf22(filter, format!("delta_Y={delta} (global)"))
}

/// Wrap-around 1 px shift on every K-th frame.  The shifted variant is
/// built by cropping off one edge column/row and stacking it back on the
/// other side, then overlaid onto the original only on trigger frames.
/// Done in 4:4:4 so 1 px chroma slices stay legal, then back to 4:2:0.
fn make_jitter(ctx: &mut RunContext) -> GenSpec {
    let period: u32 = ctx.rng.random_range(5..=10);
    let horizontal = ctx.rng.random_range(0..=1) == 0;
    let forward = ctx.rng.random_range(0..=1) == 0;

    let trigger = format!("eq(mod(n\\,{period})\\,0)");
    let graph = match (horizontal, forward) {
        (true, true) => format!(
            "split[o][s];[s]split[s0][s1];[s0]crop=iw-1:ih:0:0[left];\
             [s1]crop=1:ih:iw-1:0[edge];[edge][left]hstack=inputs=2[sh];\
             [o][sh]overlay=x=0:y=0:enable='{trigger}'"
        ),
        (true, false) => format!(
            "split[o][s];[s]split[s0][s1];[s0]crop=iw-1:ih:1:0[right];\
             [s1]crop=1:ih:0:0[edge];[right][edge]hstack=inputs=2[sh];\
             [o][sh]overlay=x=0:y=0:enable='{trigger}'"
        ),
        (false, true) => format!(
            "split[o][s];[s]split[s0][s1];[s0]crop=iw:ih-1:0:0[top];\
             [s1]crop=iw:1:0:ih-1[edge];[edge][top]vstack=inputs=2[sh];\
             [o][sh]overlay=x=0:y=0:enable='{trigger}'"
        ),
        (false, false) => format!(
            "split[o][s];[s]split[s0][s1];[s0]crop=iw:ih-1:0:1[bottom];\
             [s1]crop=iw:1:0:0[edge];[bottom][edge]vstack=inputs=2[sh];\
             [o][sh]overlay=x=0:y=0:enable='{trigger}'"
        ),
    };
    let filter = FilterChain::new()
        .stage(Stage::new("format").positional("yuv444p"))
        .graph(graph)
        .stage(Stage::new("format").positional("yuv420p"))
        .even_scale();

    let sense = match (horizontal, forward) {
        (true, true) => "right",
        (true, false) => "left",
        (false, true) => "down",
        (false, false) => "up",
    };
    let details = format!(
        "dir={}, wrap=on, shift=1px, period={period}, sense={sense}",
        if horizontal { "horiz" } else { "vert" },
    );
    GenSpec::crf22(filter, details)
}

/// Mild Gaussian smoothing; small sigma so texture survives but edges
/// soften.
fn make_smooth(ctx: &mut RunContext) -> GenSpec {
    let sigma: f64 = ctx.rng.random_range(0.7..1.4);
    let filter = FilterChain::new()
        .stage(Stage::new("gblur").arg("sigma", format!("{sigma:.2}")))
        .even_scale();
    GenSpec {
        filter,
        encode: Encode::Crf(23),
        extra_flags: Vec::new(),
        details: format!("sigma={sigma:.2}"),
    }
}

const DEFAULT_CLIP_THRESHOLD: i32 = 240;

/// Highlight clipping with a content-adaptive threshold.
///
/// This is the one sampler whose draws depend on the sample itself, not
/// just configuration: the same seed yields a different threshold on
/// different input content.  Three strategies, in order of preference:
/// histogram top-percentile, peak-relative window, fixed 240.
fn make_highclip(ctx: &mut RunContext) -> GenSpec {
    let threshold = match ctx.luma_peak() {
        Some(peak) if peak >= 2 => match ctx.luma_histogram() {
            Some(hist) => histogram_threshold(&hist, peak, &mut ctx.rng),
            None => peak_threshold(peak, &mut ctx.rng),
        },
        _ => DEFAULT_CLIP_THRESHOLD,
    };
    let filter = FilterChain::new()
        .stage(Stage::new("lutyuv").expr("y", format!("if(gte(val\\,{threshold})\\,255\\,val)")))
        .even_scale();
    GenSpec::crf22(filter, format!("Y_threshold={threshold}"))
}

/// Locate the luma level where the CDF reaches a randomly chosen top
/// percentile (1–5%), then draw the threshold from a window just below
/// it so a visible patch of highlights actually clips.
fn histogram_threshold(hist: &[u32; 256], peak: u8, rng: &mut impl Rng) -> i32 {
    let total: u64 = hist.iter().map(|&v| v as u64).sum();
    let target: f64 = rng.random_range(0.01..0.05);
    let cutoff = (total as f64 * (1.0 - target)) as u64;
    let mut acc = 0u64;
    let mut cdf_idx = 255i32;
    for (i, &v) in hist.iter().enumerate() {
        acc += v as u64;
        if acc >= cutoff {
            cdf_idx = i as i32;
            break;
        }
    }
    let lower = (cdf_idx - 20).max(8);
    let upper = 250.min((lower + 1).max((peak as i32 - 1).min(cdf_idx)));
    rng.random_range(lower..=upper)
}

/// Fallback when only the peak is known: a window just below it.
fn peak_threshold(peak: u8, rng: &mut impl Rng) -> i32 {
    let lower = (peak as i32 - 40).max(10);
    let upper = 250.min((lower + 1).max(peak as i32 - 1));
    rng.random_range(lower..=upper)
}

// ────────────────────────────────────────────────────────────────────────────
// Span-gated defects
// ────────────────────────────────────────────────────────────────────────────

/// Chroma plane misalignment within a few short spans: the Cb/Cr shifts
/// are mirrored in sign so the planes pull apart, plus a light chroma
/// blur while the spans are active.
fn make_chroma_bleed(ctx: &mut RunContext) -> GenSpec {
    if ctx.total_frames == 0 {
        eprintln!("[warn] total_frames unknown; assuming short video");
    }
    let spans = pick_spans(ctx.total_frames, &mut ctx.rng);
    let cb_h: i32 = ctx.rng.random_range(1..=2);
    let cr_h: i32 = -ctx.rng.random_range(1..=2);
    let cb_v: i32 = ctx.rng.random_range(0..=1);
    let cr_v: i32 = -ctx.rng.random_range(0..=1);

    let en = enable_between(&spans);
    let filter = FilterChain::new()
        .stage(
            Stage::new("chromashift")
                .arg("cbh", cb_h)
                .arg("crh", cr_h)
                .arg("cbv", cb_v)
                .arg("crv", cr_v)
                .enable_in(&en),
        )
        .stage(Stage::new("boxblur").positional("0:1").enable_in(&en))
        .even_scale();

    let details = format!(
        "frames={} cb_h={cb_h} cr_h={cr_h} cb_v={cb_v} cr_v={cr_v}",
        spans_label(&spans),
    );
    GenSpec::crf22(filter, details)
}

/// Luma ghosting within short spans: blend the frame with a blurred copy
/// of itself while the spans are active.
fn make_luma_bleed(ctx: &mut RunContext) -> GenSpec {
    if ctx.total_frames == 0 {
        eprintln!("[warn] total_frames unknown; assuming short video");
    }
    let spans = pick_spans(ctx.total_frames, &mut ctx.rng);
    let sigma: f64 = ctx.rng.random_range(0.5..0.9);
    let opacity: f64 = ctx.rng.random_range(0.25..0.35);

    let en = enable_between(&spans);
    let graph = format!(
        "split[y][tmp];[tmp]gblur=sigma={sigma:.2}[blur];\
         [y][blur]blend=all_mode=average:all_opacity={opacity:.2}:enable='{en}'"
    );
    let filter = FilterChain::new().graph(graph).even_scale();

    let details = format!(
        "frames={} sigma={sigma:.2} opacity={opacity:.2}",
        spans_label(&spans),
    );
    GenSpec::crf22(filter, details)
}

// ────────────────────────────────────────────────────────────────────────────
// Texture and tone defects
// ────────────────────────────────────────────────────────────────────────────

/// Film-grain-like temporal noise plus a slight sharpen.  The noise
/// filter's own seed is derived from the run seed, folded into the range
/// the external tool accepts.
fn make_grain(ctx: &mut RunContext) -> GenSpec {
    let strength: u32 = ctx.rng.random_range(2..=6) * 5;
    let noise_seed = ctx.cfg.seed % 2_147_480_000;
    let filter = FilterChain::new()
        .stage(
            Stage::new("noise")
                .arg("alls", strength)
                .arg("allf", "t+u")
                .arg("all_seed", noise_seed),
        )
        .stage(
            Stage::new("unsharp")
                .arg("lx", 3)
                .arg("ly", 3)
                .arg("la", "0.2")
                .arg("cx", 3)
                .arg("cy", 3)
                .arg("ca", "0.0"),
        )
        .even_scale();
    GenSpec::crf22(filter, format!("alls={strength} seed={noise_seed}"))
}

/// Edge ringing via oversharpening followed by light deblocking.
fn make_ringing() -> GenSpec {
    let filter = FilterChain::new()
        .stage(
            Stage::new("unsharp")
                .arg("lx", 5)
                .arg("ly", 5)
                .arg("la", "1.2")
                .arg("cx", 5)
                .arg("cy", 5)
                .arg("ca", "0.6"),
        )
        .stage(Stage::new("deblock").arg("alpha", "0.2").arg("beta", "0.2"))
        .even_scale();
    GenSpec::crf22(filter, "unsharp+deblock".to_string())
}

/// Luma quantization to 2^k levels plus a touch of blur, so the steps
/// read as smooth-gradient banding rather than hard posterization.
fn make_banding(ctx: &mut RunContext) -> GenSpec {
    let levels = 1u32 << ctx.rng.random_range(3..=6u32);
    let filter = FilterChain::new()
        .stage(Stage::new("lutyuv").expr("y", format!("trunc(val/{levels})*{levels}")))
        .stage(Stage::new("gblur").arg("sigma", "0.4"))
        .even_scale();
    GenSpec::crf22(filter, format!("levels={levels}"))
}

/// Temporal blend with the previous frame.
fn make_ghosting(ctx: &mut RunContext) -> GenSpec {
    let opacity: f64 = ctx.rng.random_range(0.25..0.35);
    let filter = FilterChain::new()
        .stage(
            Stage::new("tblend")
                .arg("all_mode", "average")
                .arg("all_opacity", format!("{opacity:.2}")),
        )
        .even_scale();
    GenSpec::crf22(filter, format!("opacity={opacity:.2}"))
}

/// Decode with one color matrix, convert to the other: a coin flip picks
/// 709→601 or 601→709.
fn make_colorspace_mismatch(ctx: &mut RunContext) -> GenSpec {
    let to601 = ctx.rng.random_range(0..=1) == 0;
    let (src, dst) = if to601 { ("bt709", "bt601") } else { ("bt601", "bt709") };
    let (in_space, out_space) = if to601 {
        ("bt709", "smpte170m")
    } else {
        ("smpte170m", "bt709")
    };
    let filter = FilterChain::new()
        .stage(Stage::new("colormatrix").arg("src", src).arg("dst", dst))
        .even_scale();
    GenSpec::crf22(filter, format!("{in_space}->{out_space}"))
}

// ────────────────────────────────────────────────────────────────────────────
// Frame duplication/drop
// ────────────────────────────────────────────────────────────────────────────

fn join_positions(positions: &[u64]) -> String {
    positions.iter().map(u64::to_string).collect::<Vec<_>>().join(",")
}

/// Duplicate K frames and drop K others so the output frame count
/// equals the input's; see [`crate::remap`] for the position algorithm.
fn make_repeat(ctx: &mut RunContext) -> GenSpec {
    let hint = (ctx.total_frames >= 4).then_some(ctx.total_frames);
    if hint.is_none() {
        eprintln!("[warn] total_frames unknown; assuming a {FALLBACK_FRAMES}-frame sequence");
    }
    let plan = RemapPlan::draw(hint, &mut ctx.rng);
    let filter = FilterChain::new()
        .graph(splice_graph(&plan, ctx.cfg.fps))
        .even_scale();
    let extra_flags = vec![
        "-fflags".to_string(),
        "+genpts".to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-r".to_string(),
        ctx.cfg.fps.to_string(),
    ];
    let details = format!(
        "dup=[{}] drop=[{}]",
        join_positions(&plan.duplicates),
        join_positions(&plan.drops),
    );
    GenSpec { filter, encode: Encode::Crf(22), extra_flags, details }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::executor::TransformError;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::fs::File;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    struct FakeExecutor {
        fail_kind: Option<DefectKind>,
        jobs: RefCell<Vec<(DefectKind, String)>>,
    }

    impl FakeExecutor {
        fn ok() -> Self {
            FakeExecutor { fail_kind: None, jobs: RefCell::new(Vec::new()) }
        }

        fn failing(kind: DefectKind) -> Self {
            FakeExecutor { fail_kind: Some(kind), jobs: RefCell::new(Vec::new()) }
        }
    }

    impl TransformExecutor for FakeExecutor {
        fn apply(&self, job: &TransformJob) -> Result<(), TransformError> {
            self.jobs.borrow_mut().push((job.kind, job.filter.render()));
            if self.fail_kind == Some(job.kind) {
                return Err(TransformError::Spawn {
                    tool: "fake".to_string(),
                    source: std::io::Error::other("forced failure"),
                });
            }
            Ok(())
        }
    }

    fn write_yuv(dir: &Path, name: &str, width: u32, height: u32, frames: u64) -> PathBuf {
        let path = dir.join(name);
        let bpf = (width * height * 3 / 2) as usize;
        let mut f = File::create(&path).unwrap();
        for _ in 0..frames {
            f.write_all(&vec![120u8; bpf]).unwrap();
        }
        path
    }

    fn test_ctx(dir: &Path, frames: u64, seed: u64, types: Vec<DefectKind>) -> RunContext {
        let input = write_yuv(dir, "clip_16x16_30.yuv", 16, 16, frames);
        let cfg = Config {
            in_path: input,
            width: 16,
            height: 16,
            fps: 30,
            pix_fmt: "yuv420p".to_string(),
            seed,
            types,
            out_dir: Some(dir.join("out")),
            ffmpeg: "ffmpeg".to_string(),
        };
        RunContext::init(cfg).unwrap()
    }

    #[test]
    fn resolve_kinds_defaults_to_all() {
        assert_eq!(resolve_kinds(&[]).unwrap(), ALL_KINDS.to_vec());
        assert_eq!(resolve_kinds(&["all".to_string()]).unwrap(), ALL_KINDS.to_vec());
        assert_eq!(resolve_kinds(&[String::new()]).unwrap(), ALL_KINDS.to_vec());
    }

    #[test]
    fn resolve_kinds_uses_canonical_order() {
        let kinds =
            resolve_kinds(&["repeat".to_string(), "blocky".to_string()]).unwrap();
        assert_eq!(kinds, vec![DefectKind::Blocky, DefectKind::Repeat]);
        assert!(resolve_kinds(&["mosquito".to_string()]).is_err());
    }

    #[test]
    fn same_seed_and_input_reproduce_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let exec = FakeExecutor::ok();
        let kinds = ALL_KINDS.to_vec();
        let mut a = test_ctx(dir.path(), 300, 42, kinds.clone());
        let first = run_all(&mut a, &exec);
        let mut b = test_ctx(dir.path(), 300, 42, kinds);
        let second = run_all(&mut b, &exec);
        assert_eq!(first, second);
        assert!(first.iter().all(|r| !r.failed()));
    }

    #[test]
    fn one_failing_kind_does_not_abort_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let exec = FakeExecutor::failing(DefectKind::Grain);
        let mut ctx = test_ctx(dir.path(), 300, 42, ALL_KINDS.to_vec());
        let results = run_all(&mut ctx, &exec);

        assert_eq!(results.len(), ALL_KINDS.len());
        assert_eq!(exec.jobs.borrow().len(), ALL_KINDS.len());
        let failed: Vec<_> = results.iter().filter(|r| r.failed()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, DefectKind::Grain);
        let all_ok = results.iter().fold(true, |acc, r| acc && !r.failed());
        assert!(!all_ok);
    }

    #[test]
    fn repeat_records_equal_cardinality_sets() {
        let dir = tempfile::tempdir().unwrap();
        let exec = FakeExecutor::ok();
        let mut ctx = test_ctx(dir.path(), 300, 42, vec![DefectKind::Repeat]);
        let results = run_all(&mut ctx, &exec);

        assert_eq!(results.len(), 1);
        let details = &results[0].details;
        let dup = details
            .split("dup=[")
            .nth(1)
            .and_then(|s| s.split(']').next())
            .unwrap();
        let drop = details
            .split("drop=[")
            .nth(1)
            .and_then(|s| s.split(']').next())
            .unwrap();
        let dups: Vec<u64> = dup.split(',').map(|v| v.parse().unwrap()).collect();
        let drops: Vec<u64> = drop.split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(dups.len(), drops.len());
        assert!(!dups.is_empty() && dups.len() <= 3);
        assert!(dups.iter().all(|p| (1..=298).contains(p)));
        assert!(drops.iter().all(|p| (2..=298).contains(p)));
        assert!(dups.iter().all(|p| !drops.contains(p)));
    }

    #[test]
    fn generated_filenames_carry_the_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let exec = FakeExecutor::ok();
        let mut ctx = test_ctx(dir.path(), 60, 7, vec![DefectKind::Brightness]);
        let results = run_all(&mut ctx, &exec);
        assert!(results[0].filename.starts_with("clip_16x16_30_"));
        assert!(results[0].filename.ends_with(".mp4"));
        assert!(results[0].details.starts_with("delta_Y="));
        assert!(results[0].details.ends_with("(global)"));
    }

    #[test]
    fn adaptive_threshold_tracks_a_bright_tail() {
        // 90% of pixels at 50, 10% at 250: any 1-5% cutoff lands on the
        // bright tail, so the window sits just below 250.
        let mut hist = [0u32; 256];
        hist[50] = 900;
        hist[250] = 100;
        for seed in 0..100 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let t = histogram_threshold(&hist, 250, &mut rng);
            assert!((230..=249).contains(&t), "t={t}");
        }
    }

    #[test]
    fn adaptive_threshold_never_escapes_its_clamp() {
        let mut hist = [0u32; 256];
        hist[255] = 1000;
        for seed in 0..100 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let t = histogram_threshold(&hist, 255, &mut rng);
            assert!((8..=250).contains(&t));
        }
    }

    #[test]
    fn peak_fallback_window_sits_below_the_peak() {
        for seed in 0..100 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let t = peak_threshold(200, &mut rng);
            assert!((160..=199).contains(&t));
            let t = peak_threshold(3, &mut rng);
            assert!((10..=11).contains(&t));
        }
    }

    #[test]
    fn dark_probe_failure_uses_fixed_default() {
        // All-zero luma: peak < 2, so no draws happen and T stays 240.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("black.yuv");
        File::create(&path).unwrap().write_all(&vec![0u8; 384]).unwrap();
        let cfg = Config {
            in_path: path,
            width: 16,
            height: 16,
            fps: 30,
            pix_fmt: "yuv420p".to_string(),
            seed: 1,
            types: vec![DefectKind::Highclip],
            out_dir: Some(dir.path().join("out")),
            ffmpeg: "ffmpeg".to_string(),
        };
        let mut ctx = RunContext::init(cfg).unwrap();
        let spec = make_highclip(&mut ctx);
        assert_eq!(spec.details, "Y_threshold=240");
    }
}
