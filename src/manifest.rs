//! Run manifest: the audit trail pairing every output with the exact
//! parameters that produced it.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::context::RunContext;
use crate::defects::DefectResult;

/// Render the manifest text.  Pure function of the context and result
/// list, so it is testable without touching the filesystem.
pub fn render(ctx: &RunContext, outs: &[DefectResult]) -> String {
    let cfg = &ctx.cfg;
    let mut s = String::new();
    s.push_str(&format!("seed={}\n", cfg.seed));
    s.push_str(&format!("input={}\n", cfg.in_path.display()));
    s.push_str(&format!(
        "size={}x{} pix={} fps={}\n",
        cfg.width, cfg.height, cfg.pix_fmt, cfg.fps
    ));
    s.push_str(&format!(
        "total_frames~={} (assume yuv420p 8-bit)\n",
        ctx.total_frames
    ));
    s.push_str("outputs:\n");
    for o in outs {
        s.push_str(&format!("  - {} | {} | {}\n", o.filename, o.kind.label(), o.details));
    }
    let failed = outs.iter().filter(|o| o.failed()).count();
    if failed > 0 {
        s.push_str(&format!("failed_count={failed}\n"));
    }
    s
}

/// Write `manifest.txt` into the run's output directory.
pub fn write(ctx: &RunContext, outs: &[DefectResult]) -> io::Result<PathBuf> {
    let path = ctx.out_dir.join("manifest.txt");
    fs::write(&path, render(ctx, outs))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::defects::{DefectKind, FAILED};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn test_ctx() -> RunContext {
        RunContext {
            cfg: Config {
                in_path: PathBuf::from("clip_352x288_30.yuv"),
                width: 352,
                height: 288,
                fps: 30,
                pix_fmt: "yuv420p".to_string(),
                seed: 42,
                types: Vec::new(),
                out_dir: None,
                ffmpeg: "ffmpeg".to_string(),
            },
            out_dir: PathBuf::from("out"),
            rng: StdRng::seed_from_u64(42),
            base: "clip_352x288_30".to_string(),
            total_frames: 300,
        }
    }

    #[test]
    fn header_lists_configuration_and_estimate() {
        let text = render(&test_ctx(), &[]);
        assert!(text.starts_with("seed=42\n"));
        assert!(text.contains("input=clip_352x288_30.yuv\n"));
        assert!(text.contains("size=352x288 pix=yuv420p fps=30\n"));
        assert!(text.contains("total_frames~=300 (assume yuv420p 8-bit)\n"));
        assert!(text.ends_with("outputs:\n"));
        assert!(!text.contains("failed_count"));
    }

    #[test]
    fn one_line_per_attempt_plus_failure_trailer() {
        let outs = vec![
            DefectResult {
                filename: "clip_abc.mp4".to_string(),
                kind: DefectKind::Brightness,
                details: "delta_Y=2 (global)".to_string(),
            },
            DefectResult {
                filename: "clip_xyz.mp4".to_string(),
                kind: DefectKind::Grain,
                details: FAILED.to_string(),
            },
        ];
        let text = render(&test_ctx(), &outs);
        assert!(text.contains("  - clip_abc.mp4 | brightness_drift | delta_Y=2 (global)\n"));
        assert!(text.contains("  - clip_xyz.mp4 | grain | FAILED\n"));
        assert!(text.ends_with("failed_count=1\n"));
    }
}
