use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use yuv_corruptor::context::{Config, RunContext};
use yuv_corruptor::defects;
use yuv_corruptor::executor::FfmpegExecutor;
use yuv_corruptor::manifest;

#[derive(Parser)]
#[command(name = "yuv-corruptor")]
#[command(about = "Generates seed-reproducible labeled visual defects on raw YUV video")]
struct Cli {
    /// Raw YUV input file (8-bit planar)
    input: PathBuf,
    /// Resolution as WxH, e.g. 352x288.  When omitted, inferred from
    /// filenames shaped like *_352x288_30_*.yuv
    #[arg(short = 'r', long)]
    resolution: Option<String>,
    /// Frame rate (default 30, or the value encoded in the filename)
    #[arg(short = 'f', long)]
    fps: Option<u32>,
    /// Pixel format of the raw input
    #[arg(short = 'p', long, default_value = "yuv420p")]
    pix_fmt: String,
    /// RNG seed; 0 derives one from the clock and records it in the manifest
    #[arg(short = 's', long, default_value_t = 0)]
    seed: u64,
    /// Comma-separated defect kinds
    /// (blocky,brightness,jitter,smooth,highclip,chroma,luma,grain,ringing,banding,ghosting,colorspace,repeat);
    /// empty or "all" selects every kind
    #[arg(short = 't', long, value_delimiter = ',')]
    types: Vec<String>,
    /// Output directory (default out_<timestamp>)
    #[arg(short = 'o', long)]
    out_dir: Option<PathBuf>,
    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: String,
}

/// Parse an explicit `WxH` value.
fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

/// Pull `W x H` (and an optional 1-3 digit frame rate right after it)
/// out of a file stem like `akiyo_352x288_30_orig`.
fn infer_geometry(stem: &str) -> Option<(u32, u32, Option<u32>)> {
    let bytes = stem.as_bytes();
    for (i, &c) in bytes.iter().enumerate() {
        if c != b'x' && c != b'X' {
            continue;
        }
        let left_start = bytes[..i]
            .iter()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |p| p + 1);
        if left_start == i {
            continue;
        }
        let mut right_end = i + 1;
        while right_end < bytes.len() && bytes[right_end].is_ascii_digit() {
            right_end += 1;
        }
        if right_end == i + 1 {
            continue;
        }
        let Ok(w) = stem[left_start..i].parse::<u32>() else { continue };
        let Ok(h) = stem[i + 1..right_end].parse::<u32>() else { continue };
        if w == 0 || h == 0 {
            continue;
        }

        // Optional frame rate: at least one separator, then 1-3 digits.
        let rest = &bytes[right_end..];
        let fps = match rest.iter().position(|b| b.is_ascii_digit()) {
            Some(d) if d > 0 => {
                let fs = right_end + d;
                let mut fe = fs;
                while fe < bytes.len() && bytes[fe].is_ascii_digit() {
                    fe += 1;
                }
                if fe - fs <= 3 { stem[fs..fe].parse().ok() } else { None }
            }
            _ => None,
        };
        return Some((w, h, fps));
    }
    None
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let stem = cli.input.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let inferred = infer_geometry(stem);
    let (width, height) = match &cli.resolution {
        Some(s) => parse_resolution(s).with_context(|| format!("invalid resolution '{s}'"))?,
        None => inferred.map(|(w, h, _)| (w, h)).context(
            "resolution unknown; pass -r WxH or encode it in the filename like *_352x288_30.yuv",
        )?,
    };
    let fps = cli.fps.or(inferred.and_then(|(_, _, f)| f)).unwrap_or(30);
    let types = defects::resolve_kinds(&cli.types).map_err(anyhow::Error::msg)?;

    let cfg = Config {
        in_path: cli.input,
        width,
        height,
        fps,
        pix_fmt: cli.pix_fmt,
        seed: cli.seed,
        types,
        out_dir: cli.out_dir,
        ffmpeg: cli.ffmpeg,
    };
    let mut ctx = RunContext::init(cfg)?;
    eprintln!(
        "Input: {} ({}x{} @ {} fps, ~{} frames), seed={}",
        ctx.cfg.in_path.display(),
        ctx.cfg.width,
        ctx.cfg.height,
        ctx.cfg.fps,
        ctx.total_frames,
        ctx.cfg.seed,
    );

    let exec = FfmpegExecutor::new(&ctx.cfg);
    let results = defects::run_all(&mut ctx, &exec);

    manifest::write(&ctx, &results).context("failed to write manifest")?;
    eprintln!("Done. Outputs in: {}", ctx.out_dir.display());

    let failed = results.iter().filter(|r| r.failed()).count();
    if failed > 0 {
        eprintln!("{failed} defect generation(s) failed");
        std::process::exit(3);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_resolution_parses() {
        assert_eq!(parse_resolution("352x288"), Some((352, 288)));
        assert_eq!(parse_resolution(" 176X144 "), Some((176, 144)));
        assert_eq!(parse_resolution("352"), None);
        assert_eq!(parse_resolution("0x288"), None);
        assert_eq!(parse_resolution("axb"), None);
    }

    #[test]
    fn geometry_inferred_from_common_stems() {
        assert_eq!(infer_geometry("akiyo_352x288_30_orig"), Some((352, 288, Some(30))));
        assert_eq!(infer_geometry("foreman_176x144"), Some((176, 144, None)));
        assert_eq!(infer_geometry("clip-1920x1080-25fps"), Some((1920, 1080, Some(25))));
        assert_eq!(infer_geometry("no_dimensions_here"), None);
        assert_eq!(infer_geometry("x264_encode"), None);
    }
}
