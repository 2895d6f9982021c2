//! Run configuration and the shared run context.
//!
//! `RunContext` owns the single seeded random stream every sampler draws
//! from.  Reproducibility rests on two things: the seed recorded in the
//! manifest, and defect kinds being generated in the fixed canonical
//! order — a fresh draw anywhere shifts every value after it.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::defects::DefectKind;

/// Resolved run configuration.  `seed` is fixed for the lifetime of the
/// run once `RunContext::init` has replaced a zero seed with a
/// clock-derived one.
#[derive(Debug, Clone)]
pub struct Config {
    pub in_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pix_fmt: String,
    pub seed: u64,
    /// Requested defect kinds, already resolved to canonical order.
    pub types: Vec<DefectKind>,
    pub out_dir: Option<PathBuf>,
    pub ffmpeg: String,
}

/// Fatal initialization failures; anything here aborts the run before a
/// single defect is generated.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("cannot create output directory {}: {source}", .dir.display())]
    DirectoryCreateFailed { dir: PathBuf, source: io::Error },
}

pub struct RunContext {
    pub cfg: Config,
    pub out_dir: PathBuf,
    pub rng: StdRng,
    /// Input file name without extension; prefixes every output name.
    pub base: String,
    /// Estimated frame count, 0 when the estimate is invalid.
    pub total_frames: u64,
}

impl RunContext {
    /// Resolve seed and output directory, seed the random stream exactly
    /// once, and estimate the total frame count from the file size under
    /// the planar 8-bit 4:2:0 assumption.
    pub fn init(mut cfg: Config) -> Result<Self, InitError> {
        if !cfg.in_path.exists() {
            return Err(InitError::InputNotFound(cfg.in_path));
        }
        let base = cfg
            .in_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());

        if cfg.seed == 0 {
            cfg.seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1);
        }
        let rng = StdRng::seed_from_u64(cfg.seed);

        let out_dir = cfg.out_dir.clone().unwrap_or_else(|| {
            PathBuf::from(format!("out_{}", Local::now().format("%Y%m%d_%H%M%S")))
        });
        fs::create_dir_all(&out_dir)
            .map_err(|source| InitError::DirectoryCreateFailed { dir: out_dir.clone(), source })?;

        if cfg.pix_fmt != "yuv420p" {
            eprintln!("[warn] frame count estimation assumes yuv420p 8-bit");
        }
        let bytes_per_frame = cfg.width as u64 * cfg.height as u64 * 3 / 2;
        let file_size = fs::metadata(&cfg.in_path).map(|m| m.len()).unwrap_or(0);
        let total_frames = if bytes_per_frame > 0 { file_size / bytes_per_frame } else { 0 };

        Ok(RunContext { cfg, out_dir, rng, base, total_frames })
    }

    /// Three random lowercase letters for output file names.
    pub fn rand_suffix(&mut self) -> String {
        (0..3)
            .map(|_| (b'a' + self.rng.random_range(0..26u8)) as char)
            .collect()
    }

    /// Peak luma of the first frame, or `None` when the plane cannot be
    /// read in full.
    pub fn luma_peak(&self) -> Option<u8> {
        self.read_first_y_plane()
            .map(|buf| buf.iter().copied().max().unwrap_or(0))
    }

    /// 256-bin luma histogram of the first frame.
    pub fn luma_histogram(&self) -> Option<[u32; 256]> {
        let buf = self.read_first_y_plane()?;
        let mut hist = [0u32; 256];
        for &v in &buf {
            hist[v as usize] += 1;
        }
        Some(hist)
    }

    fn read_first_y_plane(&self) -> Option<Vec<u8>> {
        if self.cfg.width == 0 || self.cfg.height == 0 {
            return None;
        }
        let y_bytes = self.cfg.width as usize * self.cfg.height as usize;
        let mut buf = vec![0u8; y_bytes];
        let mut file = File::open(&self.cfg.in_path).ok()?;
        file.read_exact(&mut buf).ok()?;
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    fn test_config(in_path: PathBuf, out_dir: &Path, width: u32, height: u32) -> Config {
        Config {
            in_path,
            width,
            height,
            fps: 30,
            pix_fmt: "yuv420p".to_string(),
            seed: 42,
            types: Vec::new(),
            out_dir: Some(out_dir.join("out")),
            ffmpeg: "ffmpeg".to_string(),
        }
    }

    fn write_yuv(dir: &Path, name: &str, width: u32, height: u32, frames: u64) -> PathBuf {
        let path = dir.join(name);
        let bpf = (width * height * 3 / 2) as usize;
        let mut f = File::create(&path).unwrap();
        for _ in 0..frames {
            f.write_all(&vec![128u8; bpf]).unwrap();
        }
        path
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path().join("nope.yuv"), dir.path(), 16, 16);
        match RunContext::init(cfg) {
            Err(InitError::InputNotFound(_)) => {}
            other => panic!("expected InputNotFound, got {other:?}", other = other.err()),
        }
    }

    #[test]
    fn frame_count_estimated_from_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_yuv(dir.path(), "clip_16x16_30.yuv", 16, 16, 25);
        let ctx = RunContext::init(test_config(input, dir.path(), 16, 16)).unwrap();
        assert_eq!(ctx.total_frames, 25);
        assert_eq!(ctx.base, "clip_16x16_30");
        assert!(ctx.out_dir.is_dir());
    }

    #[test]
    fn zero_seed_is_replaced_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_yuv(dir.path(), "clip.yuv", 16, 16, 2);
        let mut cfg = test_config(input, dir.path(), 16, 16);
        cfg.seed = 0;
        let ctx = RunContext::init(cfg).unwrap();
        assert_ne!(ctx.cfg.seed, 0);
    }

    #[test]
    fn suffixes_are_reproducible_per_seed() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_yuv(dir.path(), "clip.yuv", 16, 16, 2);
        let mut a = RunContext::init(test_config(input.clone(), dir.path(), 16, 16)).unwrap();
        let mut b = RunContext::init(test_config(input, dir.path(), 16, 16)).unwrap();
        let sa: Vec<String> = (0..5).map(|_| a.rand_suffix()).collect();
        let sb: Vec<String> = (0..5).map(|_| b.rand_suffix()).collect();
        assert_eq!(sa, sb);
        assert!(sa.iter().all(|s| s.len() == 3 && s.bytes().all(|c| c.is_ascii_lowercase())));
    }

    #[test]
    fn luma_probes_read_the_first_frame_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.yuv");
        let mut f = File::create(&path).unwrap();
        // First frame: Y plane split 200 bytes of 50, 56 bytes of 250.
        let mut y = vec![50u8; 200];
        y.extend(std::iter::repeat(250).take(56));
        f.write_all(&y).unwrap();
        f.write_all(&vec![128u8; 128]).unwrap(); // chroma
        f.write_all(&vec![0u8; 384]).unwrap(); // second frame, all black
        let ctx = RunContext::init(test_config(path, dir.path(), 16, 16)).unwrap();
        assert_eq!(ctx.luma_peak(), Some(250));
        let hist = ctx.luma_histogram().unwrap();
        assert_eq!(hist[50], 200);
        assert_eq!(hist[250], 56);
        assert_eq!(hist.iter().sum::<u32>(), 256);
    }

    #[test]
    fn truncated_input_fails_the_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.yuv");
        File::create(&path).unwrap().write_all(&[1, 2, 3]).unwrap();
        let ctx = RunContext::init(test_config(path, dir.path(), 16, 16)).unwrap();
        assert_eq!(ctx.luma_peak(), None);
        assert!(ctx.luma_histogram().is_none());
    }
}
