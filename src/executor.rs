//! The external Transform Executor boundary.
//!
//! Everything the engine needs from ffmpeg is `apply(job) -> ok | failed`.
//! Keeping that behind a trait lets the orchestrator and samplers run
//! against a fake executor in tests without spawning processes.

use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use thiserror::Error;

use crate::context::Config;
use crate::defects::DefectKind;
use crate::filter::FilterChain;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to launch {tool}: {source}")]
    Spawn { tool: String, source: io::Error },
    #[error("{tool} exited with {status}")]
    Failed { tool: String, status: ExitStatus },
}

/// Encoder settings for one output.
#[derive(Debug, Clone)]
pub enum Encode {
    Crf(u32),
    Bitrate { kbps: u32, preset: &'static str },
}

/// One fully specified transform: which defect, where the output goes,
/// the filter chain, and how to encode.  Decode-side arguments come from
/// the run configuration and are the executor's concern.
#[derive(Debug, Clone)]
pub struct TransformJob {
    pub kind: DefectKind,
    pub output: PathBuf,
    pub filter: FilterChain,
    pub encode: Encode,
    /// Extra output-side flags some defects need (e.g. CFR timing for
    /// the frame-splice graph).
    pub extra_flags: Vec<String>,
}

pub trait TransformExecutor {
    fn apply(&self, job: &TransformJob) -> Result<(), TransformError>;
}

/// Blocking ffmpeg invocation.  No retries: a failed invocation is
/// terminal for that one defect, not the run.
pub struct FfmpegExecutor {
    ffmpeg: String,
    input: PathBuf,
    size: String,
    pix_fmt: String,
    fps: String,
}

impl FfmpegExecutor {
    pub fn new(cfg: &Config) -> Self {
        let input = std::path::absolute(&cfg.in_path).unwrap_or_else(|_| cfg.in_path.clone());
        FfmpegExecutor {
            ffmpeg: cfg.ffmpeg.clone(),
            input,
            size: format!("{}x{}", cfg.width, cfg.height),
            pix_fmt: cfg.pix_fmt.clone(),
            fps: cfg.fps.to_string(),
        }
    }
}

impl TransformExecutor for FfmpegExecutor {
    fn apply(&self, job: &TransformJob) -> Result<(), TransformError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-y", "-s", &self.size])
            .args(["-pix_fmt", &self.pix_fmt, "-r", &self.fps])
            .args(["-f", "rawvideo", "-i"])
            .arg(&self.input)
            .args(&job.extra_flags)
            .args(["-vf", &job.filter.render()]);
        match job.encode {
            Encode::Crf(crf) => {
                cmd.args(["-c:v", "libx264", "-crf"]).arg(crf.to_string());
            }
            Encode::Bitrate { kbps, preset } => {
                cmd.args(["-c:v", "libx264", "-b:v"])
                    .arg(format!("{kbps}k"))
                    .args(["-preset", preset]);
            }
        }
        cmd.args(["-v", "error"]).arg(&job.output);

        eprintln!("[cmd] {cmd:?}");
        let status = cmd.status().map_err(|source| TransformError::Spawn {
            tool: self.ffmpeg.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(TransformError::Failed { tool: self.ffmpeg.clone(), status })
        }
    }
}
