// MP3 to WAV conversion
// ffmpeg re-encodes to 16-bit little-endian PCM; the result is checked with hound

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::wav::{ensure_pcm_s16, WavError};
use crate::tools::{self, ToolError};

/// ffmpeg codec name for signed 16-bit little-endian PCM
pub const PCM_S16LE: &str = "pcm_s16le";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Converted output is not usable: {0}")]
    BadOutput(#[from] WavError),
}

/// Re-encodes an audio file into uncompressed WAV at `output`
pub trait Transcoder: Send + Sync {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command line for one conversion; the output path always comes last
    fn args<'a>(input: &'a Path, output: &'a Path) -> Vec<&'a OsStr> {
        vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-y"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-vn"),
            OsStr::new("-acodec"),
            OsStr::new(PCM_S16LE),
            output.as_os_str(),
        ]
    }
}

impl Transcoder for Ffmpeg {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        tools::run(&self.program, Self::args(input, output))?;
        Ok(())
    }
}

fn try_convert(
    transcoder: &dyn Transcoder,
    input: &Path,
    output: &Path,
) -> Result<PathBuf, ConvertError> {
    transcoder.transcode(input, output)?;
    let info = ensure_pcm_s16(output)?;
    log::info!(
        "Converted {} -> {}: {} Hz, {} channels, {} ms",
        input.display(),
        output.display(),
        info.sample_rate,
        info.channels,
        info.duration_ms
    );
    Ok(output.to_path_buf())
}

/// Convert `input` to a 16-bit PCM WAV at `output`. Failures are logged, not returned.
pub fn convert(transcoder: &dyn Transcoder, input: &Path, output: &Path) -> Option<PathBuf> {
    match try_convert(transcoder, input, output) {
        Ok(path) => Some(path),
        Err(e) => {
            log::error!("Error converting audio format: {}", e);
            None
        }
    }
}
