// WAV inspection
// Reads a WAV header and checks the sample encoding produced by the transcoder

use hound::{SampleFormat, WavReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bits per sample (8, 16, 24, 32)
    pub bit_depth: u16,

    pub sample_format: SampleFormat,

    /// Duration in milliseconds
    pub duration_ms: i64,
}

impl WavInfo {
    pub fn is_pcm_s16(&self) -> bool {
        self.sample_format == SampleFormat::Int && self.bit_depth == 16
    }
}

/// Read the header of the WAV file at `path`
pub fn probe_wav(path: &Path) -> Result<WavInfo, WavError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    // duration() counts frames, not interleaved samples
    let frames = reader.duration() as u64;
    let duration_ms = if spec.sample_rate == 0 {
        0
    } else {
        (frames * 1000 / spec.sample_rate as u64) as i64
    };

    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bit_depth: spec.bits_per_sample,
        sample_format: spec.sample_format,
        duration_ms,
    })
}

/// Require 16-bit little-endian integer PCM
pub fn ensure_pcm_s16(path: &Path) -> Result<WavInfo, WavError> {
    let info = probe_wav(path)?;
    if !info.is_pcm_s16() {
        return Err(WavError::UnsupportedFormat(format!(
            "{:?} {}-bit audio, expected Int 16-bit",
            info.sample_format, info.bit_depth
        )));
    }
    Ok(info)
}
