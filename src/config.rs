// Runtime configuration from environment variables
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::{ScratchPolicy, DEFAULT_SCRATCH_TTL};
use crate::state::storage::{get_app_data_dir, StorageError};

const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_AUDIO_QUALITY_KBPS: u32 = 192;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    /// Holds the database file
    pub data_dir: PathBuf,
    /// Root of the managed storage area
    pub media_root: PathBuf,
    /// Where intermediate downloads and converted WAVs are written
    pub scratch_dir: PathBuf,
    pub ytdlp_program: String,
    pub ffmpeg_program: String,
    pub audio_quality_kbps: u32,
    pub scratch_policy: ScratchPolicy,
    /// Age after which leftover scratch files are swept
    pub scratch_ttl: Duration,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_raw = var("AUDIOGRAB_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| invalid("AUDIOGRAB_BIND", &bind_raw, e))?;

        let data_dir = match var("AUDIOGRAB_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => get_app_data_dir()?,
        };
        let media_root = var("AUDIOGRAB_MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("media"));
        let scratch_dir = match var("AUDIOGRAB_SCRATCH_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir()?,
        };

        let audio_quality_kbps = match var("AUDIOGRAB_AUDIO_QUALITY") {
            Some(raw) => parse_quality(&raw)?,
            None => DEFAULT_AUDIO_QUALITY_KBPS,
        };

        let scratch_policy = match var("AUDIOGRAB_SCRATCH_POLICY").as_deref() {
            None | Some("cleanup") => ScratchPolicy::CleanupAlways,
            Some("keep-on-save-failure") => ScratchPolicy::KeepOnSaveFailure,
            Some(other) => {
                return Err(invalid(
                    "AUDIOGRAB_SCRATCH_POLICY",
                    other,
                    "expected cleanup or keep-on-save-failure",
                ))
            }
        };

        let scratch_ttl = match var("AUDIOGRAB_SCRATCH_TTL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| invalid("AUDIOGRAB_SCRATCH_TTL_SECS", &raw, e))?,
            None => DEFAULT_SCRATCH_TTL,
        };

        let log_format = match var("AUDIOGRAB_LOG_FORMAT")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(invalid("AUDIOGRAB_LOG_FORMAT", other, "expected text or json"))
            }
        };

        Ok(Config {
            bind,
            data_dir,
            media_root,
            scratch_dir,
            ytdlp_program: var("AUDIOGRAB_YTDLP").unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_program: var("AUDIOGRAB_FFMPEG").unwrap_or_else(|| "ffmpeg".to_string()),
            audio_quality_kbps,
            scratch_policy,
            scratch_ttl,
            log_format,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("audiograb.db")
    }
}

fn parse_quality(raw: &str) -> Result<u32, ConfigError> {
    let kbps: u32 = raw
        .trim_end_matches(['k', 'K'])
        .parse()
        .map_err(|e| invalid("AUDIOGRAB_AUDIO_QUALITY", raw, e))?;
    if !(32..=320).contains(&kbps) {
        return Err(invalid(
            "AUDIOGRAB_AUDIO_QUALITY",
            raw,
            "expected 32..=320 kbps",
        ));
    }
    Ok(kbps)
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
