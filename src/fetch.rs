// Audio download from video sites
// yt-dlp extracts the best audio stream and transcodes it to MP3

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::tools::{self, ToolError};

/// Output extension produced by the extract-audio postprocessor
pub const MP3_EXTENSION: &str = "mp3";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Downloader did not report an output filename")]
    NoFilename,

    #[error("Downloader reported {0} but it does not exist")]
    MissingOutput(PathBuf),
}

/// Something that can fetch the audio track of a URL into a local file.
///
/// `stem` is the output path without extension; the returned path is the
/// file actually written.
pub trait AudioFetcher: Send + Sync {
    fn fetch_audio(&self, url: &str, stem: &Path) -> Result<PathBuf, FetchError>;
}

/// yt-dlp with the FFmpegExtractAudio postprocessor
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    /// MP3 bitrate in kbps
    quality_kbps: u32,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, quality_kbps: u32) -> Self {
        Self {
            program: program.into(),
            quality_kbps,
        }
    }

    fn args(&self, url: &str, stem: &Path) -> Vec<String> {
        let template = format!("{}.%(ext)s", stem.to_string_lossy());
        vec![
            "--no-playlist".to_string(),
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            MP3_EXTENSION.to_string(),
            "--audio-quality".to_string(),
            format!("{}K", self.quality_kbps),
            "--output".to_string(),
            template,
            // --print alone implies --simulate
            "--no-simulate".to_string(),
            "--print".to_string(),
            "filename".to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }
}

impl AudioFetcher for YtDlp {
    fn fetch_audio(&self, url: &str, stem: &Path) -> Result<PathBuf, FetchError> {
        let output = tools::run(&self.program, self.args(url, stem))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let reported = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or(FetchError::NoFilename)?;

        let path = with_mp3_extension(Path::new(reported));
        if !path.exists() {
            return Err(FetchError::MissingOutput(path));
        }
        Ok(path)
    }
}

/// The downloader reports the pre-postprocess name (e.g. `.webm`); the file on
/// disk after extraction carries the MP3 extension instead.
pub fn with_mp3_extension(reported: &Path) -> PathBuf {
    reported.with_extension(MP3_EXTENSION)
}

/// Download the audio of `url` to `stem`.<ext>. Failures are logged, not returned.
pub fn download(fetcher: &dyn AudioFetcher, url: &str, stem: &Path) -> Option<PathBuf> {
    match fetcher.fetch_audio(url, stem) {
        Ok(path) => {
            log::info!("Downloaded audio for {} to {}", url, path.display());
            Some(path)
        }
        Err(e) => {
            log::error!("Error downloading audio: {}", e);
            None
        }
    }
}
