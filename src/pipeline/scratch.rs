// Per-request scratch files
// Each request gets a unique token; its intermediate files are named from it

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Base name shared by every scratch file
const SCRATCH_PREFIX: &str = "audio";

/// Private scratch namespace for one pipeline run
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
    token: Uuid,
}

impl ScratchSpace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_token(dir, Uuid::new_v4())
    }

    pub fn with_token(dir: impl Into<PathBuf>, token: Uuid) -> Self {
        Self {
            dir: dir.into(),
            token,
        }
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download target without extension; the downloader picks it
    pub fn download_stem(&self) -> PathBuf {
        self.dir.join(format!("{}-{}", SCRATCH_PREFIX, self.token.simple()))
    }

    /// Converted output path
    pub fn wav_path(&self) -> PathBuf {
        self.download_stem().with_extension("wav")
    }

    /// Remove every file named after this token: partial downloads, muxer
    /// leftovers and the converted output alike
    pub fn clear(&self) {
        for (path, token) in scratch_entries(&self.dir) {
            if token == self.token {
                cleanup(&path);
            }
        }
    }
}

/// Remove scratch files from other runs that were last written more than
/// `max_age` ago. Files not named like scratch files are never touched.
pub fn sweep_stale(dir: &Path, max_age: Duration, current: Uuid) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;
    for (path, token) in scratch_entries(dir) {
        if token == current {
            continue;
        }
        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(|modified| now.duration_since(modified).unwrap_or(Duration::ZERO));
        match age {
            Ok(age) if age >= max_age => {
                cleanup(&path);
                removed += 1;
            }
            Ok(_) => {}
            Err(e) => log::warn!("Cannot read age of {}: {}", path.display(), e),
        }
    }
    if removed > 0 {
        log::info!("Swept {} stale scratch file(s) from {}", removed, dir.display());
    }
    removed
}

/// Token of a scratch file name such as `audio-<32 hex>.webm.part`
fn parse_token(name: &str) -> Option<Uuid> {
    let rest = name.strip_prefix(SCRATCH_PREFIX)?.strip_prefix('-')?;
    let simple = rest.get(..32)?;
    match rest[32..].chars().next() {
        None | Some('.') => Uuid::parse_str(simple).ok(),
        Some(_) => None,
    }
}

fn scratch_entries(dir: &Path) -> Vec<(PathBuf, Uuid)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot list scratch directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let token = parse_token(entry.file_name().to_str()?)?;
            Some((entry.path(), token))
        })
        .collect()
}

/// Owns an intermediate file and removes it when dropped, unless released
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give up ownership; the file stays on disk
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed {
            cleanup(&self.path);
        }
    }
}

/// Delete `path` if it exists. Never fails; errors are logged.
pub fn cleanup(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) => log::warn!("Error cleaning up file {}: {}", path.display(), e),
    }
}
