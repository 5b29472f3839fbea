// Managed storage area for persisted audio bytes
// Files live under <media_root>/audios/ and are addressed by a relative storage name
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Subdirectory of the media root that holds audio uploads
pub const UPLOAD_TO: &str = "audios";

/// Length of the random suffix used when a name is already taken
const SUFFIX_LEN: usize = 7;

/// Upper bound on name collisions before giving up
const MAX_NAME_ATTEMPTS: usize = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("No available name for {0}")]
    NameExhausted(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the default data directory for audiograb
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    Ok(data_dir.join("com.audiograb.app"))
}

/// A file saved into managed storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name relative to the media root, e.g. `audios/audio.mp3`
    pub name: String,
    pub sha256: String,
    pub bytes: i64,
}

/// File-backed byte store rooted at the media directory
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage name to its on-disk path
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Save bytes under `audios/<filename>`, picking a free name if needed.
    /// Never overwrites an existing file.
    pub fn save(&self, filename: &str, data: &[u8]) -> StorageResult<StoredFile> {
        let base = sanitize_filename(filename)?;
        let dir = self.root.join(UPLOAD_TO);
        fs::create_dir_all(&dir)?;

        let mut candidate = base.clone();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let file_path = dir.join(&candidate);
            // create_new fails if someone else holds the name
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file_path)
            {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
                        drop(file);
                        discard_partial(&file_path);
                        return Err(e.into());
                    }

                    return Ok(StoredFile {
                        name: format!("{}/{}", UPLOAD_TO, candidate),
                        sha256: calculate_sha256(data),
                        bytes: data.len() as i64,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    candidate = alternative_name(&base);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::NameExhausted(base))
    }

    /// Remove a stored file. Missing files are not an error.
    pub fn delete(&self, name: &str) -> StorageResult<()> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keep only the final path component of a client-supplied name
fn sanitize_filename(filename: &str) -> StorageResult<String> {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::InvalidName(filename.to_string()))?;

    if base.is_empty() || base == "." || base == ".." {
        return Err(StorageError::InvalidName(filename.to_string()));
    }

    Ok(base.to_string())
}

/// Remove a file whose write failed; a failure to remove is only logged
fn discard_partial(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to remove partial file {}: {}", path.display(), e);
            false
        }
    }
}

/// `audio.mp3` -> `audio_x7Gq2Lp.mp3`
fn alternative_name(base: &str) -> String {
    let path = Path::new(base);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(base);
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SUFFIX_LEN)
        .collect();

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    }
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
