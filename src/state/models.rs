// Data models for audiograb state management
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One downloaded audio asset. Write-once: there is no update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRecord {
    pub id: i64,
    pub url: String,
    /// Storage name relative to the media root
    pub audio_file: String,
    pub created_at: DateTime<Utc>,
    pub sha256: String,
    pub bytes: i64,
}

impl AudioRecord {
    /// Base name of the stored file, used as the download filename
    pub fn file_name(&self) -> &str {
        Path::new(&self.audio_file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.audio_file)
    }
}

impl std::fmt::Display for AudioRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.audio_file)
    }
}
