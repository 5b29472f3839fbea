// Database operations for audio records
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use std::path::Path;

use super::db::{DbConnection, DbError, DbResult, URL_MAX_LENGTH};
use super::models::AudioRecord;
use super::storage::MediaStorage;

const RECORD_COLUMNS: &str = "id, url, audio_file, created_at, sha256, bytes";

/// Save the file at `audio_path` into storage and insert its record.
///
/// The bytes are written first; if the insert fails they are removed again so
/// no record ever points at a half-saved file and no file is left without a
/// record.
pub fn create_audio_record(
    db: &DbConnection,
    storage: &MediaStorage,
    url: &str,
    audio_path: &Path,
) -> DbResult<AudioRecord> {
    let url_len = url.chars().count();
    if url_len > URL_MAX_LENGTH {
        return Err(DbError::UrlTooLong(url_len));
    }

    let data = std::fs::read(audio_path)?;
    let filename = audio_path.to_string_lossy();
    let stored = storage.save(&filename, &data)?;
    let created_at = Utc::now();

    let inserted = {
        let conn = db.lock();
        conn.execute(
            "INSERT INTO audio_records (url, audio_file, created_at, sha256, bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                stored.name,
                created_at.to_rfc3339(),
                stored.sha256,
                stored.bytes,
            ],
        )
        .map(|_| conn.last_insert_rowid())
    };

    let id = match inserted {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = storage.delete(&stored.name) {
                log::warn!("Failed to remove orphaned {}: {}", stored.name, cleanup);
            }
            return Err(e.into());
        }
    };

    Ok(AudioRecord {
        id,
        url: url.to_string(),
        audio_file: stored.name,
        created_at,
        sha256: stored.sha256,
        bytes: stored.bytes,
    })
}

/// Get an audio record by ID
pub fn get_audio_record(db: &DbConnection, id: i64) -> DbResult<Option<AudioRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM audio_records WHERE id = ?1",
        RECORD_COLUMNS
    ))?;

    let result = stmt.query_row([id], read_row);

    match result {
        Ok(row) => Ok(Some(row.into_record()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List all audio records, newest first
pub fn list_audio_records(db: &DbConnection) -> DbResult<Vec<AudioRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM audio_records ORDER BY created_at DESC, id DESC",
        RECORD_COLUMNS
    ))?;

    let rows = stmt
        .query_map([], read_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(RawRecord::into_record).collect()
}

// Row as stored; timestamps are parsed outside the rusqlite closure
struct RawRecord {
    id: i64,
    url: String,
    audio_file: String,
    created_at: String,
    sha256: String,
    bytes: i64,
}

impl RawRecord {
    fn into_record(self) -> DbResult<AudioRecord> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| DbError::CorruptRow {
                id: self.id,
                reason: format!("created_at {:?}: {}", self.created_at, e),
            })?
            .with_timezone(&Utc);

        Ok(AudioRecord {
            id: self.id,
            url: self.url,
            audio_file: self.audio_file,
            created_at,
            sha256: self.sha256,
            bytes: self.bytes,
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        audio_file: row.get(2)?,
        created_at: row.get(3)?,
        sha256: row.get(4)?,
        bytes: row.get(5)?,
    })
}
