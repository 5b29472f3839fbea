// State management module
// Handles SQLite persistence and the managed storage area

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, DbConnection, DbError, DbResult};
pub use models::AudioRecord;
pub use queries::{create_audio_record, get_audio_record, list_audio_records};
pub use storage::{MediaStorage, StorageError};
