// Download-persist-convert-cleanup pipeline
// One run per submitted URL; every step short-circuits on failure

pub mod scratch;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{self, Transcoder};
use crate::fetch::{self, AudioFetcher, MP3_EXTENSION};
use crate::state::{self, AudioRecord, DbConnection, MediaStorage};

pub use scratch::{cleanup, sweep_stale, ScratchFile, ScratchSpace};

/// How long a scratch file from an earlier run may stay on disk
pub const DEFAULT_SCRATCH_TTL: Duration = Duration::from_secs(60 * 60);

/// What happens to the downloaded MP3 when saving it fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScratchPolicy {
    /// Remove the intermediate file on every exit path
    #[default]
    CleanupAlways,
    /// Leave the intermediate file behind when persistence fails
    KeepOnSaveFailure,
}

/// User-visible failure of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    Download,
    Save,
    Convert,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            PipelineError::Download => "Error downloading audio or wrong file format.",
            PipelineError::Save => "Error saving audio to database.",
            PipelineError::Convert => "Error converting audio format.",
        };
        f.write_str(message)
    }
}

/// Result context handed to presentation.
///
/// `error` is the only failure ever reported. A conversion failure is the one
/// case where a saved record and an error appear together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutcome {
    pub audio_file: Option<AudioRecord>,
    pub converted_audio_path: Option<PathBuf>,
    pub error: Option<PipelineError>,
}

impl PipelineOutcome {
    pub fn failed(error: PipelineError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Save the file at `mp3_path` and record it. Failures are logged, not returned.
pub fn persist(
    db: &DbConnection,
    storage: &MediaStorage,
    url: &str,
    mp3_path: &Path,
) -> Option<AudioRecord> {
    match state::create_audio_record(db, storage, url, mp3_path) {
        Ok(record) => {
            log::info!("Saved record {} as {}", record.id, record.audio_file);
            Some(record)
        }
        Err(e) => {
            log::error!("Error saving audio to database: {}", e);
            None
        }
    }
}

/// The orchestrator and its collaborators
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn AudioFetcher>,
    transcoder: Arc<dyn Transcoder>,
    db: DbConnection,
    storage: MediaStorage,
    scratch_dir: PathBuf,
    policy: ScratchPolicy,
    scratch_ttl: Duration,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn AudioFetcher>,
        transcoder: Arc<dyn Transcoder>,
        db: DbConnection,
        storage: MediaStorage,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            db,
            storage,
            scratch_dir: scratch_dir.into(),
            policy: ScratchPolicy::default(),
            scratch_ttl: DEFAULT_SCRATCH_TTL,
        }
    }

    pub fn with_policy(mut self, policy: ScratchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Converted WAVs and kept downloads older than `ttl` are removed by later runs
    pub fn with_scratch_ttl(mut self, ttl: Duration) -> Self {
        self.scratch_ttl = ttl;
        self
    }

    pub fn db(&self) -> &DbConnection {
        &self.db
    }

    pub fn storage(&self) -> &MediaStorage {
        &self.storage
    }

    /// Run the pipeline for `url` in a fresh scratch namespace
    pub fn run(&self, url: &str) -> PipelineOutcome {
        self.run_in(url, &ScratchSpace::new(&self.scratch_dir))
    }

    pub fn run_in(&self, url: &str, scratch: &ScratchSpace) -> PipelineOutcome {
        log::info!("Processing {} (scratch {})", url, scratch.token());
        sweep_stale(scratch.dir(), self.scratch_ttl, scratch.token());

        let mp3 = match fetch::download(self.fetcher.as_ref(), url, &scratch.download_stem()) {
            Some(path) if has_mp3_extension(&path) => ScratchFile::new(path),
            Some(path) => {
                log::warn!("Downloaded file {} is not an mp3", path.display());
                cleanup(&path);
                scratch.clear();
                return PipelineOutcome::failed(PipelineError::Download);
            }
            None => {
                // The downloader may have left partial files under the stem
                scratch.clear();
                return PipelineOutcome::failed(PipelineError::Download);
            }
        };

        let record = match persist(&self.db, &self.storage, url, mp3.path()) {
            Some(record) => record,
            None => {
                if self.policy == ScratchPolicy::KeepOnSaveFailure {
                    let kept = mp3.keep();
                    log::warn!("Leaving intermediate file {}", kept.display());
                } else {
                    drop(mp3);
                    scratch.clear();
                }
                return PipelineOutcome::failed(PipelineError::Save);
            }
        };

        let converted =
            audio::convert(self.transcoder.as_ref(), mp3.path(), &scratch.wav_path());

        // The intermediate MP3 goes away here whether or not conversion worked
        drop(mp3);
        if converted.is_none() {
            cleanup(&scratch.wav_path());
        }

        let error = converted.is_none().then_some(PipelineError::Convert);
        PipelineOutcome {
            audio_file: Some(record),
            converted_audio_path: converted,
            error,
        }
    }
}

fn has_mp3_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(MP3_EXTENSION)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::wav::tests::write_pcm16;
    use crate::audio::{ensure_pcm_s16, ConvertError};
    use crate::fetch::FetchError;
    use crate::tools::ToolError;
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Writes fake MP3 bytes next to the requested stem
    pub(crate) struct FakeFetcher {
        pub(crate) extension: &'static str,
    }

    impl AudioFetcher for FakeFetcher {
        fn fetch_audio(&self, _url: &str, stem: &Path) -> Result<PathBuf, FetchError> {
            let path = stem.with_extension(self.extension);
            std::fs::write(&path, b"ID3\x04fake mp3 payload").unwrap();
            Ok(path)
        }
    }

    pub(crate) struct UnreachableFetcher;

    impl AudioFetcher for UnreachableFetcher {
        fn fetch_audio(&self, _url: &str, _stem: &Path) -> Result<PathBuf, FetchError> {
            Err(FetchError::Tool(ToolError::Failed {
                program: "yt-dlp".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "ERROR: Unable to download webpage".to_string(),
            }))
        }
    }

    /// Leaves partial downloads under the stem, then fails
    struct LeakyFetcher;

    impl AudioFetcher for LeakyFetcher {
        fn fetch_audio(&self, url: &str, stem: &Path) -> Result<PathBuf, FetchError> {
            std::fs::write(stem.with_extension("webm"), b"partial").unwrap();
            std::fs::write(stem.with_extension("webm.part"), b"partial").unwrap();
            UnreachableFetcher.fetch_audio(url, stem)
        }
    }

    pub(crate) struct FakeTranscoder;

    impl Transcoder for FakeTranscoder {
        fn transcode(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
            assert!(input.exists(), "mp3 must still exist during conversion");
            write_pcm16(output, 44100, 2, 4410);
            Ok(())
        }
    }

    pub(crate) struct BrokenTranscoder;

    impl Transcoder for BrokenTranscoder {
        fn transcode(&self, _input: &Path, _output: &Path) -> Result<(), ConvertError> {
            Err(ConvertError::Tool(ToolError::Failed {
                program: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            }))
        }
    }

    /// Produces a file that is not a WAV at all
    struct GarbageTranscoder;

    impl Transcoder for GarbageTranscoder {
        fn transcode(&self, _input: &Path, output: &Path) -> Result<(), ConvertError> {
            std::fs::write(output, b"not a wav").unwrap();
            Ok(())
        }
    }

    struct Harness {
        temp: TempDir,
        scratch: ScratchSpace,
        db: DbConnection,
        storage: MediaStorage,
    }

    impl Harness {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let scratch_dir = temp.path().join("scratch");
            std::fs::create_dir_all(&scratch_dir).unwrap();
            Self {
                scratch: ScratchSpace::with_token(scratch_dir, Uuid::new_v4()),
                db: DbConnection::open_in_memory().unwrap(),
                storage: MediaStorage::new(temp.path().join("media")),
                temp,
            }
        }

        fn pipeline(
            &self,
            fetcher: impl AudioFetcher + 'static,
            transcoder: impl Transcoder + 'static,
        ) -> Pipeline {
            Pipeline::new(
                Arc::new(fetcher),
                Arc::new(transcoder),
                self.db.clone(),
                self.storage.clone(),
                self.temp.path().join("scratch"),
            )
        }

        fn mp3(&self) -> PathBuf {
            self.scratch.download_stem().with_extension("mp3")
        }

        fn scratch_count(&self) -> usize {
            std::fs::read_dir(self.scratch.dir()).unwrap().count()
        }

        fn record_count(&self) -> usize {
            state::list_audio_records(&self.db).unwrap().len()
        }
    }

    #[test]
    fn test_success_saves_converts_and_cleans_up() {
        let h = Harness::new();
        let pipeline = h.pipeline(FakeFetcher { extension: "mp3" }, FakeTranscoder);

        let outcome = pipeline.run_in("https://www.youtube.com/watch?v=abc", &h.scratch);

        let record = outcome.audio_file.expect("record");
        assert_eq!(record.id, 1);
        assert_eq!(record.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(outcome.converted_audio_path, Some(h.scratch.wav_path()));
        assert_eq!(outcome.error, None);
        assert!(!h.mp3().exists());
        assert!(ensure_pcm_s16(&h.scratch.wav_path()).unwrap().is_pcm_s16());
        assert!(h.storage.path(&record.audio_file).exists());
    }

    #[test]
    fn test_download_failure_creates_no_record() {
        let h = Harness::new();
        let pipeline = h.pipeline(UnreachableFetcher, FakeTranscoder);

        let outcome = pipeline.run_in("https://unreachable.invalid/v", &h.scratch);

        assert_eq!(outcome.error, Some(PipelineError::Download));
        assert_eq!(
            outcome.error.unwrap().to_string(),
            "Error downloading audio or wrong file format."
        );
        assert!(outcome.audio_file.is_none());
        assert!(outcome.converted_audio_path.is_none());
        assert_eq!(h.record_count(), 0);
    }

    #[test]
    fn test_wrong_extension_is_download_error() {
        let h = Harness::new();
        let pipeline = h.pipeline(FakeFetcher { extension: "webm" }, FakeTranscoder);

        let outcome = pipeline.run_in("https://www.youtube.com/watch?v=abc", &h.scratch);

        assert_eq!(outcome.error, Some(PipelineError::Download));
        assert!(outcome.audio_file.is_none());
        assert_eq!(h.record_count(), 0);
        assert!(!h.scratch.download_stem().with_extension("webm").exists());
    }

    fn break_database(h: &Harness) {
        h.db.lock().execute("DROP TABLE audio_records", []).unwrap();
    }

    #[test]
    fn test_save_failure_cleans_up_by_default() {
        let h = Harness::new();
        break_database(&h);
        let pipeline = h.pipeline(FakeFetcher { extension: "mp3" }, FakeTranscoder);

        let outcome = pipeline.run_in("https://www.youtube.com/watch?v=abc", &h.scratch);

        assert_eq!(outcome.error, Some(PipelineError::Save));
        assert_eq!(outcome.error.unwrap().to_string(), "Error saving audio to database.");
        assert!(outcome.audio_file.is_none());
        assert!(!h.mp3().exists());
        assert!(!h.scratch.wav_path().exists());
    }

    #[test]
    fn test_save_failure_can_keep_intermediate_file() {
        let h = Harness::new();
        break_database(&h);
        let pipeline = h
            .pipeline(FakeFetcher { extension: "mp3" }, FakeTranscoder)
            .with_policy(ScratchPolicy::KeepOnSaveFailure);

        let outcome = pipeline.run_in("https://www.youtube.com/watch?v=abc", &h.scratch);

        assert_eq!(outcome.error, Some(PipelineError::Save));
        assert!(h.mp3().exists());
    }

    #[test]
    fn test_convert_failure_reports_record_and_error() {
        let h = Harness::new();
        let pipeline = h.pipeline(FakeFetcher { extension: "mp3" }, BrokenTranscoder);

        let outcome = pipeline.run_in("https://www.youtube.com/watch?v=abc", &h.scratch);

        assert_eq!(outcome.audio_file.as_ref().map(|r| r.id), Some(1));
        assert!(outcome.converted_audio_path.is_none());
        assert_eq!(outcome.error, Some(PipelineError::Convert));
        assert_eq!(outcome.error.unwrap().to_string(), "Error converting audio format.");
        assert!(!h.mp3().exists());
        assert!(!h.scratch.wav_path().exists());
        assert_eq!(h.record_count(), 1);
    }

    #[test]
    fn test_rejected_wav_is_removed() {
        let h = Harness::new();
        let pipeline = h.pipeline(FakeFetcher { extension: "mp3" }, GarbageTranscoder);

        let outcome = pipeline.run_in("https://www.youtube.com/watch?v=abc", &h.scratch);

        assert_eq!(outcome.error, Some(PipelineError::Convert));
        assert!(outcome.audio_file.is_some());
        assert_eq!(h.scratch_count(), 0);
    }

    #[test]
    fn test_failed_downloads_leave_no_partial_files() {
        let h = Harness::new();
        let pipeline = h.pipeline(LeakyFetcher, FakeTranscoder);

        for _ in 0..3 {
            let outcome = pipeline.run("https://unreachable.invalid/v");
            assert_eq!(outcome.error, Some(PipelineError::Download));
        }

        assert_eq!(h.scratch_count(), 0);
        assert_eq!(h.record_count(), 0);
    }

    #[test]
    fn test_scratch_stays_bounded_across_runs() {
        let h = Harness::new();
        let pipeline = h
            .pipeline(FakeFetcher { extension: "mp3" }, FakeTranscoder)
            .with_scratch_ttl(Duration::ZERO);

        for i in 0..5 {
            let outcome = pipeline.run(&format!("https://www.youtube.com/watch?v={}", i));
            assert!(outcome.converted_audio_path.unwrap().exists());
        }
        // Only the newest WAV survives; earlier ones were swept by later runs
        assert_eq!(h.scratch_count(), 1);
        assert_eq!(h.record_count(), 5);

        let leaky = h.pipeline(LeakyFetcher, FakeTranscoder).with_scratch_ttl(Duration::ZERO);
        for _ in 0..3 {
            leaky.run("https://unreachable.invalid/v");
        }
        assert_eq!(h.scratch_count(), 0);
    }

    #[test]
    fn test_fresh_wavs_outlive_the_response() {
        let h = Harness::new();
        let pipeline = h.pipeline(FakeFetcher { extension: "mp3" }, FakeTranscoder);

        for i in 0..3 {
            pipeline.run(&format!("https://www.youtube.com/watch?v={}", i));
        }

        assert_eq!(h.scratch_count(), 3);
    }

    #[test]
    fn test_kept_download_is_swept_by_a_later_run() {
        let h = Harness::new();
        break_database(&h);
        let pipeline = h
            .pipeline(FakeFetcher { extension: "mp3" }, FakeTranscoder)
            .with_policy(ScratchPolicy::KeepOnSaveFailure)
            .with_scratch_ttl(Duration::ZERO);

        pipeline.run_in("https://www.youtube.com/watch?v=abc", &h.scratch);
        assert!(h.mp3().exists());

        pipeline.run("https://www.youtube.com/watch?v=def");
        assert!(!h.mp3().exists());
    }

    #[test]
    fn test_consecutive_runs_do_not_share_scratch_files() {
        let h = Harness::new();
        let pipeline = h.pipeline(FakeFetcher { extension: "mp3" }, FakeTranscoder);

        let first = pipeline.run("https://www.youtube.com/watch?v=a");
        let second = pipeline.run("https://www.youtube.com/watch?v=b");

        let first_wav = first.converted_audio_path.unwrap();
        let second_wav = second.converted_audio_path.unwrap();
        assert_ne!(first_wav, second_wav);
        assert!(first_wav.exists());
        assert!(second_wav.exists());
        assert_ne!(
            first.audio_file.unwrap().audio_file,
            second.audio_file.unwrap().audio_file
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PipelineError::Download.to_string(),
            "Error downloading audio or wrong file format."
        );
        assert_eq!(PipelineError::Save.to_string(), "Error saving audio to database.");
        assert_eq!(PipelineError::Convert.to_string(), "Error converting audio format.");
    }
}
