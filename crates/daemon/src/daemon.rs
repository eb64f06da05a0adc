//! Daemon wiring and scan loop for imglite.
//!
//! Owns the metadata store, codec, and event log, and runs the single
//! consumer loop that serializes all scan work. Change notifications and
//! manual selections arrive as [`ScanTrigger`]s on one channel and share
//! one batch code path, so watermark and processed-set updates can never
//! interleave.

use crate::codec::{ImageCodec, ImageRsCodec};
use crate::events::EventLog;
use crate::pipeline::{process_file, PipelineOptions};
use crate::scan::{check_file, scan_directory};
use crate::store::MetadataStore;
use crate::watch::{watch_directory, ScanTrigger};
use imglite_config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The watched directory could not be created or accessed.
    #[error("failed to create watch directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The filesystem watcher could not be established.
    #[error("failed to start directory watcher: {0}")]
    Watch(#[from] notify::Error),

    /// A manual selection could not be queued.
    #[error("failed to submit manual selection: {0}")]
    Submit(String),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    store: Arc<MetadataStore>,
    codec: Arc<dyn ImageCodec>,
    log: Arc<EventLog>,
    /// Trigger queue sender
    trigger_tx: mpsc::Sender<ScanTrigger>,
    /// Trigger queue receiver (wrapped for async access)
    trigger_rx: RwLock<mpsc::Receiver<ScanTrigger>>,
}

impl Daemon {
    /// Initialize the daemon with the production codec.
    ///
    /// Ensures the watched directory exists (creating it if needed) and
    /// loads the state snapshot. An unreadable snapshot downgrades to an
    /// empty store with a logged warning; a directory that cannot be
    /// created is fatal, since monitoring cannot be established.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        Self::with_codec(config, Arc::new(ImageRsCodec))
    }

    /// Initialize the daemon with a caller-provided codec.
    ///
    /// Useful for testing the scan loop without real encoders.
    pub fn with_codec(config: Config, codec: Arc<dyn ImageCodec>) -> Result<Self, DaemonError> {
        let log = Arc::new(EventLog::new(config.log.capacity));

        let dir = &config.watch.directory;
        if !dir.exists() {
            match std::fs::create_dir_all(dir) {
                Ok(()) => log.info(format!("created watch folder {}", dir.display())),
                Err(e) => {
                    log.error(format!(
                        "cannot create watch folder {}: {}",
                        dir.display(),
                        e
                    ));
                    return Err(DaemonError::CreateDirectory {
                        path: dir.clone(),
                        source: e,
                    });
                }
            }
        }

        let state_path = config.watch.resolved_state_file();
        let store = match MetadataStore::open(&state_path) {
            Ok(store) => store,
            Err(e) => {
                log.warn(format!(
                    "state snapshot unreadable ({}); starting with empty history",
                    e
                ));
                MetadataStore::empty(&state_path)
            }
        };

        let (trigger_tx, trigger_rx) = mpsc::channel(8);

        Ok(Self {
            config,
            store: Arc::new(store),
            codec,
            log,
            trigger_tx,
            trigger_rx: RwLock::new(trigger_rx),
        })
    }

    /// Get a clone of the trigger sender for external submission
    pub fn trigger_sender(&self) -> mpsc::Sender<ScanTrigger> {
        self.trigger_tx.clone()
    }

    /// Get the shared event log
    pub fn log(&self) -> Arc<EventLog> {
        self.log.clone()
    }

    /// Get the metadata store
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Queue a manual selection of files and/or directories.
    ///
    /// Directories are scanned like a change notification; files go through
    /// the same eligibility filters individually. The batch runs on the
    /// daemon loop, never concurrently with another scan.
    pub async fn submit_paths(&self, paths: Vec<PathBuf>) -> Result<(), DaemonError> {
        self.trigger_tx
            .send(ScanTrigger::Manual(paths))
            .await
            .map_err(|e| DaemonError::Submit(e.to_string()))
    }

    /// Run the daemon: subscribe to directory changes and process triggers
    /// until the queue closes.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let _notifier = watch_directory(&self.config.watch.directory, self.trigger_tx.clone())?;
        self.log.info(format!(
            "monitoring started for {}",
            self.config.watch.directory.display()
        ));

        loop {
            let trigger = {
                let mut rx = self.trigger_rx.write().await;
                rx.recv().await
            };

            match trigger {
                Some(trigger) => self.execute(trigger).await,
                None => break,
            }
        }

        Ok(())
    }

    /// Drain any queued triggers, then run one directory scan and return.
    ///
    /// This is the one-shot mode: queued manual selections are processed
    /// first so `submit_paths` + `run_once` behaves like a short-lived
    /// daemon.
    pub async fn run_once(&self) {
        loop {
            let queued = { self.trigger_rx.write().await.try_recv().ok() };
            match queued {
                Some(trigger) => self.execute(trigger).await,
                None => break,
            }
        }
        self.execute(ScanTrigger::DirectoryChanged).await;
    }

    /// Execute one trigger batch on a blocking worker.
    ///
    /// Awaited inline, so batches never overlap even though the decode and
    /// encode work runs off the async runtime.
    async fn execute(&self, trigger: ScanTrigger) {
        let scan_start = SystemTime::now();
        let watched_dir = self.config.watch.directory.clone();
        let store = self.store.clone();
        let codec = self.codec.clone();
        let log = self.log.clone();
        let options = PipelineOptions {
            delete_originals: self.config.processing.delete_originals,
            convert_png_to_jpeg: self.config.processing.convert_png_to_jpeg,
        };

        let result = tokio::task::spawn_blocking(move || {
            run_batch(
                trigger,
                scan_start,
                &watched_dir,
                codec.as_ref(),
                &store,
                &log,
                &options,
            );
        })
        .await;

        if result.is_err() {
            self.log.error("scan worker panicked");
        }
    }
}

/// Process one trigger batch sequentially, then advance the watermark to
/// the batch start time.
///
/// The watermark advances regardless of per-file outcomes, so a
/// permanently failing file is not retried on every unrelated write event.
/// A directory read failure aborts before any state mutation.
fn run_batch(
    trigger: ScanTrigger,
    scan_start: SystemTime,
    watched_dir: &Path,
    codec: &dyn ImageCodec,
    store: &MetadataStore,
    log: &EventLog,
    options: &PipelineOptions,
) {
    match trigger {
        ScanTrigger::DirectoryChanged => {
            let candidates = match scan_directory(watched_dir, store) {
                Ok(candidates) => candidates,
                Err(e) => {
                    log.error(format!("failed to read {}: {}", watched_dir.display(), e));
                    return;
                }
            };
            for candidate in &candidates {
                process_file(&candidate.path, codec, store, log, options);
            }
        }
        ScanTrigger::Manual(paths) => {
            for path in &paths {
                if path.is_dir() {
                    match scan_directory(path, store) {
                        Ok(candidates) => {
                            for candidate in &candidates {
                                process_file(&candidate.path, codec, store, log, options);
                            }
                        }
                        Err(e) => log.error(format!("failed to read {}: {}", path.display(), e)),
                    }
                } else {
                    match check_file(path, store) {
                        Ok(candidate) => {
                            process_file(&candidate.path, codec, store, log, options);
                        }
                        Err(reason) => {
                            log.info(format!("skipped {}: {}", path.display(), reason))
                        }
                    }
                }
            }
        }
    }

    if let Err(e) = store.advance_watermark(scan_start) {
        log.warn(format!("watermark not persisted: {}", e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use imglite_config::{LogConfig, ProcessingConfig, WatchConfig};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> Config {
        Config {
            watch: WatchConfig {
                directory: dir.to_path_buf(),
                state_file: None,
            },
            processing: ProcessingConfig {
                delete_originals: true,
                convert_png_to_jpeg: true,
            },
            log: LogConfig { capacity: 500 },
        }
    }

    fn write_rgb_png(path: &Path) {
        let mut img = RgbImage::new(8, 8);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 30) as u8, (y * 30) as u8, 128]);
        }
        DynamicImage::ImageRgb8(img).save(path).unwrap();
    }

    fn log_messages(daemon: &Daemon) -> Vec<String> {
        daemon.log().snapshot().into_iter().map(|e| e.message).collect()
    }

    #[tokio::test]
    async fn test_new_creates_missing_watch_directory() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("incoming");
        let daemon = Daemon::new(test_config(&watched)).unwrap();

        assert!(watched.is_dir());
        assert!(log_messages(&daemon)
            .iter()
            .any(|m| m.contains("created watch folder")));
    }

    #[tokio::test]
    async fn test_new_fails_when_directory_cannot_be_created() {
        let temp_dir = TempDir::new().unwrap();
        // A file where the directory should go.
        let blocked = temp_dir.path().join("blocked");
        std::fs::write(&blocked, b"file").unwrap();

        let result = Daemon::new(test_config(&blocked.join("sub")));
        assert!(matches!(
            result,
            Err(DaemonError::CreateDirectory { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_state_snapshot_starts_fresh_with_warning() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        std::fs::write(config.watch.resolved_state_file(), "{broken").unwrap();

        let daemon = Daemon::new(config).unwrap();
        assert!(log_messages(&daemon)
            .iter()
            .any(|m| m.contains("state snapshot unreadable")));
    }

    #[tokio::test]
    async fn test_run_once_compresses_and_advances_watermark() {
        let temp_dir = TempDir::new().unwrap();
        let daemon = Daemon::new(test_config(temp_dir.path())).unwrap();
        let photo = temp_dir.path().join("photo.png");
        write_rgb_png(&photo);

        assert_eq!(daemon.store().watermark(), UNIX_EPOCH);
        daemon.run_once().await;

        assert!(temp_dir.path().join("photo_lite.jpeg").exists());
        assert!(!photo.exists());
        assert!(daemon.store().is_processed(&photo));
        assert!(daemon.store().watermark() > UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_second_scan_of_unchanged_directory_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let daemon = Daemon::new(test_config(temp_dir.path())).unwrap();
        write_rgb_png(&temp_dir.path().join("a.png"));
        write_rgb_png(&temp_dir.path().join("b.png"));

        daemon.run_once().await;
        daemon.run_once().await;

        let compressed = log_messages(&daemon)
            .iter()
            .filter(|m| m.contains("compressed"))
            .count();
        assert_eq!(compressed, 2);
    }

    #[tokio::test]
    async fn test_files_below_watermark_are_not_scanned() {
        let temp_dir = TempDir::new().unwrap();
        let daemon = Daemon::new(test_config(temp_dir.path())).unwrap();
        let photo = temp_dir.path().join("photo.png");
        write_rgb_png(&photo);

        daemon
            .store()
            .advance_watermark(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();
        daemon.run_once().await;

        assert!(photo.exists());
        assert!(!temp_dir.path().join("photo_lite.jpeg").exists());
    }

    #[tokio::test]
    async fn test_manual_file_selection_shares_the_pipeline() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        let daemon = Daemon::new(test_config(&watched)).unwrap();

        // A file outside the watched directory, selected explicitly.
        let elsewhere = temp_dir.path().join("elsewhere");
        std::fs::create_dir(&elsewhere).unwrap();
        let photo = elsewhere.join("photo.png");
        write_rgb_png(&photo);

        daemon.submit_paths(vec![photo.clone()]).await.unwrap();
        daemon.run_once().await;

        assert!(elsewhere.join("photo_lite.jpeg").exists());
        assert!(!photo.exists());
        assert!(daemon.store().is_processed(&photo));
    }

    #[tokio::test]
    async fn test_manual_directory_selection_scans_it() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        let daemon = Daemon::new(test_config(&watched)).unwrap();

        let elsewhere = temp_dir.path().join("elsewhere");
        std::fs::create_dir(&elsewhere).unwrap();
        write_rgb_png(&elsewhere.join("a.png"));
        write_rgb_png(&elsewhere.join("b.png"));

        daemon.submit_paths(vec![elsewhere.clone()]).await.unwrap();
        daemon.run_once().await;

        assert!(elsewhere.join("a_lite.jpeg").exists());
        assert!(elsewhere.join("b_lite.jpeg").exists());
    }

    #[tokio::test]
    async fn test_manual_selection_of_ineligible_file_logs_skip() {
        let temp_dir = TempDir::new().unwrap();
        let daemon = Daemon::new(test_config(temp_dir.path())).unwrap();
        let notes = temp_dir.path().join("notes.txt");
        std::fs::write(&notes, b"text").unwrap();

        daemon.submit_paths(vec![notes.clone()]).await.unwrap();
        daemon.run_once().await;

        assert!(log_messages(&daemon)
            .iter()
            .any(|m| m.contains("skipped") && m.contains("unsupported extension")));
        assert!(notes.exists());
    }

    #[tokio::test]
    async fn test_bad_file_does_not_abort_the_batch() {
        let temp_dir = TempDir::new().unwrap();
        let daemon = Daemon::new(test_config(temp_dir.path())).unwrap();
        std::fs::write(temp_dir.path().join("corrupt.png"), b"junk").unwrap();
        write_rgb_png(&temp_dir.path().join("good.png"));

        daemon.run_once().await;

        assert!(temp_dir.path().join("good_lite.jpeg").exists());
        assert!(temp_dir.path().join("corrupt.png").exists());
        assert!(log_messages(&daemon)
            .iter()
            .any(|m| m.contains("decode failed")));
    }
}
