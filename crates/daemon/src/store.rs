//! Metadata store for processed-file bookkeeping across restarts.
//!
//! Owns the set of already-processed paths and the last-scan watermark,
//! persisted together as one small JSON snapshot. The store is the single
//! writer of this state; scanner and pipeline only read through it. A
//! persistence failure degrades the store to in-memory tracking for the
//! rest of the process so one unwritable disk never crashes the daemon or
//! causes duplicate output within a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur loading or persisting the state snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read the snapshot file.
    #[error("failed to read state snapshot: {0}")]
    Read(std::io::Error),

    /// Snapshot file exists but does not parse.
    #[error("failed to parse state snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to write the snapshot file.
    #[error("failed to write state snapshot: {0}")]
    Write(std::io::Error),
}

/// On-disk representation of the store.
#[derive(Debug, Serialize, Deserialize, Default)]
struct StoreSnapshot {
    processed: BTreeSet<PathBuf>,
    last_scan_unix_ms: u64,
}

struct StoreInner {
    processed: BTreeSet<PathBuf>,
    watermark_unix_ms: u64,
    /// Set after the first failed write; from then on the store is
    /// memory-only for the remainder of the process.
    degraded: bool,
}

/// Persistent processed-set and watermark state.
pub struct MetadataStore {
    state_path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl MetadataStore {
    /// Open the store from its snapshot file.
    ///
    /// A missing file yields an empty store with an epoch watermark, which
    /// is the normal first-run state. An unreadable or unparsable snapshot
    /// is an error; callers typically downgrade it to a fresh store plus a
    /// logged warning.
    pub fn open<P: AsRef<Path>>(state_path: P) -> Result<Self, StoreError> {
        let state_path = state_path.as_ref().to_path_buf();
        let snapshot = match fs::read_to_string(&state_path) {
            Ok(content) => serde_json::from_str::<StoreSnapshot>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(StoreError::Read(e)),
        };

        Ok(Self {
            state_path,
            inner: Mutex::new(StoreInner {
                processed: snapshot.processed,
                watermark_unix_ms: snapshot.last_scan_unix_ms,
                degraded: false,
            }),
        })
    }

    /// Create an empty store that will persist to `state_path`.
    pub fn empty<P: AsRef<Path>>(state_path: P) -> Self {
        Self {
            state_path: state_path.as_ref().to_path_buf(),
            inner: Mutex::new(StoreInner {
                processed: BTreeSet::new(),
                watermark_unix_ms: 0,
                degraded: false,
            }),
        }
    }

    /// Whether `path` has already been processed.
    pub fn is_processed(&self, path: &Path) -> bool {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner.processed.contains(path)
    }

    /// Record `path` as processed. Idempotent.
    ///
    /// The in-memory set is updated unconditionally, so the path counts as
    /// processed for the rest of the run even when the snapshot write fails.
    /// The first write failure is returned for the caller to log; subsequent
    /// calls skip the disk entirely.
    pub fn mark_processed(&self, path: &Path) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.processed.insert(path.to_path_buf());
        Self::persist(&self.state_path, &mut inner)
    }

    /// The current watermark. Files modified before it are not scan-eligible.
    pub fn watermark(&self) -> SystemTime {
        let inner = self.inner.lock().expect("store lock poisoned");
        UNIX_EPOCH + Duration::from_millis(inner.watermark_unix_ms)
    }

    /// Overwrite the watermark with `t`.
    ///
    /// No merge logic: the caller guarantees monotonic advancement by always
    /// passing the time captured before its scan began. Same degraded-mode
    /// semantics as [`MetadataStore::mark_processed`].
    pub fn advance_watermark(&self, t: SystemTime) -> Result<(), StoreError> {
        let millis = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.watermark_unix_ms = millis;
        Self::persist(&self.state_path, &mut inner)
    }

    /// True once a snapshot write has failed and the store went memory-only.
    pub fn is_degraded(&self) -> bool {
        self.inner.lock().expect("store lock poisoned").degraded
    }

    fn persist(state_path: &Path, inner: &mut StoreInner) -> Result<(), StoreError> {
        if inner.degraded {
            return Ok(());
        }

        let snapshot = StoreSnapshot {
            processed: inner.processed.clone(),
            last_scan_unix_ms: inner.watermark_unix_ms,
        };
        let content = serde_json::to_string_pretty(&snapshot)?;
        match fs::write(state_path, content) {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.degraded = true;
                Err(StoreError::Write(e))
            }
        }
    }
}
