//! Filesystem change subscription for the watched directory.
//!
//! Write events anywhere in the directory collapse into coarse
//! [`ScanTrigger::DirectoryChanged`] messages on a bounded channel. When
//! the channel is full a trigger is simply dropped: a scan is already
//! pending, and the watermark test makes the next scan pick up whatever
//! the dropped trigger would have found.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// A unit of work for the daemon's scan loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanTrigger {
    /// The watched directory was written to; run a full scan.
    DirectoryChanged,
    /// The user pointed at specific files or directories.
    Manual(Vec<PathBuf>),
}

/// Live subscription on the watched directory.
///
/// Holds the platform watcher; dropping this value cancels the
/// subscription.
pub struct ChangeNotifier {
    _watcher: RecommendedWatcher,
}

/// Subscribe to write events on `dir`, forwarding coalesced triggers into
/// `sender`.
///
/// The subscription is non-recursive: this daemon only manages one
/// directory level. Watcher callbacks arrive on a platform thread owned by
/// `notify`; the only work done there is a non-blocking channel send.
pub fn watch_directory(
    dir: &Path,
    sender: mpsc::Sender<ScanTrigger>,
) -> Result<ChangeNotifier, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) if is_write_event(&event.kind) => {
                // A full channel means a scan is already queued; drop.
                let _ = sender.try_send(ScanTrigger::DirectoryChanged);
            }
            _ => {}
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(ChangeNotifier { _watcher: watcher })
}

/// Whether an event kind represents content arriving or changing.
fn is_write_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
