//! Scan-wide counters, the per-scan summary, progress events, and the
//! cooperative cancellation token.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Shared atomic counters updated by worker threads as they go.
#[derive(Debug, Default)]
pub struct ScanStats {
    dirs_scanned: AtomicU64,
    files_seen: AtomicU64,
    bytes_discovered: AtomicU64,
    entries_skipped: AtomicU64,
    hardlinks_skipped: AtomicU64,
    unreadable_dirs: AtomicU64,
}

impl ScanStats {
    pub(crate) fn record_dir_scanned(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_file(&self, bytes: u64) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
        self.bytes_discovered.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_bundle_bytes(&self, bytes: u64) {
        self.bytes_discovered.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.entries_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hardlink_skip(&self) {
        self.hardlinks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unreadable_dir(&self) {
        self.unreadable_dirs.fetch_add(1, Ordering::Relaxed);
    }

    /// Directories fully enumerated so far.
    #[must_use]
    pub fn dirs_scanned(&self) -> u64 {
        self.dirs_scanned.load(Ordering::Relaxed)
    }

    /// Regular files whose bytes have been counted so far.
    #[must_use]
    pub fn files_seen(&self) -> u64 {
        self.files_seen.load(Ordering::Relaxed)
    }

    /// Bytes attributed to the tree so far (files plus aggregated bundles).
    #[must_use]
    pub fn bytes_discovered(&self) -> u64 {
        self.bytes_discovered.load(Ordering::Relaxed)
    }

    /// Entries dropped by policy or per-entry read failures.
    #[must_use]
    pub fn entries_skipped(&self) -> u64 {
        self.entries_skipped.load(Ordering::Relaxed)
    }

    /// Additional paths to an already-counted (device, inode) identity.
    #[must_use]
    pub fn hardlinks_skipped(&self) -> u64 {
        self.hardlinks_skipped.load(Ordering::Relaxed)
    }

    /// Directories that yielded no children due to open/permission errors.
    #[must_use]
    pub fn unreadable_dirs(&self) -> u64 {
        self.unreadable_dirs.load(Ordering::Relaxed)
    }
}

/// Final accounting for one completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// When the scan started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Directories fully enumerated.
    pub dirs_scanned: u64,
    /// Regular files counted.
    pub files_seen: u64,
    /// The root node's finalized byte total.
    pub total_bytes: u64,
    /// Entries dropped by policy or read failures.
    pub entries_skipped: u64,
    /// Hardlink re-encounters deduplicated.
    pub hardlinks_skipped: u64,
    /// Directories skipped whole due to open/permission errors.
    pub unreadable_dirs: u64,
    /// False when the scan was cancelled and totals are best-effort.
    pub completed: bool,
}

/// Progress event emitted on the optional event stream.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A directory finished enumeration.
    DirectoryScanned {
        /// The directory's absolute path.
        path: PathBuf,
        /// Bytes of its immediate file children (plus aggregated bundles).
        immediate_bytes: u64,
        /// Number of children that survived policy filtering.
        entries: usize,
    },
    /// All workers have exited.
    Finished {
        /// False when the scan was cancelled.
        completed: bool,
    },
}

/// Cooperative cancellation flag checked at each task boundary.
///
/// After cancellation, remaining tasks complete without enumerating, so
/// the termination protocol drains normally and every node finalizes with
/// whatever bytes were discovered up to that point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the scan stop at the next task boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
