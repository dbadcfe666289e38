//! Directory enumeration and the policy layer applied to each child.
//!
//! One call reads one directory's immediate children and classifies each
//! as a file, a subdirectory, or an opaque bundle, applying in order: the
//! prune list, the symlink rule (never followed, never counted), device
//! containment, and the size-accounting mode. Per-entry metadata failures
//! skip that entry silently; a directory that cannot be opened yields no
//! children rather than failing the scan.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::core::config::{BundlePolicy, ScanOptions, SizeAccounting};
use crate::scanner::progress::ScanStats;
use crate::scanner::visited::FileId;

/// Classification of one surviving directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// Regular file.
    File,
    /// Subdirectory to be enqueued as its own task.
    Directory,
    /// Directory with a bundle suffix, handled per [`BundlePolicy`].
    Bundle,
}

/// Transient result of reading one directory entry. Never outlives the
/// enumeration step that produced it.
#[derive(Debug, Clone)]
pub struct ChildEntry {
    /// Absolute path of the child.
    pub path: PathBuf,
    /// Classification after policy filtering.
    pub kind: ChildKind,
    /// Byte size in the selected accounting mode; meaningful for files.
    pub size: u64,
    /// (device, inode) identity for visited-set deduplication.
    pub id: FileId,
}

/// Per-scan policy snapshot handed to every worker.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    pruned_paths: Vec<PathBuf>,
    bundle_suffixes: HashSet<String>,
    /// Selected size metric for the whole scan.
    pub accounting: SizeAccounting,
    /// How bundle directories are folded into totals.
    pub bundle_policy: BundlePolicy,
    stay_on_device: bool,
    root_dev: u64,
}

impl ScanPolicy {
    /// Build the policy from validated options plus the scan root's device.
    #[must_use]
    pub fn from_options(options: &ScanOptions, root_dev: u64) -> Self {
        Self {
            pruned_paths: options.pruned_paths.clone(),
            bundle_suffixes: options.bundle_suffixes.iter().cloned().collect(),
            accounting: options.size_accounting,
            bundle_policy: options.bundle_policy,
            stay_on_device: options.stay_on_device,
            root_dev,
        }
    }

    pub(crate) fn is_pruned(&self, path: &Path) -> bool {
        self.pruned_paths.iter().any(|prefix| path.starts_with(prefix))
    }

    pub(crate) fn crosses_device(&self, dev: u64) -> bool {
        self.stay_on_device && dev != self.root_dev
    }

    pub(crate) fn is_bundle_name(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.bundle_suffixes.contains(&ext))
    }
}

/// Read one directory's immediate children, policy applied.
///
/// Symlinks, pruned paths, cross-device children, and entries whose
/// metadata cannot be read are dropped here (and counted in `stats`);
/// everything returned is a file, subdirectory, or bundle the caller
/// should account for.
pub fn read_children(dir: &Path, policy: &ScanPolicy, stats: &ScanStats) -> Vec<ChildEntry> {
    let entries = match open_dir_with_retry(dir) {
        Ok(entries) => entries,
        Err(err) => {
            // Unreadable directory: zero children, zero bytes, scan goes on.
            debug!(path = %dir.display(), error = %err, "directory not enumerable");
            stats.record_unreadable_dir();
            return Vec::new();
        }
    };

    let mut children = Vec::new();
    for entry_result in entries {
        let Ok(entry) = entry_result else {
            stats.record_skip();
            continue;
        };
        let child_path = entry.path();

        // file_type() is typically free (carried by the directory entry).
        let Ok(file_type) = entry.file_type() else {
            stats.record_skip();
            continue;
        };

        // Symlinks are classified and discarded: never followed, never
        // counted, so link cycles and double-counted targets cannot occur.
        if file_type.is_symlink() {
            stats.record_skip();
            continue;
        }

        if policy.is_pruned(&child_path) {
            stats.record_skip();
            continue;
        }

        // DirEntry::metadata does not traverse symlinks; a file deleted
        // between readdir and stat lands here and is skipped.
        let Ok(meta) = entry.metadata() else {
            stats.record_skip();
            continue;
        };

        let id = identity_of(&child_path, &meta);
        if policy.crosses_device(id.dev) {
            stats.record_skip();
            continue;
        }

        let kind = if file_type.is_dir() {
            if policy.is_bundle_name(&child_path) {
                ChildKind::Bundle
            } else {
                ChildKind::Directory
            }
        } else if file_type.is_file() {
            ChildKind::File
        } else {
            // Sockets, fifos, device nodes: no bytes worth charting.
            stats.record_skip();
            continue;
        };

        children.push(ChildEntry {
            path: child_path,
            kind,
            size: file_size(&meta, policy.accounting),
            id,
        });
    }
    children
}

/// Open a directory for reading, retrying briefly when the process is out
/// of file descriptors. Exhausted retries degrade to an entry-level skip
/// at the caller.
pub(crate) fn open_dir_with_retry(dir: &Path) -> std::io::Result<fs::ReadDir> {
    let mut delay = OPEN_RETRY_INITIAL_DELAY;
    for _ in 0..OPEN_RETRY_ATTEMPTS {
        match fs::read_dir(dir) {
            Err(err) if is_fd_exhaustion(&err) => {
                thread::sleep(delay);
                delay *= 2;
            }
            other => return other,
        }
    }
    fs::read_dir(dir)
}

#[cfg(unix)]
fn is_fd_exhaustion(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMFILE | libc::ENFILE))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_err: &std::io::Error) -> bool {
    false
}

/// Byte size of a file in the selected accounting mode.
pub(crate) fn file_size(meta: &fs::Metadata, accounting: SizeAccounting) -> u64 {
    match accounting {
        SizeAccounting::Logical => meta.len(),
        SizeAccounting::Allocated => allocated_size(meta),
    }
}

#[cfg(unix)]
fn allocated_size(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    // st_blocks is always in 512-byte units, independent of the
    // filesystem's preferred block size.
    meta.blocks() * 512
}

#[cfg(not(unix))]
fn allocated_size(meta: &fs::Metadata) -> u64 {
    meta.len()
}

/// (device, inode) identity for hardlink/cycle deduplication.
#[cfg(unix)]
pub(crate) fn identity_of(_path: &Path, meta: &fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    FileId::new(meta.dev(), meta.ino())
}

/// Without inode identity, synthesize one from the path so deduplication
/// degrades to exact-path dedup instead of collapsing everything.
#[cfg(not(unix))]
pub(crate) fn identity_of(path: &Path, _meta: &fs::Metadata) -> FileId {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    FileId::new(0, hasher.finish())
}

/// Attempts made to open a directory under fd exhaustion before giving up.
const OPEN_RETRY_ATTEMPTS: u32 = 4;

/// First backoff step; doubles per attempt (1, 2, 4, 8 ms).
const OPEN_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(1);
