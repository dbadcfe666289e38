//! Tree nodes and the atomic finalize/bubble-up aggregation protocol.
//!
//! Ownership flows strictly downward: a parent's child list holds the only
//! strong references, and the parent back-reference used for upward size
//! propagation is weak. All hot-path mutation goes through atomics — the
//! child-list mutex is touched only by the single worker enumerating that
//! directory and by post-scan readers, never during bubble-up.
//!
//! A directory's total becomes final in exactly one place: the one thread
//! that wins the `finalized` swap after the pending-subdirectory counter
//! reaches zero. Aggregation is strictly additive and commutative, so the
//! order in which children finish never changes the result.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

/// What a node represents on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Regular file leaf.
    File,
    /// Directory (including opaque bundles, which stay childless).
    Directory,
}

/// One filesystem entry discovered during a scan.
///
/// Created when discovered, mutated by exactly one worker at enumeration
/// time and by racing workers only through the atomic counters below,
/// immutable once finalized.
pub struct FileNode {
    path: PathBuf,
    kind: NodeKind,
    depth: usize,
    parent: Weak<FileNode>,
    children: Mutex<Vec<Arc<FileNode>>>,

    /// Running total: immediate file bytes plus every finalized child
    /// directory's total that has bubbled up so far.
    aggregate: AtomicU64,
    /// Subdirectories discovered but not yet finalized. Set exactly once,
    /// after enumeration, before child tasks are enqueued; only decreases
    /// afterwards.
    pending_dirs: AtomicUsize,
    /// One-shot claim that fixes the node's total.
    finalized: AtomicBool,
    /// Published total, valid once finalized (or sealed/stored for leaves).
    size: AtomicU64,
}

impl FileNode {
    /// Create the tree root at depth 0.
    #[must_use]
    pub fn new_root(path: PathBuf, kind: NodeKind) -> Arc<Self> {
        Arc::new(Self {
            path,
            kind,
            depth: 0,
            parent: Weak::new(),
            children: Mutex::new(Vec::new()),
            aggregate: AtomicU64::new(0),
            pending_dirs: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
            size: AtomicU64::new(0),
        })
    }

    /// Create a child of `parent`. The parent pointer is set here and never
    /// mutated afterwards, so concurrent bubble-up reads need no further
    /// synchronization.
    #[must_use]
    pub fn new_child(path: PathBuf, kind: NodeKind, parent: &Arc<Self>, depth: usize) -> Arc<Self> {
        Arc::new(Self {
            path,
            kind,
            depth,
            parent: Arc::downgrade(parent),
            children: Mutex::new(Vec::new()),
            aggregate: AtomicU64::new(0),
            pending_dirs: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
            size: AtomicU64::new(0),
        })
    }

    /// Absolute path of this entry.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name: the path's final component.
    #[must_use]
    pub fn name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }

    /// File or directory.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Levels below the scan root (root is 0).
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Upgraded parent reference; `None` for the root or once the tree is
    /// being torn down.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.upgrade()
    }

    /// Snapshot of the child list in discovery order.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<Self>> {
        self.children.lock().clone()
    }

    /// Published byte total. For directories this is guaranteed final only
    /// after the scan that produced the tree has returned.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Whether this directory's total has been fixed.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    pub(crate) fn reserve_children(&self, additional: usize) {
        self.children.lock().reserve(additional);
    }

    pub(crate) fn add_child(&self, child: Arc<Self>) {
        self.children.lock().push(child);
    }

    /// Publish a leaf size directly (file nodes).
    pub(crate) fn store_immediate_size(&self, bytes: u64) {
        self.size.store(bytes, Ordering::Release);
    }

    /// Publish a fixed total and close the node to the protocol (opaque
    /// bundle nodes, which are never task-queued).
    pub(crate) fn seal_with_total(&self, bytes: u64) {
        self.aggregate.store(bytes, Ordering::Relaxed);
        self.size.store(bytes, Ordering::Release);
        self.finalized.store(true, Ordering::Release);
    }

    /// Add bytes into the running total. Safe under concurrent callers;
    /// readers only consume the value after the pending counter reaches
    /// zero and the finalize swap has been won.
    pub(crate) fn add_to_aggregate(&self, bytes: u64) {
        self.aggregate.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record the number of subdirectories discovered. Called exactly once
    /// per directory, after enumeration, before any child task is visible
    /// to other workers.
    pub(crate) fn set_pending_dirs(&self, count: usize) {
        self.pending_dirs.store(count, Ordering::Release);
    }

    pub(crate) fn pending_dirs(&self) -> usize {
        self.pending_dirs.load(Ordering::Acquire)
    }

    /// Decrement the pending counter and return the new value. The
    /// acquire-release ordering makes every aggregate add performed before
    /// a sibling's decrement visible to the thread that observes zero.
    pub(crate) fn decrement_pending_and_load(&self) -> usize {
        let previous = self.pending_dirs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "pending counter underflow");
        previous - 1
    }

    /// Claim the one-shot finalize: the winner fixes and publishes the
    /// total, losers get `None`. Callers must have observed a zero pending
    /// counter.
    pub(crate) fn finalize_if_needed(&self) -> Option<u64> {
        debug_assert_eq!(self.pending_dirs.load(Ordering::Relaxed), 0);
        if self.finalized.swap(true, Ordering::AcqRel) {
            return None;
        }
        let total = self.aggregate.load(Ordering::Acquire);
        self.size.store(total, Ordering::Release);
        Some(total)
    }
}

impl std::fmt::Debug for FileNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileNode")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .field("size", &self.size.load(Ordering::Relaxed))
            .field("pending_dirs", &self.pending_dirs.load(Ordering::Relaxed))
            .field("finalized", &self.finalized.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Finalize `start` and propagate its total up the ancestor chain.
///
/// Any of the worker threads racing to bring a parent's pending counter to
/// zero may end up driving that parent's finalize; exactly one wins each
/// step. The loop walks upward as long as zero crossings keep occurring.
pub(crate) fn finalize_and_bubble(start: &Arc<FileNode>) {
    let mut current = Arc::clone(start);
    loop {
        let Some(total) = current.finalize_if_needed() else {
            return;
        };
        let Some(parent) = current.parent() else {
            return;
        };
        parent.add_to_aggregate(total);
        if parent.decrement_pending_and_load() == 0 {
            current = parent;
        } else {
            return;
        }
    }
}
