//! Scan orchestrator: seeds the root task, drives the worker pool, and
//! returns the finalized tree.
//!
//! Termination is completion-counted: a scan-wide outstanding-task counter
//! starts at 1 for the root, grows by the number of subdirectory tasks a
//! worker enqueues, and shrinks as each task finishes. The worker that
//! drives it to zero closes the queue, which releases every other worker
//! from its blocking dequeue. Node finalization is independent of queue
//! closure — it happens through the pending-counter fan-in as children
//! finish, in whatever order the schedule produces.
//!
//! All per-run state (queue, counters, visited set, stats) is constructed
//! inside [`ParallelScanner::scan`], so concurrent scans of different
//! roots share nothing.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::core::config::{BundlePolicy, ScanOptions};
use crate::core::errors::{CharterError, Result};
use crate::core::paths::resolve_scan_root;
use crate::scanner::bundle;
use crate::scanner::enumerate::{self, ChildKind, ScanPolicy};
use crate::scanner::node::{FileNode, NodeKind, finalize_and_bubble};
use crate::scanner::progress::{CancelToken, ScanEvent, ScanStats, ScanSummary};
use crate::scanner::queue::TaskQueue;
use crate::scanner::snapshot::NodeSnapshot;
use crate::scanner::visited::VisitedSet;

/// A queued unit of work: one directory awaiting enumeration.
struct DirTask {
    node: Arc<FileNode>,
    depth: usize,
}

/// Result of a completed scan.
#[derive(Debug)]
pub struct ScanReport {
    /// The finalized tree root; its size is fixed by the time the scan
    /// returns.
    pub root: Arc<FileNode>,
    /// Final accounting for the run.
    pub summary: ScanSummary,
}

impl ScanReport {
    /// Serializable mirror of the tree for renderers.
    #[must_use]
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot::from_tree(&self.root)
    }
}

/// State shared by every worker of one scan invocation.
struct ScanRun {
    queue: TaskQueue<DirTask>,
    /// Directory tasks enqueued but not yet completed; zero closes the
    /// queue.
    outstanding: AtomicUsize,
    visited: VisitedSet,
    stats: ScanStats,
    policy: ScanPolicy,
    include_file_nodes: bool,
    max_depth: usize,
    cancel: CancelToken,
    heartbeat: Option<Arc<dyn Fn() + Send + Sync>>,
    progress: Option<Sender<ScanEvent>>,
}

/// Concurrent filesystem walker computing per-directory recursive disk
/// usage.
///
/// The scanner itself holds only configuration; it can run any number of
/// scans, sequentially or concurrently.
pub struct ParallelScanner {
    options: ScanOptions,
    cancel: CancelToken,
    heartbeat: Option<Arc<dyn Fn() + Send + Sync>>,
    progress: Option<Sender<ScanEvent>>,
}

impl ParallelScanner {
    /// Validate options and build a scanner.
    pub fn new(mut options: ScanOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            cancel: CancelToken::new(),
            heartbeat: None,
            progress: None,
        })
    }

    /// Set a callback invoked by each worker once per dequeued task.
    #[must_use]
    pub fn with_heartbeat<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.heartbeat = Some(Arc::new(callback));
        self
    }

    /// Stream progress events to `sender` as directories finish.
    #[must_use]
    pub fn with_progress(mut self, sender: Sender<ScanEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Token for cooperative cancellation of in-flight scans.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Walk the subtree rooted at `root` and return the finalized tree.
    ///
    /// The only hard failure is a root that cannot be stat'd or is not a
    /// directory; unreadable subtrees inside the walk degrade to zero
    /// contribution. Blocks the calling thread, which participates in the
    /// pool as one of the workers, until all work has drained.
    pub fn scan(&self, root: impl AsRef<Path>) -> Result<ScanReport> {
        let started_at = Utc::now();
        let started = Instant::now();

        let root_path = resolve_scan_root(root.as_ref());
        let root_meta =
            fs::symlink_metadata(&root_path).map_err(|source| CharterError::ScanRoot {
                path: root_path.clone(),
                source,
            })?;
        if !root_meta.is_dir() {
            return Err(CharterError::NotADirectory { path: root_path });
        }
        let root_id = enumerate::identity_of(&root_path, &root_meta);

        let run = Arc::new(ScanRun {
            queue: TaskQueue::new(),
            outstanding: AtomicUsize::new(1),
            visited: VisitedSet::new(),
            stats: ScanStats::default(),
            policy: ScanPolicy::from_options(&self.options, root_id.dev),
            include_file_nodes: self.options.include_file_nodes,
            max_depth: self.options.max_depth.unwrap_or(usize::MAX),
            cancel: self.cancel.clone(),
            heartbeat: self.heartbeat.clone(),
            progress: self.progress.clone(),
        });

        // Seeding the root identity up front means a directory hardlink
        // back to the root is skipped like any other re-encounter.
        run.visited.insert_if_absent(root_id);

        let root_node = FileNode::new_root(root_path.clone(), NodeKind::Directory);
        run.queue.push(DirTask {
            node: Arc::clone(&root_node),
            depth: 0,
        });

        // The calling thread participates as one worker, so a pool of N
        // spawns N-1 threads and a failed spawn degrades throughput, not
        // correctness.
        let workers = self.options.effective_worker_count().max(1);
        let mut handles = Vec::with_capacity(workers - 1);
        for i in 1..workers {
            let run = Arc::clone(&run);
            let builder = thread::Builder::new().name(format!("dch-worker-{i}"));
            match builder.spawn(move || worker_loop(&run)) {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(worker = i, error = %err, "worker spawn failed"),
            }
        }
        worker_loop(&run);
        for handle in handles {
            let _ = handle.join();
        }

        let completed = !run.cancel.is_cancelled();
        if let Some(tx) = &run.progress {
            let _ = tx.send(ScanEvent::Finished { completed });
        }

        let summary = ScanSummary {
            started_at,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            dirs_scanned: run.stats.dirs_scanned(),
            files_seen: run.stats.files_seen(),
            total_bytes: root_node.size(),
            entries_skipped: run.stats.entries_skipped(),
            hardlinks_skipped: run.stats.hardlinks_skipped(),
            unreadable_dirs: run.stats.unreadable_dirs(),
            completed,
        };
        info!(
            path = %root_path.display(),
            total_bytes = summary.total_bytes,
            dirs = summary.dirs_scanned,
            files = summary.files_seen,
            duration_ms = summary.duration_ms,
            completed,
            "scan finished"
        );

        Ok(ScanReport {
            root: root_node,
            summary,
        })
    }
}

/// One-shot convenience: build a scanner and run a single scan.
pub fn scan(root: impl AsRef<Path>, options: ScanOptions) -> Result<ScanReport> {
    ParallelScanner::new(options)?.scan(root)
}

fn worker_loop(run: &ScanRun) {
    while let Some(task) = run.queue.pop() {
        if let Some(heartbeat) = &run.heartbeat {
            heartbeat();
        }
        scan_directory(run, &task);
    }
}

/// Process one directory task: enumerate, classify, account, enqueue.
fn scan_directory(run: &ScanRun, task: &DirTask) {
    let dir = &task.node;
    debug_assert_eq!(dir.kind(), NodeKind::Directory);

    // At the depth bound (or after cancellation) the node finalizes with
    // whatever bytes have already been recorded; nothing deeper is read.
    if task.depth >= run.max_depth || run.cancel.is_cancelled() {
        complete_directory_task(run, dir);
        return;
    }

    let entries = enumerate::read_children(dir.path(), &run.policy, &run.stats);
    let entry_count = entries.len();
    let child_depth = task.depth + 1;
    let mut immediate_bytes: u64 = 0;
    dir.reserve_children(entry_count);

    let mut subdirs: Vec<Arc<FileNode>> = Vec::with_capacity(entry_count / 2);
    for child in entries {
        match child.kind {
            ChildKind::File => {
                // First path to this identity claims the bytes; hardlink
                // re-encounters still materialize a node but count nothing.
                if run.visited.insert_if_absent(child.id) {
                    immediate_bytes += child.size;
                    run.stats.record_file(child.size);
                } else {
                    run.stats.record_hardlink_skip();
                }
                if run.include_file_nodes {
                    let node = FileNode::new_child(child.path, NodeKind::File, dir, child_depth);
                    node.store_immediate_size(child.size);
                    dir.add_child(node);
                }
            }
            ChildKind::Directory => {
                if !run.visited.insert_if_absent(child.id) {
                    run.stats.record_hardlink_skip();
                    continue;
                }
                let node =
                    FileNode::new_child(child.path, NodeKind::Directory, dir, child_depth);
                dir.add_child(Arc::clone(&node));
                subdirs.push(node);
            }
            ChildKind::Bundle => {
                if !run.visited.insert_if_absent(child.id) {
                    run.stats.record_hardlink_skip();
                    continue;
                }
                let node = FileNode::new_child(
                    child.path.clone(),
                    NodeKind::Directory,
                    dir,
                    child_depth,
                );
                match run.policy.bundle_policy {
                    BundlePolicy::Aggregate => {
                        // Opaque unit: its whole recursive total lands in
                        // the parent's immediate bytes, no internal nodes,
                        // no queue tasks.
                        let total =
                            bundle::bundle_total(&child.path, &run.policy, &run.visited, &run.stats);
                        node.seal_with_total(total);
                        run.stats.record_bundle_bytes(total);
                        immediate_bytes += total;
                    }
                    BundlePolicy::Skip => node.seal_with_total(0),
                }
                dir.add_child(node);
            }
        }
    }

    if immediate_bytes > 0 {
        dir.add_to_aggregate(immediate_bytes);
    }

    // Pending count is set exactly once, before any child task becomes
    // visible to other workers, so no child can decrement an unset counter.
    if subdirs.is_empty() {
        dir.set_pending_dirs(0);
    } else {
        dir.set_pending_dirs(subdirs.len());
        run.outstanding.fetch_add(subdirs.len(), Ordering::AcqRel);
        run.queue.push_many(subdirs.into_iter().map(|node| DirTask {
            node,
            depth: child_depth,
        }));
    }

    run.stats.record_dir_scanned();
    if let Some(tx) = &run.progress {
        let _ = tx.send(ScanEvent::DirectoryScanned {
            path: dir.path().to_path_buf(),
            immediate_bytes,
            entries: entry_count,
        });
    }

    complete_directory_task(run, dir);
}

/// Finish one task: finalize the node if it has nothing left to wait for,
/// then retire the task from the scan-wide outstanding count, closing the
/// queue on the zero crossing.
fn complete_directory_task(run: &ScanRun, dir: &Arc<FileNode>) {
    if dir.pending_dirs() == 0 {
        finalize_and_bubble(dir);
    }
    if run.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
        run.queue.close();
    }
}
