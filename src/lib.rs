#![forbid(unsafe_code)]

//! disk_charter — concurrent disk-usage aggregation engine.
//!
//! Walks an arbitrary filesystem subtree with a pool of worker threads,
//! builds an in-memory tree mirroring the directory structure, and computes
//! the recursive byte total rooted at every node — correctly, once, and
//! without redundant work.
//!
//! # Architecture
//!
//! ```text
//!  scan(root, options)
//!        │ seed root task, outstanding-task count = 1
//!        ▼
//!  ┌──────────────────────────────────────────────┐
//!  │  TaskQueue (growable, closeable, blocking)   │
//!  └──────┬──────────┬──────────┬────────────┬────┘
//!         ▼          ▼          ▼            ▼
//!     Worker 1   Worker 2   Worker 3  ...  Worker N
//!         │ enumerate children, dedup (dev,ino),   │
//!         │ add immediate file bytes, enqueue      │
//!         │ subdirectory tasks, finalize & bubble  │
//!         └──────────────── last task closes queue ┘
//! ```
//!
//! Every node's total is fixed by a lock-free fan-in: a child that
//! finalizes adds its total into the parent's running aggregate and
//! decrements the parent's pending-subdirectory counter; whichever worker
//! observes the zero crossing finalizes the parent in turn, recursively up
//! to the root.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use disk_charter::prelude::*;
//!
//! let options = ScanOptions::default();
//! let report = ParallelScanner::new(options)?.scan("/var/tmp")?;
//! println!("{} bytes", report.root.size());
//! # Ok::<(), CharterError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod scanner;
