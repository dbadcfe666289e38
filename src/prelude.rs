//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use disk_charter::prelude::*;
//! ```

// Core
pub use crate::core::config::{BundlePolicy, Config, ScanOptions, SizeAccounting};
pub use crate::core::errors::{CharterError, Result};

// Scanner
pub use crate::scanner::node::{FileNode, NodeKind};
pub use crate::scanner::parallel::{ParallelScanner, ScanReport};
pub use crate::scanner::progress::{CancelToken, ScanEvent, ScanStats, ScanSummary};
pub use crate::scanner::snapshot::NodeSnapshot;
