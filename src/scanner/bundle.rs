//! Recursive totals for opaque bundle directories.
//!
//! Bundles (`Foo.app` and friends) are structured-but-atomic: their full
//! recursive byte total is charged to the parent as a single unit and none
//! of their internals appear in the tree. The walk runs inline on the
//! discovering worker, off the shared queue — bundle contents are usually
//! small, so a very large bundle is a possible latency outlier rather than
//! a correctness problem.

use std::path::Path;

use tracing::debug;

use crate::scanner::enumerate::{self, ScanPolicy};
use crate::scanner::progress::ScanStats;
use crate::scanner::visited::VisitedSet;

/// Compute the full recursive byte total of a bundle directory.
///
/// Honors the same rules as the main walk: symlinks are never followed,
/// the visited set deduplicates hardlinked objects (including against
/// files already counted outside the bundle), pruned prefixes and
/// cross-device children are excluded, and unreadable subdirectories
/// contribute zero.
pub fn bundle_total(root: &Path, policy: &ScanPolicy, visited: &VisitedSet, stats: &ScanStats) -> u64 {
    let mut total: u64 = 0;
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match enumerate::open_dir_with_retry(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "bundle subdirectory not enumerable");
                stats.record_unreadable_dir();
                continue;
            }
        };

        for entry in entries.flatten() {
            let child_path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                stats.record_skip();
                continue;
            };
            if file_type.is_symlink() {
                stats.record_skip();
                continue;
            }
            if policy.is_pruned(&child_path) {
                stats.record_skip();
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                stats.record_skip();
                continue;
            };
            let id = enumerate::identity_of(&child_path, &meta);
            if policy.crosses_device(id.dev) {
                stats.record_skip();
                continue;
            }
            if !visited.insert_if_absent(id) {
                stats.record_hardlink_skip();
                continue;
            }

            if file_type.is_dir() {
                stack.push(child_path);
            } else if file_type.is_file() {
                total = total.saturating_add(enumerate::file_size(&meta, policy.accounting));
            } else {
                stats.record_skip();
            }
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ScanOptions, SizeAccounting};
    use std::fs;
    use tempfile::TempDir;

    fn logical_policy(root: &Path) -> ScanPolicy {
        let options = ScanOptions {
            size_accounting: SizeAccounting::Logical,
            ..ScanOptions::default()
        };
        let root_dev = enumerate::identity_of(root, &fs::metadata(root).unwrap()).dev;
        ScanPolicy::from_options(&options, root_dev)
    }

    #[test]
    fn sums_nested_files() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("Demo.app");
        fs::create_dir_all(bundle.join("Contents").join("MacOS")).unwrap();
        fs::write(bundle.join("Contents").join("Info.plist"), vec![0u8; 100]).unwrap();
        fs::write(
            bundle.join("Contents").join("MacOS").join("Demo"),
            vec![0u8; 400],
        )
        .unwrap();

        let visited = VisitedSet::new();
        let stats = ScanStats::default();
        let total = bundle_total(&bundle, &logical_policy(tmp.path()), &visited, &stats);
        assert_eq!(total, 500);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_contents_are_not_followed() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("Demo.app");
        fs::create_dir(&bundle).unwrap();
        let outside = tmp.path().join("outside");
        fs::write(&outside, vec![0u8; 999]).unwrap();
        std::os::unix::fs::symlink(&outside, bundle.join("alias")).unwrap();

        let visited = VisitedSet::new();
        let stats = ScanStats::default();
        let total = bundle_total(&bundle, &logical_policy(tmp.path()), &visited, &stats);
        assert_eq!(total, 0);
    }

    #[cfg(unix)]
    #[test]
    fn hardlinked_pair_inside_bundle_counts_once() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("Demo.app");
        fs::create_dir(&bundle).unwrap();
        fs::write(bundle.join("a"), vec![0u8; 250]).unwrap();
        fs::hard_link(bundle.join("a"), bundle.join("b")).unwrap();

        let visited = VisitedSet::new();
        let stats = ScanStats::default();
        let total = bundle_total(&bundle, &logical_policy(tmp.path()), &visited, &stats);
        assert_eq!(total, 250);
        assert_eq!(stats.hardlinks_skipped(), 1);
    }

    #[test]
    fn already_visited_file_contributes_nothing() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("Demo.app");
        fs::create_dir(&bundle).unwrap();
        let inner = bundle.join("payload");
        fs::write(&inner, vec![0u8; 64]).unwrap();

        let visited = VisitedSet::new();
        let meta = fs::metadata(&inner).unwrap();
        assert!(visited.insert_if_absent(enumerate::identity_of(&inner, &meta)));

        let stats = ScanStats::default();
        let total = bundle_total(&bundle, &logical_policy(tmp.path()), &visited, &stats);
        assert_eq!(total, 0);
    }
}
