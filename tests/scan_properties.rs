//! Property harness: randomized trees must produce totals identical to a
//! single-threaded reference sum, at every worker count.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;

use disk_charter::prelude::*;
use disk_charter::scanner::parallel;

/// Shape of one generated fixture tree.
#[derive(Debug, Clone)]
enum TreeShape {
    File(u64),
    Dir(Vec<TreeShape>),
}

fn tree_strategy() -> impl Strategy<Value = Vec<TreeShape>> {
    let leaf = (0u64..4096).prop_map(TreeShape::File);
    let node = leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(TreeShape::Dir)
    });
    prop::collection::vec(node, 0..5)
}

/// Materialize the generated shape on disk; returns the expected byte total.
fn build(dir: &Path, entries: &[TreeShape]) -> u64 {
    let mut total = 0;
    for (i, entry) in entries.iter().enumerate() {
        match entry {
            TreeShape::File(size) => {
                let bytes = vec![0u8; usize::try_from(*size).unwrap()];
                fs::write(dir.join(format!("f{i}")), bytes).unwrap();
                total += *size;
            }
            TreeShape::Dir(children) => {
                let sub = dir.join(format!("d{i}"));
                fs::create_dir(&sub).unwrap();
                total += build(&sub, children);
            }
        }
    }
    total
}

/// Independent single-threaded reference: sum every regular file strictly
/// beneath `dir` using nothing from the crate under test.
fn reference_sum(dir: &Path) -> u64 {
    let mut total = 0;
    for entry in fs::read_dir(dir).unwrap().flatten() {
        let file_type = entry.file_type().unwrap();
        if file_type.is_dir() {
            total += reference_sum(&entry.path());
        } else if file_type.is_file() {
            total += entry.metadata().unwrap().len();
        }
    }
    total
}

/// Every directory node's size must equal the sum of its children's sizes
/// (with file nodes materialized and no hardlinks in the fixture).
fn assert_sizes_are_consistent(node: &Arc<FileNode>) {
    if node.kind() != NodeKind::Directory {
        return;
    }
    let children = node.children();
    let child_sum: u64 = children.iter().map(|c| c.size()).sum();
    assert_eq!(
        node.size(),
        child_sum,
        "directory {} size disagrees with its children",
        node.path().display()
    );
    for child in &children {
        assert_sizes_are_consistent(child);
    }
}

fn options(workers: usize, include_file_nodes: bool) -> ScanOptions {
    ScanOptions {
        worker_count: workers,
        include_file_nodes,
        size_accounting: SizeAccounting::Logical,
        ..ScanOptions::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn totals_match_reference_at_every_worker_count(shape in tree_strategy()) {
        let tmp = TempDir::new().unwrap();
        let expected = build(tmp.path(), &shape);
        prop_assert_eq!(reference_sum(tmp.path()), expected);

        for workers in [1usize, 4, 16] {
            let report = parallel::scan(tmp.path(), options(workers, false)).unwrap();
            prop_assert_eq!(
                report.root.size(),
                expected,
                "workers={}", workers
            );
            prop_assert!(report.summary.completed);
        }
    }

    #[test]
    fn every_directory_total_is_the_sum_of_its_children(shape in tree_strategy()) {
        let tmp = TempDir::new().unwrap();
        build(tmp.path(), &shape);

        let report = parallel::scan(tmp.path(), options(8, true)).unwrap();
        assert_sizes_are_consistent(&report.root);
    }

    #[test]
    fn repeated_scans_agree(shape in tree_strategy()) {
        let tmp = TempDir::new().unwrap();
        build(tmp.path(), &shape);

        let first = parallel::scan(tmp.path(), options(4, false)).unwrap();
        let second = parallel::scan(tmp.path(), options(4, false)).unwrap();
        prop_assert_eq!(first.root.size(), second.root.size());
    }
}
