//! Sharded visited-identity set keyed by (device, inode).
//!
//! Every filesystem object discovered during a scan is recorded here once.
//! Objects reachable through multiple hardlinks are counted exactly once
//! (first writer wins), and directory hardlink cycles cannot recurse
//! because the second encounter of the same identity is skipped outright.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Identity of a unique filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    /// Device id of the containing filesystem.
    pub dev: u64,
    /// Inode number on that device.
    pub ino: u64,
}

impl FileId {
    #[must_use]
    pub const fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }
}

/// Lock-striped set of already-seen filesystem identities.
///
/// Contention is bounded by the shard count rather than a single global
/// lock; shard selection mixes device and inode bits so inodes allocated
/// sequentially spread across shards.
pub struct VisitedSet {
    shards: Vec<Mutex<HashSet<FileId>>>,
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(SHARD_COUNT)
    }

    /// `shard_count` is rounded up to the next power of two so shard
    /// selection stays a mask.
    #[must_use]
    pub fn with_shards(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        Self {
            shards: (0..count).map(|_| Mutex::new(HashSet::new())).collect(),
        }
    }

    /// Record `id`, returning true iff it was not previously present.
    ///
    /// Which of several racing callers wins is scheduling-dependent and
    /// may differ between runs; totals are unaffected because exactly one
    /// caller sees true.
    pub fn insert_if_absent(&self, id: FileId) -> bool {
        self.shards[self.shard_for(id)].lock().insert(id)
    }

    /// Whether `id` has been recorded.
    #[must_use]
    pub fn contains(&self, id: FileId) -> bool {
        self.shards[self.shard_for(id)].lock().contains(&id)
    }

    /// Total identities recorded across all shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    fn shard_for(&self, id: FileId) -> usize {
        let mixed = (id.dev ^ id.ino).wrapping_mul(FIBONACCI_MULTIPLIER);
        // High bits carry the most mixing; fold them down to the mask.
        ((mixed >> 48) as usize) & (self.shards.len() - 1)
    }
}

/// Default shard count; contention beyond 64 concurrent enumerators is not
/// a workload this engine targets.
const SHARD_COUNT: usize = 64;

/// 2^64 / phi, the Fibonacci hashing constant.
const FIBONACCI_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn first_insert_wins() {
        let set = VisitedSet::new();
        let id = FileId::new(1, 42);
        assert!(set.insert_if_absent(id));
        assert!(!set.insert_if_absent(id));
        assert!(set.contains(id));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn distinct_devices_are_distinct_objects() {
        let set = VisitedSet::new();
        assert!(set.insert_if_absent(FileId::new(1, 42)));
        assert!(set.insert_if_absent(FileId::new(2, 42)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn exactly_one_concurrent_winner_per_identity() {
        let set = Arc::new(VisitedSet::new());
        let id = FileId::new(7, 123_456);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let set = Arc::clone(&set);
                thread::spawn(move || set.insert_if_absent(id))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn shard_count_rounds_to_power_of_two() {
        let set = VisitedSet::with_shards(5);
        assert_eq!(set.shards.len(), 8);
        // Single shard degrades to a global set but stays correct.
        let single = VisitedSet::with_shards(1);
        assert!(single.insert_if_absent(FileId::new(0, 0)));
        assert!(!single.insert_if_absent(FileId::new(0, 0)));
    }

    #[test]
    fn sequential_inodes_spread_across_shards() {
        let set = VisitedSet::new();
        let mut used = std::collections::HashSet::new();
        for ino in 0..256u64 {
            used.insert(set.shard_for(FileId::new(1, ino)));
        }
        assert!(used.len() > 8, "only {} shards used", used.len());
    }
}
