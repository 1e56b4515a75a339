//! Session-scoped visit set
//!
//! Tracks canonical URLs already claimed for crawling. Stores xxh3 hashes
//! rather than the strings themselves to keep memory flat on wide crawls.

use std::collections::HashSet;
use std::sync::Mutex;

/// Set of canonical URLs enqueued or completed in the current session.
#[derive(Debug, Default)]
pub struct VisitSet {
    seen: Mutex<HashSet<u64>>,
}

impl VisitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a canonical URL for crawling. Returns true iff the
    /// URL was newly inserted; the caller then owns crawling it.
    pub fn claim(&self, canonical: &str) -> bool {
        let hash = xxhash_rust::xxh3::xxh3_64(canonical.as_bytes());
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(hash)
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn claim_returns_true_exactly_once() {
        let set = VisitSet::new();
        assert!(set.claim("http://h.test/a"));
        assert!(!set.claim("http://h.test/a"));
        assert!(set.claim("http://h.test/b"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn claim_is_atomic_across_threads() {
        let set = Arc::new(VisitSet::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let set = Arc::clone(&set);
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .filter(|i| set.claim(&format!("http://h.test/{i}")))
                    .count()
            }));
        }
        let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // Each of the 100 URLs is claimed by exactly one thread.
        assert_eq!(wins, 100);
    }
}
