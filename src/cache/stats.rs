//! Cache Statistics Module
//!
//! Tracks hits, misses, sets and removals per key category.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Separates a key's category from the rest of the key.
pub const CATEGORY_DELIMITER: &str = "::";

// == Category Of ==
/// Category of a key: the text before the first `::`, or the whole key.
pub fn category_of(key: &str) -> &str {
    key.split_once(CATEGORY_DELIMITER)
        .map_or(key, |(category, _)| category)
}

// == Category Stats ==
/// Point-in-time view of one category's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that found nothing live
    pub misses: u64,
    /// Entries written
    pub sets: u64,
    /// Live entries removed or invalidated
    pub removals: u64,
    /// Live keys currently in this category
    pub active_keys: usize,
}

impl CategoryStats {
    // == Hit Ratio ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn with_active_keys(mut self, active_keys: usize) -> Self {
        self.active_keys = active_keys;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    removals: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CategoryStats {
        CategoryStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            active_keys: 0,
        }
    }
}

// == Statistics Collector ==
/// Lock-free per-category counters. Categories are created on first use and
/// live until `clear`.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    categories: DashMap<String, Counters>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, category: &str, pick: fn(&Counters) -> &AtomicU64) {
        if let Some(counters) = self.categories.get(category) {
            pick(&counters).fetch_add(1, Ordering::Relaxed);
            return;
        }
        let counters = self.categories.entry(category.to_string()).or_default();
        pick(&counters).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self, category: &str) {
        self.bump(category, |c| &c.hits);
    }

    pub fn record_miss(&self, category: &str) {
        self.bump(category, |c| &c.misses);
    }

    pub fn record_set(&self, category: &str) {
        self.bump(category, |c| &c.sets);
    }

    pub fn record_removal(&self, category: &str) {
        self.bump(category, |c| &c.removals);
    }

    // == Snapshot ==
    /// Counters for one category; all zero if it was never touched.
    pub fn snapshot(&self, category: &str) -> CategoryStats {
        self.categories
            .get(category)
            .map(|counters| counters.snapshot())
            .unwrap_or_default()
    }

    /// Counters for every known category.
    ///
    /// Categories are read one at a time; counters moving during the walk
    /// are reported at whatever value they had when visited.
    pub fn all_snapshots(&self) -> BTreeMap<String, CategoryStats> {
        self.categories
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    // == Clear ==
    pub fn clear(&self) {
        self.categories.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_of() {
        assert_eq!(category_of("users::42"), "users");
        assert_eq!(category_of("users::42::profile"), "users");
        assert_eq!(category_of("plain"), "plain");
        assert_eq!(category_of("::leading"), "");
        assert_eq!(category_of("a:b"), "a:b");
    }

    #[test]
    fn test_snapshot_unknown_category() {
        let stats = StatisticsCollector::new();
        assert_eq!(stats.snapshot("nothing"), CategoryStats::default());
        assert!(stats.all_snapshots().is_empty());
    }

    #[test]
    fn test_hit_ratio_no_requests() {
        assert_eq!(CategoryStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio_mixed() {
        let stats = StatisticsCollector::new();
        stats.record_hit("cat");
        stats.record_hit("cat");
        stats.record_hit("cat");
        stats.record_miss("cat");

        let snapshot = stats.snapshot("cat");
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert!((snapshot.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_categories_are_independent() {
        let stats = StatisticsCollector::new();
        stats.record_set("a");
        stats.record_set("a");
        stats.record_removal("b");

        let all = stats.all_snapshots();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"].sets, 2);
        assert_eq!(all["a"].removals, 0);
        assert_eq!(all["b"].removals, 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let stats = StatisticsCollector::new();
        stats.record_hit("a");
        stats.record_miss("b");

        stats.clear();

        assert!(stats.all_snapshots().is_empty());
        assert_eq!(stats.snapshot("a").hits, 0);
    }

    #[test]
    fn test_concurrent_counting() {
        let stats = std::sync::Arc::new(StatisticsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_hit("hot");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.snapshot("hot").hits, 8000);
    }
}
