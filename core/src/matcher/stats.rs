//! Atomic evaluation counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct MatchStats {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl MatchStats {
    #[inline]
    pub(crate) fn record_call(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_outcome(&self, matched: bool) {
        let counter = if matched { &self.success } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MatcherStats {
        MatcherStats {
            total_matches: self.total.load(Ordering::Relaxed),
            success_matches: self.success.load(Ordering::Relaxed),
            failed_matches: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.total,
            &self.success,
            &self.failed,
            &self.cache_hits,
            &self.cache_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of a matcher's counters.
///
/// Counters are read one at a time, so a snapshot taken during concurrent
/// evaluation may be off by in-flight calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct MatcherStats {
    /// Calls to `find` and `find_all`.
    pub total_matches: u64,
    /// Calls that produced at least one result.
    pub success_matches: u64,
    /// Calls that produced nothing, including expired contexts.
    pub failed_matches: u64,
    /// `find` calls answered from the cache.
    pub cache_hits: u64,
    /// `find` calls that consulted the cache and missed.
    pub cache_misses: u64,
}

impl MatcherStats {
    /// Counters keyed by name.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&'static str, u64> {
        BTreeMap::from([
            ("total_matches", self.total_matches),
            ("success_matches", self.success_matches),
            ("failed_matches", self.failed_matches),
            ("cache_hits", self.cache_hits),
            ("cache_misses", self.cache_misses),
        ])
    }

    /// Fraction of cache lookups that hit, or `0.0` before any lookup.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        // Counter precision loss above 2^53 is acceptable for a ratio.
        #[allow(clippy::cast_precision_loss)]
        let rate = self.cache_hits as f64 / lookups as f64;
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = MatchStats::default();
        stats.record_call();
        stats.record_call();
        stats.record_outcome(true);
        stats.record_outcome(false);
        stats.record_miss();
        stats.record_hit();

        let snap = stats.snapshot();
        assert_eq!(snap.total_matches, 2);
        assert_eq!(snap.success_matches, 1);
        assert_eq!(snap.failed_matches, 1);
        assert!((snap.hit_rate() - 0.5).abs() < f64::EPSILON);

        stats.reset();
        assert_eq!(stats.snapshot(), MatcherStats::default());
    }

    #[test]
    fn test_to_map_keys() {
        let map = MatcherStats {
            cache_hits: 3,
            ..MatcherStats::default()
        }
        .to_map();
        assert_eq!(
            map.keys().copied().collect::<Vec<_>>(),
            vec![
                "cache_hits",
                "cache_misses",
                "failed_matches",
                "success_matches",
                "total_matches"
            ]
        );
        assert_eq!(map["cache_hits"], 3);
    }
}
