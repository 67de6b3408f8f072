//! TTL cache for purchase history lookups.
//!
//! Keyed by (item, project, company, limit). Invalidation drops every limit for a triple.

use crate::features::history::api::PurchaseHistoryEntry;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest lifetime any entry gets, whatever TTL the caller asks for
pub const MAX_TTL: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub item_code: String,
    pub project: String,
    pub company: String,
    pub limit: usize,
}

impl HistoryKey {
    pub fn new(item_code: &str, project: &str, company: &str, limit: usize) -> Self {
        HistoryKey {
            item_code: item_code.to_string(),
            project: project.to_string(),
            company: company.to_string(),
            limit,
        }
    }

    fn matches(&self, item_code: &str, project: &str, company: &str) -> bool {
        self.item_code == item_code && self.project == project && self.company == company
    }
}

struct CachedHistory {
    entries: Vec<PurchaseHistoryEntry>,
    expires_at: Instant,
}

#[derive(Clone, Default)]
pub struct HistoryCache {
    entries: Arc<DashMap<HistoryKey, CachedHistory>>,
}

impl HistoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired entry for `key`. Expired entries are evicted on access.
    pub fn get(&self, key: &HistoryKey) -> Option<Vec<PurchaseHistoryEntry>> {
        let now = Instant::now();
        if let Some(cached) = self.entries.get(key) {
            if cached.expires_at > now {
                return Some(cached.entries.clone());
            }
        }
        self.entries.remove_if(key, |_, cached| cached.expires_at <= now);
        None
    }

    /// Store `entries` for `ttl` (capped at [`MAX_TTL`]). Expired entries under
    /// other keys are swept out first so the map never outgrows its live set.
    pub fn set(&self, key: HistoryKey, entries: Vec<PurchaseHistoryEntry>, ttl: Duration) {
        let now = Instant::now();
        self.evict_expired(now);

        let expires_at = now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now);
        self.entries.insert(key, CachedHistory { entries, expires_at });
    }

    /// Drop every expired entry. Returns how many went.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Drop cached lookups for an item/project/company at every limit. Returns how many went.
    pub fn invalidate(&self, item_code: &str, project: &str, company: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| !key.matches(item_code, project, company));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Invalidated {removed} history cache entries for {item_code}/{project}/{company}");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(parent: &str) -> PurchaseHistoryEntry {
        PurchaseHistoryEntry::new(
            parent.to_string(),
            "2026-10-01 10:00:00".to_string(),
            10.0,
            2.0,
            20.0,
            "Acme Fasteners".to_string(),
            4.0,
        )
    }

    #[test]
    fn test_get_after_set() {
        let cache = HistoryCache::new();
        let key = HistoryKey::new("BOLT-M8", "PROJ-A", "Northwind", 5);
        cache.set(key.clone(), vec![entry("PO-1")], Duration::from_secs(60));

        let hit = cache.get(&key).unwrap();
        assert_eq!(hit[0].parent, "PO-1");
        assert!(cache
            .get(&HistoryKey::new("BOLT-M8", "PROJ-A", "Northwind", 3))
            .is_none());
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let cache = HistoryCache::new();
        let key = HistoryKey::new("BOLT-M8", "PROJ-A", "Northwind", 5);
        cache.set(key.clone(), vec![entry("PO-1")], Duration::ZERO);

        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_huge_ttl_is_capped() {
        let cache = HistoryCache::new();
        let key = HistoryKey::new("BOLT-M8", "PROJ-A", "Northwind", 5);
        cache.set(key.clone(), vec![entry("PO-1")], Duration::MAX);

        assert!(cache.get(&key).is_some());
        assert_eq!(cache.evict_expired(Instant::now() + MAX_TTL), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_sweeps_stale_entries_under_other_keys() {
        let cache = HistoryCache::new();
        for item in ["BOLT-M8", "BOLT-M10", "NUT-M8"] {
            let key = HistoryKey::new(item, "PROJ-A", "Northwind", 5);
            cache.set(key, vec![entry("PO-1")], Duration::ZERO);
        }

        // None of the stale keys is ever read again
        let fresh = HistoryKey::new("WASHER-M8", "PROJ-A", "Northwind", 5);
        cache.set(fresh.clone(), vec![entry("PO-2")], Duration::from_secs(60));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&fresh).is_some());
    }

    #[test]
    fn test_invalidate_drops_every_limit() {
        let cache = HistoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set(HistoryKey::new("BOLT-M8", "PROJ-A", "Northwind", 5), vec![], ttl);
        cache.set(HistoryKey::new("BOLT-M8", "PROJ-A", "Northwind", 10), vec![], ttl);
        cache.set(HistoryKey::new("BOLT-M8", "PROJ-B", "Northwind", 5), vec![], ttl);

        assert_eq!(cache.invalidate("BOLT-M8", "PROJ-A", "Northwind"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate("BOLT-M8", "PROJ-A", "Northwind"), 0);
    }
}
