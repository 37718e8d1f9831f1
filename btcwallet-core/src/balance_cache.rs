//! TTL cache of wallet balance snapshots
//!
//! Entries expire a fixed TTL after they were stored. An expired entry reads as
//! a miss and is dropped on the next lookup. The cache is shared between request
//! handlers and the background refresher, so every operation takes `&self`.

use log::trace;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::types::WalletBalance;

/// Default time-to-live of a cached balance
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    balance: WalletBalance,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// Concurrent map of wallet id to balance with per-entry timestamps
#[derive(Debug)]
pub struct BalanceCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached balance, or `None` if absent or older than the TTL
    pub fn get(&self, wallet_id: &str) -> Option<WalletBalance> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(wallet_id) {
                Some(entry) if entry.is_fresh(self.ttl) => return Some(entry.balance.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        trace!("Balance cache entry for {} expired", wallet_id);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have refreshed it in between
        if entries.get(wallet_id).is_some_and(|e| !e.is_fresh(self.ttl)) {
            entries.remove(wallet_id);
        }
        entries
            .get(wallet_id)
            .filter(|e| e.is_fresh(self.ttl))
            .map(|e| e.balance.clone())
    }

    /// Store a balance; the TTL starts now
    pub fn put(&self, wallet_id: &str, balance: WalletBalance) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            wallet_id.to_string(),
            CacheEntry {
                balance,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, wallet_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(wallet_id);
    }

    pub fn clear_all(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// True when there is no entry or the entry has expired
    pub fn is_stale(&self, wallet_id: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        !entries.get(wallet_id).is_some_and(|e| e.is_fresh(self.ttl))
    }

    /// Every fresh entry, keyed by wallet id
    pub fn all_cached(&self) -> HashMap<String, WalletBalance> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|(_, e)| e.is_fresh(self.ttl))
            .map(|(id, e)| (id.clone(), e.balance.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_put_then_get() {
        let cache = BalanceCache::new();
        let balance = WalletBalance::new("W1", 1_000, 0, 10, vec![]).unwrap();
        cache.put("W1", balance.clone());
        assert_eq!(cache.get("W1"), Some(balance));
        assert!(!cache.is_stale("W1"));
        assert!(cache.get("W2").is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = BalanceCache::with_ttl(Duration::from_millis(20));
        cache.put("W1", WalletBalance::empty("W1", 0));
        thread::sleep(Duration::from_millis(40));
        assert!(cache.is_stale("W1"));
        assert!(cache.get("W1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = BalanceCache::new();
        cache.put("W1", WalletBalance::empty("W1", 0));
        cache.put("W2", WalletBalance::empty("W2", 0));
        cache.invalidate("W1");
        assert!(cache.get("W1").is_none());
        assert_eq!(cache.all_cached().len(), 1);
        cache.clear_all();
        assert!(cache.is_empty());
    }
}
