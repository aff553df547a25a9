//! Short-lived per-account scratch data for the presentation layer.
//!
//! Chat front-ends remember things like "the odds and amount this user typed
//! last time" between an interaction and its follow-up. That state is not
//! ledger state: it expires on its own and losing it is harmless.

use std::collections::HashMap;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

/// Scratch values remembered between two interactions of the same user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetDraft {
    /// Last win probability the user entered, in percent.
    pub odds_percent: u8,
    pub amount: i64,
}

struct Slot<V> {
    value: V,
    expires_at: OffsetDateTime,
}

/// A cache keyed by account id whose entries expire after a fixed TTL.
///
/// Expired entries are never returned and are dropped lazily on access or
/// eagerly with [`SessionCache::evict_expired`].
pub struct SessionCache<V> {
    ttl: Duration,
    slots: Mutex<HashMap<i64, Slot<V>>>,
}

impl<V: Clone> SessionCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, account: i64, value: V, now: OffsetDateTime) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(
            account,
            Slot {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn get(&self, account: i64, now: OffsetDateTime) -> Option<V> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get(&account) {
            Some(slot) if slot.expires_at > now => Some(slot.value.clone()),
            Some(_) => {
                slots.remove(&account);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, account: i64) -> Option<V> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(&account).map(|slot| slot.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn evict_expired(&self, now: OffsetDateTime) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|_, slot| slot.expires_at > now);
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let cache = SessionCache::new(Duration::minutes(5));
        let draft = BetDraft {
            odds_percent: 25,
            amount: 100,
        };
        cache.put(42, draft.clone(), at(0));

        assert_eq!(cache.get(42, at(60)), Some(draft));
        assert_eq!(cache.get(42, at(300)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_refreshes_expiry() {
        let cache = SessionCache::new(Duration::seconds(10));
        cache.put(1, 10i64, at(0));
        cache.put(1, 20i64, at(8));
        assert_eq!(cache.get(1, at(15)), Some(20));
    }

    #[test]
    fn test_evict_expired() {
        let cache = SessionCache::new(Duration::seconds(10));
        cache.put(1, "a", at(0));
        cache.put(2, "b", at(5));
        assert_eq!(cache.evict_expired(at(12)), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove(2), Some("b"));
    }
}
