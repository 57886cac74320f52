// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{CoordinationStore, StoreTransaction};
use crate::errors::CoordinationResult;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store with key expiry.
///
/// Coordinates only the tasks sharing one instance; used by tests and
/// single-process deployments. Uses the tokio clock so paused-time tests can
/// advance past leases.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a live key
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(entries: &mut HashMap<String, Entry>, key: &str) -> Option<String> {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CoordinationResult<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&mut entries, key).is_some() {
            return Ok(false);
        }

        // Keys like ip-request-lock-{ip} are rarely touched again once lapsed
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key))
    }

    async fn delete(&self, key: &str) -> CoordinationResult<bool> {
        let mut entries = self.entries.lock();
        let was_live = Self::live_value(&mut entries, key).is_some();
        entries.remove(key);
        Ok(was_live)
    }

    async fn execute(&self, transaction: &StoreTransaction) -> CoordinationResult<bool> {
        let mut entries = self.entries.lock();
        let key = transaction.key();
        let current = Self::live_value(&mut entries, key);

        match transaction {
            StoreTransaction::CompareAndDelete { expected, .. } => {
                if current.as_deref() == Some(expected.as_str()) {
                    entries.remove(key);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            StoreTransaction::CompareAndExpire { expected, ttl, .. } => {
                if current.as_deref() == Some(expected.as_str()) {
                    if let Some(entry) = entries.get_mut(key) {
                        entry.expires_at = Instant::now() + *ttl;
                    }
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_expiry() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lapsed_keys_swept_on_insert() {
        let store = MemoryStore::new();
        for i in 0..100 {
            let key = format!("ip-request-lock-10.0.0.{}", i);
            assert!(store.set_if_absent(&key, "h", Duration::from_secs(1)).await.unwrap());
        }
        assert!(store.set_if_absent("lock-kept", "h", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.entries.lock().len(), 101);

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(store.set_if_absent("ip-request-lock-10.0.1.1", "h", Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.entries.lock().len(), 2);
        assert_eq!(store.get("lock-kept").await.unwrap().as_deref(), Some("h"));
    }

    #[tokio::test]
    async fn test_compare_and_delete_checks_value() {
        let store = MemoryStore::new();
        store.set_if_absent("k", "owner", Duration::from_secs(10)).await.unwrap();

        let foreign = StoreTransaction::CompareAndDelete {
            key: "k".to_string(),
            expected: "intruder".to_string(),
        };
        assert!(!store.execute(&foreign).await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());

        let own = StoreTransaction::CompareAndDelete {
            key: "k".to_string(),
            expected: "owner".to_string(),
        };
        assert!(store.execute(&own).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_expire_extends_lease() {
        let store = MemoryStore::new();
        store.set_if_absent("k", "owner", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        let touch = StoreTransaction::CompareAndExpire {
            key: "k".to_string(),
            expected: "owner".to_string(),
            ttl: Duration::from_secs(10),
        };
        assert!(store.execute(&touch).await.unwrap());

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("owner"));
        assert!(store.ttl("k").unwrap() <= Duration::from_secs(2));
    }
}
