// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Distributed Resource Locks
 * Lease-based mutual exclusion over the shared store with heartbeat refresh
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LockingConfig;
use crate::errors::{CoordinationError, CoordinationResult};
use crate::store::{CoordinationStore, StoreTransaction};

/// Proof of ownership of a lock key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    resource_name: String,
    holder_id: String,
    lease: Duration,
    sustained: bool,
}

impl LockHandle {
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Whether the heartbeat keeps this lock alive past its lease
    pub fn is_sustained(&self) -> bool {
        self.sustained
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SustainedLock {
    holder_id: String,
    lease: Duration,
}

/// Locks this process believes it holds, keyed by resource name.
///
/// Shared between acquire/release and the heartbeat task; every access goes
/// through the mutex and the guard is never held across an `.await`.
#[derive(Debug, Default)]
pub struct SustainedLockSet {
    locks: Mutex<HashMap<String, SustainedLock>>,
}

impl SustainedLockSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, handle: &LockHandle) {
        self.locks.lock().insert(
            handle.resource_name.clone(),
            SustainedLock {
                holder_id: handle.holder_id.clone(),
                lease: handle.lease,
            },
        );
    }

    /// Remove an entry only if it still belongs to `holder_id`
    fn remove_if_held_by(&self, resource_name: &str, holder_id: &str) -> bool {
        let mut locks = self.locks.lock();
        match locks.get(resource_name) {
            Some(lock) if lock.holder_id == holder_id => {
                locks.remove(resource_name);
                true
            }
            _ => false,
        }
    }

    fn snapshot(&self) -> Vec<(String, SustainedLock)> {
        self.locks
            .lock()
            .iter()
            .map(|(name, lock)| (name.clone(), lock.clone()))
            .collect()
    }

    fn drain(&self) -> Vec<(String, SustainedLock)> {
        self.locks.lock().drain().collect()
    }

    pub fn holder_of(&self, resource_name: &str) -> Option<String> {
        self.locks
            .lock()
            .get(resource_name)
            .map(|lock| lock.holder_id.clone())
    }

    pub fn contains(&self, resource_name: &str) -> bool {
        self.locks.lock().contains_key(resource_name)
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Timing knobs of the lock manager
#[derive(Debug, Clone)]
pub struct LockSettings {
    pub default_lease: Duration,
    pub heartbeat_interval: Duration,
    pub sleep_min: Duration,
    pub sleep_max: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings::from(&LockingConfig::default())
    }
}

impl From<&LockingConfig> for LockSettings {
    fn from(config: &LockingConfig) -> Self {
        let (sleep_min, sleep_max) = config.sleep_window();
        Self {
            default_lease: config.default_lease(),
            heartbeat_interval: config.heartbeat_interval(),
            sleep_min,
            sleep_max: sleep_max.max(sleep_min),
        }
    }
}

impl LockSettings {
    fn retry_sleep(&self) -> Duration {
        let min = self.sleep_min.as_millis() as u64;
        let max = self.sleep_max.as_millis() as u64;
        if max <= min {
            return self.sleep_min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Lease-based lock coordinator for one process.
///
/// Cloning is cheap and clones share the same held-lock bookkeeping.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CoordinationStore>,
    sustained: Arc<SustainedLockSet>,
    settings: LockSettings,
}

impl LockManager {
    pub fn new(store: Arc<dyn CoordinationStore>, settings: LockSettings) -> Self {
        Self {
            store,
            sustained: Arc::new(SustainedLockSet::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    pub fn sustained_locks(&self) -> &SustainedLockSet {
        &self.sustained
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Acquire a lock kept alive by the heartbeat until released.
    ///
    /// Fails with `LockUnavailable` after `max_tries` unsuccessful attempts.
    pub async fn acquire(
        &self,
        resource_name: &str,
        lease: Duration,
        max_tries: u32,
    ) -> CoordinationResult<LockHandle> {
        if lease <= self.settings.heartbeat_interval {
            warn!(
                resource = resource_name,
                lease_secs = lease.as_secs_f64(),
                heartbeat_secs = self.settings.heartbeat_interval.as_secs_f64(),
                "Lease is not longer than the heartbeat interval, lock may lapse between refreshes"
            );
        }

        let handle = self
            .acquire_with_tries(resource_name, lease, Some(max_tries), true)
            .await?;
        self.sustained.insert(&handle);
        Ok(handle)
    }

    /// Acquire a lock that simply lapses after `lease`.
    ///
    /// `max_tries = None` keeps retrying until the key becomes free.
    pub async fn acquire_expiring(
        &self,
        resource_name: &str,
        lease: Duration,
        max_tries: Option<u32>,
    ) -> CoordinationResult<LockHandle> {
        self.acquire_with_tries(resource_name, lease, max_tries, false)
            .await
    }

    async fn acquire_with_tries(
        &self,
        resource_name: &str,
        lease: Duration,
        max_tries: Option<u32>,
        sustained: bool,
    ) -> CoordinationResult<LockHandle> {
        let holder_id = Uuid::new_v4().to_string();
        let max_tries = max_tries.map(|tries| tries.max(1));
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            if self
                .store
                .set_if_absent(resource_name, &holder_id, lease)
                .await?
            {
                debug!(
                    resource = resource_name,
                    holder = %holder_id,
                    attempt = attempt,
                    sustained = sustained,
                    "Acquired lock"
                );
                return Ok(LockHandle {
                    resource_name: resource_name.to_string(),
                    holder_id,
                    lease,
                    sustained,
                });
            }

            if let Some(max_tries) = max_tries {
                if attempt >= max_tries {
                    debug!(
                        resource = resource_name,
                        tries = attempt,
                        "Lock still held by another holder, giving up"
                    );
                    return Err(CoordinationError::LockUnavailable {
                        resource: resource_name.to_string(),
                        tries: attempt,
                    });
                }
            }

            tokio::time::sleep(self.settings.retry_sleep()).await;
        }
    }

    /// Release a lock if (and only if) it is still held by `handle`.
    ///
    /// Returns whether the key was deleted; a lock that already lapsed and was
    /// taken by someone else is left untouched.
    pub async fn release(&self, handle: &LockHandle) -> CoordinationResult<bool> {
        self.sustained
            .remove_if_held_by(&handle.resource_name, &handle.holder_id);

        let deleted = self
            .store
            .execute(&StoreTransaction::CompareAndDelete {
                key: handle.resource_name.clone(),
                expected: handle.holder_id.clone(),
            })
            .await?;

        if deleted {
            debug!(resource = %handle.resource_name, "Released lock");
        } else {
            debug!(
                resource = %handle.resource_name,
                holder = %handle.holder_id,
                "Lock was no longer ours when releasing"
            );
        }

        Ok(deleted)
    }

    /// Whether any holder currently has the lock. Not a substitute for `acquire`.
    pub async fn is_acquired(&self, resource_name: &str) -> CoordinationResult<bool> {
        Ok(self.store.get(resource_name).await?.is_some())
    }

    /// Force-release every lock this process believes it holds.
    ///
    /// Called at the start of each work iteration so locks leaked by an
    /// interrupted iteration do not wait for their lease.
    pub async fn release_all_locks(&self) -> CoordinationResult<usize> {
        let held = self.sustained.drain();
        if held.is_empty() {
            return Ok(0);
        }

        let mut released = 0;
        let mut first_error = None;

        for (resource_name, lock) in held {
            let transaction = StoreTransaction::CompareAndDelete {
                key: resource_name.clone(),
                expected: lock.holder_id,
            };
            match self.store.execute(&transaction).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(resource = %resource_name, error = %e, "Failed to release leaked lock");
                    first_error.get_or_insert(e);
                }
            }
        }

        if released > 0 {
            info!(released = released, "Released locks left over from a previous iteration");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    /// One heartbeat pass: extend the lease of every sustained lock.
    ///
    /// Locks found taken over by another holder are dropped from the set.
    /// Returns the number of refreshed locks.
    pub async fn refresh_sustained_locks(&self) -> usize {
        let mut refreshed = 0;

        for (resource_name, lock) in self.sustained.snapshot() {
            let transaction = StoreTransaction::CompareAndExpire {
                key: resource_name.clone(),
                expected: lock.holder_id.clone(),
                ttl: lock.lease,
            };

            match self.store.execute(&transaction).await {
                Ok(true) => refreshed += 1,
                Ok(false) => {
                    warn!(resource = %resource_name, "Sustained lock was lost before refresh");
                    self.sustained
                        .remove_if_held_by(&resource_name, &lock.holder_id);
                }
                Err(e) => {
                    warn!(resource = %resource_name, error = %e, "Failed to refresh lock");
                }
            }
        }

        refreshed
    }

    /// Start the background task refreshing sustained locks
    pub fn spawn_heartbeat(&self) -> HeartbeatHandle {
        let manager = self.clone();
        let period = self.settings.heartbeat_interval.max(Duration::from_millis(10));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let refreshed = manager.refresh_sustained_locks().await;
                if refreshed > 0 {
                    debug!(refreshed = refreshed, "Heartbeat refreshed locks");
                }
            }
        });

        info!(interval_secs = period.as_secs_f64(), "Lock heartbeat started");

        HeartbeatHandle { task: Some(task) }
    }

    /// Run `operation` while holding a sustained lock, releasing it afterwards
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource_name: &str,
        lease: Duration,
        max_tries: u32,
        operation: F,
    ) -> CoordinationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoordinationResult<T>>,
    {
        let handle = self.acquire(resource_name, lease, max_tries).await?;
        let result = operation().await;
        let released = self.release(&handle).await;

        match (result, released) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

/// Stops the heartbeat task when dropped
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
