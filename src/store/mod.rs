// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Shared Store Module
 * Key-value substrate used for cross-process coordination
 *
 * © 2026 Bountyy Oy
 */

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::CoordinationResult;

/// Atomic multi-step operation executed server-side as one unit.
///
/// Backends must run each variant atomically (a Lua script for Redis, a single
/// critical section for the in-memory store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTransaction {
    /// Delete `key` only if its current value equals `expected`
    CompareAndDelete { key: String, expected: String },

    /// Reset the expiry of `key` to `ttl` only if its current value equals `expected`
    CompareAndExpire {
        key: String,
        expected: String,
        ttl: Duration,
    },
}

impl StoreTransaction {
    pub fn key(&self) -> &str {
        match self {
            StoreTransaction::CompareAndDelete { key, .. } => key,
            StoreTransaction::CompareAndExpire { key, .. } => key,
        }
    }
}

/// Minimal shared store contract required by the lock manager
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// `SET key value NX` with expiry; true if the key was set
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CoordinationResult<bool>;

    async fn get(&self, key: &str) -> CoordinationResult<Option<String>>;

    /// Unconditional delete; true if a key was removed
    async fn delete(&self, key: &str) -> CoordinationResult<bool>;

    /// Run a transaction atomically; true if its condition held and the write happened
    async fn execute(&self, transaction: &StoreTransaction) -> CoordinationResult<bool>;
}
