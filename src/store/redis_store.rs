// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::Script;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{CoordinationStore, StoreTransaction};
use crate::errors::{CoordinationError, CoordinationResult, StoreError};

/// Lua scripts for the atomic compare-and-* transactions
mod scripts {
    use redis::Script;

    pub fn compare_and_delete() -> Script {
        Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        )
    }

    pub fn compare_and_expire() -> Script {
        Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('PEXPIRE', KEYS[1], ARGV[2])
            else
                return 0
            end
            "#,
        )
    }
}

fn compare_and_delete_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(scripts::compare_and_delete)
}

fn compare_and_expire_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(scripts::compare_and_expire)
}

/// Redis-backed shared store with connection pooling
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub async fn new(redis_url: &str, pool_size: usize) -> CoordinationResult<Self> {
        let mut cfg = Config::from_url(redis_url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(pool_size));
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            CoordinationError::Configuration(format!("Failed to create Redis pool: {}", e))
        })?;

        // Test connection
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Redis coordination store connected: pool_size={}", pool_size);

        Ok(Self { pool })
    }

    /// Wrap an already configured pool
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CoordinationResult<bool> {
        let mut conn = self.pool.get().await?;

        // SET key value NX PX ttl -> "OK" or nil
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> CoordinationResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn execute(&self, transaction: &StoreTransaction) -> CoordinationResult<bool> {
        let mut conn = self.pool.get().await?;

        let result: i64 = match transaction {
            StoreTransaction::CompareAndDelete { key, expected } => {
                compare_and_delete_script()
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn)
                    .await?
            }
            StoreTransaction::CompareAndExpire { key, expected, ttl } => {
                compare_and_expire_script()
                    .key(key)
                    .arg(expected)
                    .arg(ttl_millis(*ttl))
                    .invoke_async(&mut conn)
                    .await?
            }
        };

        debug!(key = transaction.key(), result, "Executed store transaction");

        match result {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StoreError::UnexpectedReply {
                command: "EVALSHA",
                reply: other.to_string(),
            }
            .into()),
        }
    }
}
