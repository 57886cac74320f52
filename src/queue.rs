// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::errors::{CoordinationResult, StoreError};
use crate::types::Task;

/// FIFO of tasks shared by all workers
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Take the oldest task, waiting up to `timeout`
    async fn pop(&self, timeout: Duration) -> CoordinationResult<Option<Task>>;

    /// Append a task behind everything already queued
    async fn push(&self, task: &Task) -> CoordinationResult<()>;
}

/// Redis list queue: LPUSH to enqueue, BRPOP to take
#[derive(Clone)]
pub struct RedisQueue {
    pool: Pool,
    queue_key: String,
}

impl RedisQueue {
    pub async fn new(redis_url: &str, queue_key: &str) -> CoordinationResult<Self> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::ConnectionFailed {
                backend: "redis",
                reason: e.to_string(),
            })?;

        let mut conn = pool.get().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await?;

        Ok(Self::from_pool(pool, queue_key))
    }

    pub fn from_pool(pool: Pool, queue_key: &str) -> Self {
        Self {
            pool,
            queue_key: queue_key.to_string(),
        }
    }

    pub async fn len(&self) -> CoordinationResult<usize> {
        let mut conn = self.pool.get().await?;
        let len: usize = deadpool_redis::redis::cmd("LLEN")
            .arg(&self.queue_key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn pop(&self, timeout: Duration) -> CoordinationResult<Option<Task>> {
        let mut conn = self.pool.get().await?;

        // BRPOP <queue> timeout
        let result: Option<(String, String)> = deadpool_redis::redis::cmd("BRPOP")
            .arg(&self.queue_key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        match result {
            Some((_, task_json)) => {
                let task: Task = serde_json::from_str(&task_json)?;
                debug!("Popped task: {}", task.uid);
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn push(&self, task: &Task) -> CoordinationResult<()> {
        let mut conn = self.pool.get().await?;
        let task_json = serde_json::to_string(task)?;

        deadpool_redis::redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(task_json)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Queued task: {}", task.uid);
        Ok(())
    }
}

/// In-process queue with the same ordering as `RedisQueue`
#[derive(Clone, Default)]
pub struct MemoryQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn pop(&self, _timeout: Duration) -> CoordinationResult<Option<Task>> {
        Ok(self.tasks.lock().pop_front())
    }

    async fn push(&self, task: &Task) -> CoordinationResult<()> {
        self.tasks.lock().push_back(task.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryQueue::new();
        let first = Task::new("analysis").with_payload("host", "a.example.com");
        let second = Task::new("analysis").with_payload("host", "b.example.com");

        queue.push(&first).await.unwrap();
        queue.push(&second).await.unwrap();

        assert_eq!(queue.pop(Duration::ZERO).await.unwrap(), Some(first));
        assert_eq!(queue.pop(Duration::ZERO).await.unwrap(), Some(second));
        assert_eq!(queue.pop(Duration::ZERO).await.unwrap(), None);
    }
}
