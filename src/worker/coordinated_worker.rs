// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Coordinated Scan Worker
 * Pulls tasks from the shared queue and runs them under target locks,
 * per-IP request limits and scheduled task deduplication
 *
 * © 2026 Bountyy Oy
 */

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::CoordinationConfig;
use crate::errors::{CoordinationError, CoordinationResult};
use crate::lock::{LockHandle, LockManager};
use crate::queue::JobQueue;
use crate::rate_limiter::TargetRateLimiter;
use crate::task_dedup::TaskDeduplicator;
use crate::types::Task;

const IDLE_BACKOFF: Duration = Duration::from_millis(500);

/// Scan logic run for each task; returns the tasks it derived
#[async_trait]
pub trait ScanHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> anyhow::Result<Vec<Task>>;
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub lock_scanned_targets: bool,
    pub scan_destination_max_tries: u32,
    pub destination_lease: Duration,
    pub pop_timeout: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &CoordinationConfig) -> Self {
        Self {
            lock_scanned_targets: config.locking.lock_scanned_targets,
            scan_destination_max_tries: config.locking.scan_destination_max_tries,
            destination_lease: config.locking.default_lease(),
            pop_timeout: Duration::from_secs(5),
        }
    }
}

/// What one iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Queue was empty
    Idle,
    Completed { scheduled: usize, duplicates: usize },
    /// Destination busy or temporarily unresolvable; task put back
    Requeued,
    /// Destination has no address; task dropped
    Skipped,
    /// Scan handler failed
    Failed,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub completed: AtomicU64,
    pub requeued: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
    pub tasks_scheduled: AtomicU64,
    pub duplicate_tasks: AtomicU64,
}

pub struct CoordinatedWorker {
    locks: LockManager,
    rate_limiter: Arc<TargetRateLimiter>,
    dedup: TaskDeduplicator,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn ScanHandler>,
    settings: WorkerSettings,
    stats: WorkerStats,
}

impl CoordinatedWorker {
    pub fn new(
        locks: LockManager,
        rate_limiter: Arc<TargetRateLimiter>,
        dedup: TaskDeduplicator,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn ScanHandler>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            locks,
            rate_limiter,
            dedup,
            queue,
            handler,
            settings,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Process tasks until `shutdown` flips to true.
    ///
    /// Only shared store failures end the loop early.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> CoordinationResult<()> {
        info!("Starting task processing loop");
        let _heartbeat = self.locks.spawn_heartbeat();

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, stopping task processing");
                break;
            }

            match self.run_iteration().await {
                Ok(IterationOutcome::Idle) => {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(IDLE_BACKOFF) => {}
                    }
                }
                Ok(outcome) => debug!(?outcome, "Iteration finished"),
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Iteration failed, continuing");
                }
                Err(e) => {
                    error!(error = %e, "Coordination store failure");
                    self.locks.release_all_locks().await.ok();
                    return Err(e);
                }
            }
        }

        self.locks.release_all_locks().await?;
        Ok(())
    }

    /// Take one task from the queue and process it under coordination
    pub async fn run_iteration(&self) -> CoordinationResult<IterationOutcome> {
        // Locks left behind by an interrupted iteration
        self.locks.release_all_locks().await?;

        let task = match self.queue.pop(self.settings.pop_timeout).await {
            Ok(Some(task)) => task,
            Ok(None) => return Ok(IterationOutcome::Idle),
            // Already removed from the queue; nothing to put back
            Err(CoordinationError::Serialization(e)) => {
                warn!(error = %e, "Dropping undecodable job");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(IterationOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let destination = task.destination();

        let lock = match (&destination, self.settings.lock_scanned_targets) {
            (Some(destination), true) => {
                match self
                    .locks
                    .acquire(
                        &format!("lock-{}", destination),
                        self.settings.destination_lease,
                        self.settings.scan_destination_max_tries,
                    )
                    .await
                {
                    Ok(handle) => Some(handle),
                    Err(CoordinationError::LockUnavailable { .. }) => {
                        debug!(task_id = %task.uid, destination = %destination, "Destination busy, requeueing");
                        self.queue.push(&task).await?;
                        self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                        return Ok(IterationOutcome::Requeued);
                    }
                    Err(e) => {
                        self.queue.push(&task).await?;
                        return Err(e);
                    }
                }
            }
            _ => None,
        };

        let outcome = self.process(&task, destination.as_deref()).await;
        self.release(lock).await?;
        let outcome = outcome?;

        let counter = match &outcome {
            IterationOutcome::Completed { .. } => Some(&self.stats.completed),
            IterationOutcome::Requeued => Some(&self.stats.requeued),
            IterationOutcome::Skipped => Some(&self.stats.skipped),
            IterationOutcome::Failed => Some(&self.stats.failed),
            IterationOutcome::Idle => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        Ok(outcome)
    }

    async fn process(
        &self,
        task: &Task,
        destination: Option<&str>,
    ) -> CoordinationResult<IterationOutcome> {
        if let Some(destination) = destination {
            match self.rate_limiter.limit_requests_for_target(destination).await {
                Ok(_) => {}
                Err(CoordinationError::UnresolvableTarget { host }) => {
                    warn!(task_id = %task.uid, host = %host, "Unable to resolve target, skipping task");
                    return Ok(IterationOutcome::Skipped);
                }
                Err(e) if e.is_retryable() => {
                    warn!(task_id = %task.uid, error = %e, "Target resolution failed, requeueing");
                    self.queue.push(task).await?;
                    return Ok(IterationOutcome::Requeued);
                }
                Err(e) => return Err(e),
            }
        }

        let derived = match self.handler.handle(task).await {
            Ok(derived) => derived,
            Err(e) => {
                error!(task_id = %task.uid, error = %e, "Scan handler failed");
                return Ok(IterationOutcome::Failed);
            }
        };

        let mut scheduled = 0;
        let mut duplicates = 0;
        for new_task in &derived {
            if self.dedup.save_scheduled_task(new_task).await? {
                self.queue.push(new_task).await?;
                scheduled += 1;
            } else {
                duplicates += 1;
            }
        }

        self.stats
            .tasks_scheduled
            .fetch_add(scheduled as u64, Ordering::Relaxed);
        self.stats
            .duplicate_tasks
            .fetch_add(duplicates as u64, Ordering::Relaxed);

        info!(
            task_id = %task.uid,
            scheduled = scheduled,
            duplicates = duplicates,
            "Task completed"
        );

        Ok(IterationOutcome::Completed {
            scheduled,
            duplicates,
        })
    }

    async fn release(&self, lock: Option<LockHandle>) -> CoordinationResult<()> {
        if let Some(handle) = lock {
            if !self.locks.release(&handle).await? {
                warn!(resource = %handle.resource_name(), "Destination lock expired before release");
            }
        }
        Ok(())
    }
}
