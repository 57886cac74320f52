// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Target Coordination Library
 * Distributed locks, per-IP request limits, target resolution and
 * task/finding deduplication shared by scanner workers
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

pub mod config;
pub mod database;
pub mod errors;
pub mod lock;
pub mod queue;
pub mod rate_limiter;
pub mod reporting;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod task_dedup;
pub mod types;
pub mod worker;

pub use config::CoordinationConfig;
pub use errors::{CoordinationError, CoordinationResult, StoreError};
pub use lock::{HeartbeatHandle, LockHandle, LockManager, LockSettings, SustainedLockSet};
pub use rate_limiter::TargetRateLimiter;
pub use reporting::{DedupPolicy, NormalForm, NormalFormRules, ReportDeduplicator};
pub use resolver::{ChaseOutcome, RecordType, Resolver, MAX_CNAME_NEST_DEPTH};
pub use task_dedup::{canonical_task_key, canonicalize, TaskDeduplicator, TaskStore};
pub use types::{Finding, Severity, Task};
