// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Worker Module
 * Coordinated scan worker components
 *
 * © 2026 Bountyy Oy
 */

pub mod coordinated_worker;

pub use coordinated_worker::{
    CoordinatedWorker, IterationOutcome, ScanHandler, WorkerSettings, WorkerStats,
};
