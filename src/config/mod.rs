// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

pub mod core;
pub mod loader;
pub mod validation;

pub use core::{
    CoordinationConfig, DatabaseConfig, LockingConfig, ObservabilityConfig, RateLimitConfig,
    RedisConfig, ReportingConfig, ResolverConfig,
};

pub use loader::{ConfigFormat, ConfigLoader};

pub use validation::{ConfigValidator, ValidationReport};

use anyhow::Result;

impl CoordinationConfig {
    /// Load configuration from environment variables with sensible defaults
    ///
    /// Supports the following environment variables:
    /// - REDIS_URL: Redis connection URL
    /// - DATABASE_URL: PostgreSQL connection URL (enables database if set)
    /// - LOG_LEVEL: Logging level
    /// - SECONDS_PER_REQUEST_FOR_ONE_IP: per-IP request spacing
    /// - LOCK_MAX_TRIES: lock acquisition attempts
    pub fn from_env() -> Result<Self> {
        let mut config = CoordinationConfig::default();
        loader::apply_env_overrides(&mut config)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }
}
