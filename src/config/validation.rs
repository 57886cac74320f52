// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use anyhow::{Context, Result};
use std::collections::HashMap;
use validator::Validate;

use super::core::CoordinationConfig;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &CoordinationConfig) -> Result<()> {
        config.validate().context("Configuration validation failed")?;

        Self::validate_redis_config(config)?;
        Self::validate_database_config(config)?;
        Self::validate_locking_config(config)?;

        Ok(())
    }

    fn validate_redis_config(config: &CoordinationConfig) -> Result<()> {
        if !config.redis.url.starts_with("redis://") && !config.redis.url.starts_with("rediss://") {
            return Err(anyhow::anyhow!(
                "Redis URL must start with redis:// or rediss://"
            ));
        }

        if config.redis.queue_key.is_empty() {
            return Err(anyhow::anyhow!("Redis queue key cannot be empty"));
        }

        Ok(())
    }

    fn validate_database_config(config: &CoordinationConfig) -> Result<()> {
        if !config.database.enabled {
            return Ok(());
        }

        if !config.database.url.starts_with("postgresql://")
            && !config.database.url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "Database URL must start with postgresql:// or postgres://"
            ));
        }

        Ok(())
    }

    fn validate_locking_config(config: &CoordinationConfig) -> Result<()> {
        let locking = &config.locking;

        // Locks would lapse between two refreshes otherwise
        if locking.heartbeat_interval_secs >= locking.default_lease_secs {
            return Err(anyhow::anyhow!(
                "Heartbeat interval ({}s) must be shorter than the default lease ({}s)",
                locking.heartbeat_interval_secs,
                locking.default_lease_secs
            ));
        }

        if locking.sleep_min_ms > locking.sleep_max_ms {
            return Err(anyhow::anyhow!(
                "Lock sleep window is inverted: min {}ms > max {}ms",
                locking.sleep_min_ms,
                locking.sleep_max_ms
            ));
        }

        Ok(())
    }

    pub fn generate_validation_report(config: &CoordinationConfig) -> ValidationReport {
        let mut report = ValidationReport::new();

        if let Err(e) = Self::validate(config) {
            report.add_error("config", &format!("{:#}", e));
        }

        let reporting = &config.reporting;
        if !(reporting.grace_days_high <= reporting.grace_days_medium
            && reporting.grace_days_medium <= reporting.grace_days_low)
        {
            report.add_warning(
                "reporting",
                "Grace periods are usually ordered high <= medium <= low",
            );
        }

        if config.rate_limit.seconds_per_request == 0 {
            report.add_info("rate_limit", "Per-IP request limiting is disabled");
        }

        if !config.database.enabled {
            report.add_info("database", "Task deduplication falls back to the in-memory store");
        }

        report
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: HashMap<String, Vec<String>>,
    pub warnings: HashMap<String, Vec<String>>,
    pub info: HashMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: HashMap::new(),
            warnings: HashMap::new(),
            info: HashMap::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn add_info(&mut self, field: &str, message: &str) {
        self.info
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordinationConfig::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        let mut config = CoordinationConfig::default();
        config.redis.url = "http://localhost:6379".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_heartbeat_must_be_shorter_than_lease() {
        let mut config = CoordinationConfig::default();
        config.locking.default_lease_secs = 30;
        config.locking.heartbeat_interval_secs = 30;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_inverted_sleep_window() {
        let mut config = CoordinationConfig::default();
        config.locking.sleep_min_ms = 1000;
        config.locking.sleep_max_ms = 10;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_grace_days_out_of_range_rejected() {
        let mut config = CoordinationConfig::default();
        config.reporting.grace_days_low = 200_000_000_000_000;
        assert!(ConfigValidator::validate(&config).is_err());

        config.reporting.grace_days_low = 36500;
        assert!(ConfigValidator::validate(&config).is_ok());

        config.reporting.grace_days_high = -1;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_validation_report() {
        let mut config = CoordinationConfig::default();
        config.reporting.grace_days_high = 365;

        let report = ConfigValidator::generate_validation_report(&config);
        assert!(!report.has_errors());
        assert!(report.has_warnings());
        assert!(report.info.contains_key("rate_limit"));
    }
}
