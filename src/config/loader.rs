// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::core::CoordinationConfig;
use super::validation::ConfigValidator;

pub struct ConfigLoader {
    config_path: PathBuf,
    format: ConfigFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref().to_path_buf();
        let format = Self::detect_format(&path)?;

        Ok(Self {
            config_path: path,
            format,
        })
    }

    pub fn with_format<P: AsRef<Path>>(config_path: P, format: ConfigFormat) -> Result<Self> {
        Ok(Self {
            config_path: config_path.as_ref().to_path_buf(),
            format,
        })
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| anyhow::anyhow!("Could not determine config file format"))?;

        match extension {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(anyhow::anyhow!("Unsupported config file format: {}", extension)),
        }
    }

    pub fn load_config(&self) -> Result<CoordinationConfig> {
        let content = std::fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file: {:?}", self.config_path))?;

        let mut config: CoordinationConfig = match self.format {
            ConfigFormat::Yaml => serde_yaml::from_str(&content)
                .context("Failed to parse YAML config")?,
            ConfigFormat::Toml => toml::from_str(&content)
                .context("Failed to parse TOML config")?,
            ConfigFormat::Json => serde_json::from_str(&content)
                .context("Failed to parse JSON config")?,
        };

        apply_env_overrides(&mut config)?;

        ConfigValidator::validate(&config)?;

        tracing::debug!("Loaded configuration from {:?}", self.config_path);

        Ok(config)
    }
}

/// Environment variables take precedence over file values
pub(crate) fn apply_env_overrides(config: &mut CoordinationConfig) -> Result<()> {
    if let Ok(redis_url) = std::env::var("REDIS_URL") {
        config.redis.url = redis_url;
    }

    if let Ok(db_url) = std::env::var("DATABASE_URL") {
        config.database.url = db_url;
        config.database.enabled = true;
    }

    if let Ok(log_level) = std::env::var("LOG_LEVEL") {
        config.observability.log_level = log_level;
    }

    if let Ok(seconds) = std::env::var("SECONDS_PER_REQUEST_FOR_ONE_IP") {
        config.rate_limit.seconds_per_request = seconds
            .parse()
            .context("Invalid SECONDS_PER_REQUEST_FOR_ONE_IP")?;
    }

    if let Ok(max_tries) = std::env::var("LOCK_MAX_TRIES") {
        config.locking.max_tries = max_tries.parse().context("Invalid LOCK_MAX_TRIES")?;
    }

    Ok(())
}
