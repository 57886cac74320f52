// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - PostgreSQL Task Store
 * Scheduled task deduplication table with connection pooling
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::CoordinationResult;
use crate::task_dedup::{ScheduledTaskKey, TaskStore};

/// `scheduled_task` table behind a deadpool-postgres pool
pub struct PostgresTaskStore {
    pool: Pool,
}

impl PostgresTaskStore {
    /// Create the pool and check connectivity
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut pg_config = Config::new();
        pg_config.url = Some(config.url.clone());
        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        pg_config.pool = Some(PoolConfig::new(config.pool_size));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL pool")?;

        let client = pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        client
            .query("SELECT 1", &[])
            .await
            .context("Failed to test database connection")?;

        info!("PostgreSQL connected: pool_size={}", config.pool_size);

        let store = Self { pool };
        if config.auto_migrate {
            store.init_schema().await?;
        }

        Ok(store)
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;

        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS scheduled_task (
                    analysis_id TEXT NOT NULL,
                    deduplication_data TEXT NOT NULL,
                    deduplication_data_original TEXT,
                    task_id TEXT,
                    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                    PRIMARY KEY (analysis_id, deduplication_data)
                );
                CREATE INDEX IF NOT EXISTS idx_scheduled_task_created_at
                    ON scheduled_task(created_at);
                "#,
            )
            .await
            .context("Failed to create scheduled_task table")?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn get_pool_stats(&self) -> (usize, usize) {
        let status = self.pool.status();
        (status.size, status.available)
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn insert_if_absent(&self, key: &ScheduledTaskKey) -> CoordinationResult<bool> {
        let client = self.pool.get().await?;

        let inserted = client
            .execute(
                r#"
                INSERT INTO scheduled_task
                    (analysis_id, deduplication_data, deduplication_data_original, task_id)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (analysis_id, deduplication_data) DO NOTHING
                "#,
                &[
                    &key.analysis_id,
                    &key.deduplication_data,
                    &key.deduplication_data_original,
                    &key.task_id,
                ],
            )
            .await?;

        Ok(inserted == 1)
    }
}
