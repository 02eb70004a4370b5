pub mod postgres_job_group_repository;
pub mod postgres_job_info_repository;
pub mod postgres_job_log_repository;
pub mod postgres_registry_repository;
pub mod postgres_schedule_lock;

pub use postgres_job_group_repository::*;
pub use postgres_job_info_repository::*;
pub use postgres_job_log_repository::*;
pub use postgres_registry_repository::*;
pub use postgres_schedule_lock::*;

use anyhow::{Context, Result};
use scheduler_core::config::DatabaseConfig;
use sqlx::PgPool;
use std::time::Duration;

/// 数据库连接池管理器
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// 创建新的数据库管理器
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.url)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.url))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("数据库健康检查失败")?;
        Ok(())
    }
}
