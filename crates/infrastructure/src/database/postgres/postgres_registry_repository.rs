use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{
    models::{RegistryEntry, RegistryParam},
    traits::{JobExecutorMappingRepository, JobRegistryRepository},
    SchedulerError, SchedulerResult,
};
use sqlx::{PgPool, Row};
use tracing::debug;

/// PostgreSQL注册表仓储实现
pub struct PostgresRegistryRepository {
    pool: PgPool,
}

impl PostgresRegistryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRegistryRepository for PostgresRegistryRepository {
    async fn save_or_update(
        &self,
        param: &RegistryParam,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job_registry (registry_group, registry_key, registry_value, running_count, thread_capacity, update_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (registry_group, registry_key, registry_value) DO UPDATE SET
                running_count = EXCLUDED.running_count,
                thread_capacity = EXCLUDED.thread_capacity,
                update_time = EXCLUDED.update_time
            "#,
        )
        .bind(&param.registry_group)
        .bind(&param.registry_key)
        .bind(&param.registry_value)
        .bind(param.running_count as i32)
        .bind(param.thread_capacity as i32)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn delete(&self, param: &RegistryParam) -> SchedulerResult<()> {
        sqlx::query(
            "DELETE FROM job_registry WHERE registry_group = $1 AND registry_key = $2 AND registry_value = $3",
        )
        .bind(&param.registry_group)
        .bind(&param.registry_key)
        .bind(&param.registry_value)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn remove_dead(&self, dead_before: DateTime<Utc>) -> SchedulerResult<u64> {
        let result = sqlx::query("DELETE FROM job_registry WHERE update_time < $1")
            .bind(dead_before)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() > 0 {
            debug!("清理失效注册记录: {} 条", result.rows_affected());
        }
        Ok(result.rows_affected())
    }

    async fn find_all_alive(
        &self,
        alive_after: DateTime<Utc>,
    ) -> SchedulerResult<Vec<RegistryEntry>> {
        let rows = sqlx::query(
            "SELECT id, registry_group, registry_key, registry_value, running_count, thread_capacity, update_time \
             FROM job_registry WHERE update_time > $1",
        )
        .bind(alive_after)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter()
            .map(|row| {
                let running_count: i32 = row.try_get("running_count")?;
                let thread_capacity: i32 = row.try_get("thread_capacity")?;
                Ok(RegistryEntry {
                    id: row.try_get("id")?,
                    registry_group: row.try_get("registry_group")?,
                    registry_key: row.try_get("registry_key")?,
                    registry_value: row.try_get("registry_value")?,
                    running_count: running_count.max(0) as u32,
                    thread_capacity: thread_capacity.max(0) as u32,
                    update_time: row.try_get("update_time")?,
                })
            })
            .collect()
    }
}

/// PostgreSQL作业-地址映射
pub struct PostgresJobExecutorMappingRepository {
    pool: PgPool,
}

impl PostgresJobExecutorMappingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobExecutorMappingRepository for PostgresJobExecutorMappingRepository {
    async fn record(&self, job_id: i64, address: &str) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO job_executor_mapping (job_id, executor_address, update_time) VALUES ($1, $2, NOW()) \
             ON CONFLICT (job_id) DO UPDATE SET executor_address = EXCLUDED.executor_address, update_time = NOW()",
        )
        .bind(job_id)
        .bind(address)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn find(&self, job_id: i64) -> SchedulerResult<Option<String>> {
        let row = sqlx::query("SELECT executor_address FROM job_executor_mapping WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        match row {
            Some(row) => Ok(Some(row.try_get("executor_address")?)),
            None => Ok(None),
        }
    }
}
