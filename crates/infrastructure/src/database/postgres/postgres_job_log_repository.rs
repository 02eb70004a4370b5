use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{
    models::{JobLog, SUCCESS_CODE},
    traits::JobLogRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{PgPool, Row};

const JOB_LOG_COLUMNS: &str = "id, job_group, job_id, executor_address, executor_handler, \
    executor_param, executor_sharding_param, executor_fail_retry_count, trigger_time, \
    trigger_code, trigger_msg, handle_time, handle_code, handle_msg";

/// PostgreSQL调度日志仓储实现
pub struct PostgresJobLogRepository {
    pool: PgPool,
}

impl PostgresJobLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job_log(row: &sqlx::postgres::PgRow) -> SchedulerResult<JobLog> {
        Ok(JobLog {
            id: row.try_get("id")?,
            job_group: row.try_get("job_group")?,
            job_id: row.try_get("job_id")?,
            executor_address: row.try_get("executor_address")?,
            executor_handler: row.try_get("executor_handler")?,
            executor_param: row.try_get("executor_param")?,
            executor_sharding_param: row.try_get("executor_sharding_param")?,
            executor_fail_retry_count: row.try_get("executor_fail_retry_count")?,
            trigger_time: row.try_get("trigger_time")?,
            trigger_code: row.try_get("trigger_code")?,
            trigger_msg: row.try_get("trigger_msg")?,
            handle_time: row.try_get("handle_time")?,
            handle_code: row.try_get("handle_code")?,
            handle_msg: row.try_get("handle_msg")?,
        })
    }
}

#[async_trait]
impl JobLogRepository for PostgresJobLogRepository {
    async fn create(&self, log: &JobLog) -> SchedulerResult<i64> {
        let row = sqlx::query(
            "INSERT INTO job_log (job_group, job_id, trigger_time, trigger_code, handle_code) \
             VALUES ($1, $2, $3, 0, 0) RETURNING id",
        )
        .bind(log.job_group)
        .bind(log.job_id)
        .bind(log.trigger_time)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(row.try_get("id")?)
    }

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>> {
        let row = sqlx::query(&format!("SELECT {JOB_LOG_COLUMNS} FROM job_log WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_job_log).transpose()
    }

    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            UPDATE job_log SET executor_address = $2, executor_handler = $3, executor_param = $4,
                executor_sharding_param = $5, executor_fail_retry_count = $6,
                trigger_code = $7, trigger_msg = $8
            WHERE id = $1
            "#,
        )
        .bind(log.id)
        .bind(&log.executor_address)
        .bind(&log.executor_handler)
        .bind(&log.executor_param)
        .bind(&log.executor_sharding_param)
        .bind(log.executor_fail_retry_count)
        .bind(log.trigger_code)
        .bind(&log.trigger_msg)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn update_handle_info(&self, log: &JobLog) -> SchedulerResult<bool> {
        // handle_code = 0 的条件保证并发重复回调只有一次生效
        let result = sqlx::query(
            "UPDATE job_log SET handle_time = $2, handle_code = $3, handle_msg = $4 \
             WHERE id = $1 AND handle_code = 0",
        )
        .bind(log.id)
        .bind(log.handle_time)
        .bind(log.handle_code)
        .bind(&log.handle_msg)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_handle_msg(&self, log_id: i64, handle_msg: &str) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE job_log SET handle_msg = $2 WHERE id = $1")
            .bind(log_id)
            .bind(handle_msg)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobLogNotFound { id: log_id });
        }
        Ok(())
    }

    async fn find_running_before(&self, before: DateTime<Utc>) -> SchedulerResult<Vec<JobLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_LOG_COLUMNS} FROM job_log \
             WHERE trigger_code = $1 AND handle_code = 0 AND trigger_time <= $2 ORDER BY id"
        ))
        .bind(SUCCESS_CODE)
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_job_log).collect()
    }
}
