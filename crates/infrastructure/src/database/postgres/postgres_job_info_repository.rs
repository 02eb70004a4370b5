use async_trait::async_trait;
use scheduler_core::{
    models::{GlueType, JobInfo, TriggerStatus},
    traits::JobInfoRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{PgPool, Row};
use tracing::debug;

const JOB_INFO_COLUMNS: &str = "id, job_group, job_desc, schedule_type, schedule_conf, \
    schedule_deadline, misfire_strategy, route_strategy, block_strategy, executor_handler, \
    executor_param, executor_timeout, executor_fail_retry_count, glue_type, glue_source, \
    glue_updatetime, child_job_ids, trigger_status, trigger_last_time, trigger_next_time";

/// PostgreSQL作业仓储实现
pub struct PostgresJobInfoRepository {
    pool: PgPool,
}

impl PostgresJobInfoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 将数据库行转换为JobInfo模型
    fn row_to_job_info(row: &sqlx::postgres::PgRow) -> SchedulerResult<JobInfo> {
        let schedule_type: String = row.try_get("schedule_type")?;
        let misfire_strategy: String = row.try_get("misfire_strategy")?;
        let route_strategy: String = row.try_get("route_strategy")?;
        let block_strategy: String = row.try_get("block_strategy")?;
        let glue_type: String = row.try_get("glue_type")?;
        let child_job_ids: Option<String> = row.try_get("child_job_ids")?;
        let trigger_status: i16 = row.try_get("trigger_status")?;

        Ok(JobInfo {
            id: row.try_get("id")?,
            job_group: row.try_get("job_group")?,
            job_desc: row.try_get("job_desc")?,
            schedule_type: schedule_type.parse()?,
            schedule_conf: row.try_get("schedule_conf")?,
            schedule_deadline: row.try_get("schedule_deadline")?,
            misfire_strategy: misfire_strategy.parse()?,
            route_strategy: route_strategy.parse()?,
            block_strategy: block_strategy.parse()?,
            executor_handler: row.try_get("executor_handler")?,
            executor_param: row.try_get("executor_param")?,
            executor_timeout: row.try_get("executor_timeout")?,
            executor_fail_retry_count: row.try_get("executor_fail_retry_count")?,
            glue_type: glue_type.parse::<GlueType>()?,
            glue_source: row.try_get("glue_source")?,
            glue_updatetime: row.try_get("glue_updatetime")?,
            child_job_ids: JobInfo::parse_child_job_ids(child_job_ids.as_deref().unwrap_or(""))?,
            trigger_status: TriggerStatus::from_i16(trigger_status),
            trigger_last_time: row.try_get("trigger_last_time")?,
            trigger_next_time: row.try_get("trigger_next_time")?,
        })
    }
}

#[async_trait]
impl JobInfoRepository for PostgresJobInfoRepository {
    async fn create(&self, job: &JobInfo) -> SchedulerResult<JobInfo> {
        let row = sqlx::query(
            r#"
            INSERT INTO job_info (job_group, job_desc, schedule_type, schedule_conf, schedule_deadline,
                misfire_strategy, route_strategy, block_strategy, executor_handler, executor_param,
                executor_timeout, executor_fail_retry_count, glue_type, glue_source, glue_updatetime,
                child_job_ids, trigger_status, trigger_last_time, trigger_next_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING id
            "#,
        )
        .bind(job.job_group)
        .bind(&job.job_desc)
        .bind(job.schedule_type.as_str())
        .bind(&job.schedule_conf)
        .bind(job.schedule_deadline)
        .bind(job.misfire_strategy.as_str())
        .bind(job.route_strategy.as_str())
        .bind(job.block_strategy.as_str())
        .bind(&job.executor_handler)
        .bind(&job.executor_param)
        .bind(job.executor_timeout)
        .bind(job.executor_fail_retry_count)
        .bind(job.glue_type.as_str())
        .bind(&job.glue_source)
        .bind(job.glue_updatetime)
        .bind(job.child_job_ids_string())
        .bind(job.trigger_status.as_i16())
        .bind(job.trigger_last_time)
        .bind(job.trigger_next_time)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let mut created = job.clone();
        created.id = row.try_get("id")?;
        debug!("创建作业成功: {}", created.id);
        Ok(created)
    }

    async fn update(&self, job: &JobInfo) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE job_info SET job_group = $2, job_desc = $3, schedule_type = $4, schedule_conf = $5,
                schedule_deadline = $6, misfire_strategy = $7, route_strategy = $8, block_strategy = $9,
                executor_handler = $10, executor_param = $11, executor_timeout = $12,
                executor_fail_retry_count = $13, glue_type = $14, glue_source = $15,
                glue_updatetime = $16, child_job_ids = $17, trigger_status = $18,
                trigger_last_time = $19, trigger_next_time = $20
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.job_group)
        .bind(&job.job_desc)
        .bind(job.schedule_type.as_str())
        .bind(&job.schedule_conf)
        .bind(job.schedule_deadline)
        .bind(job.misfire_strategy.as_str())
        .bind(job.route_strategy.as_str())
        .bind(job.block_strategy.as_str())
        .bind(&job.executor_handler)
        .bind(&job.executor_param)
        .bind(job.executor_timeout)
        .bind(job.executor_fail_retry_count)
        .bind(job.glue_type.as_str())
        .bind(&job.glue_source)
        .bind(job.glue_updatetime)
        .bind(job.child_job_ids_string())
        .bind(job.trigger_status.as_i16())
        .bind(job.trigger_last_time)
        .bind(job.trigger_next_time)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound { id: job.id });
        }
        Ok(())
    }

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>> {
        let row = sqlx::query(&format!("SELECT {JOB_INFO_COLUMNS} FROM job_info WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_job_info).transpose()
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM job_info WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn schedule_job_query(
        &self,
        max_next_time: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<JobInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_INFO_COLUMNS} FROM job_info \
             WHERE trigger_status = 1 AND trigger_next_time <= $1 \
             ORDER BY trigger_next_time, id LIMIT $2"
        ))
        .bind(max_next_time)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_job_info).collect()
    }

    async fn schedule_update(&self, jobs: &[JobInfo]) -> SchedulerResult<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(SchedulerError::Database)?;
        for job in jobs {
            sqlx::query(
                "UPDATE job_info SET trigger_status = $2, trigger_last_time = $3, trigger_next_time = $4 \
                 WHERE id = $1",
            )
            .bind(job.id)
            .bind(job.trigger_status.as_i16())
            .bind(job.trigger_last_time)
            .bind(job.trigger_next_time)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::Database)?;
        }
        tx.commit().await.map_err(SchedulerError::Database)?;

        debug!("批量回写调度时间: {} 个作业", jobs.len());
        Ok(())
    }
}
