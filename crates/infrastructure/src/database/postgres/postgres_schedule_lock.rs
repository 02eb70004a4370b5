use async_trait::async_trait;
use scheduler_core::{
    traits::{ScheduleLock, ScheduleLockGuard},
    SchedulerError, SchedulerResult,
};
use sqlx::{PgPool, Postgres, Transaction};

const SCHEDULE_LOCK_NAME: &str = "schedule_lock";

/// 基于行锁的调度锁
///
/// 在事务内对 `job_lock` 中的固定行执行 `SELECT ... FOR UPDATE`，
/// 事务提交即释放。
pub struct PostgresScheduleLock {
    pool: PgPool,
}

impl PostgresScheduleLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PostgresScheduleLockGuard {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ScheduleLock for PostgresScheduleLock {
    async fn acquire(&self) -> SchedulerResult<Box<dyn ScheduleLockGuard>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedulerError::LockAcquisition(e.to_string()))?;

        let row = sqlx::query("SELECT lock_name FROM job_lock WHERE lock_name = $1 FOR UPDATE")
            .bind(SCHEDULE_LOCK_NAME)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| SchedulerError::LockAcquisition(e.to_string()))?;

        if row.is_none() {
            return Err(SchedulerError::LockAcquisition(format!(
                "锁记录不存在: {SCHEDULE_LOCK_NAME}"
            )));
        }

        Ok(Box::new(PostgresScheduleLockGuard { tx }))
    }
}

#[async_trait]
impl ScheduleLockGuard for PostgresScheduleLockGuard {
    async fn release(self: Box<Self>) -> SchedulerResult<()> {
        self.tx.commit().await.map_err(SchedulerError::Database)
    }
}
