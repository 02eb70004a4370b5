use async_trait::async_trait;
use scheduler_core::{
    models::{AddressType, JobGroup},
    traits::JobGroupRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{PgPool, Row};

/// PostgreSQL执行器分组仓储实现
pub struct PostgresJobGroupRepository {
    pool: PgPool,
}

impl PostgresJobGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn address_type_code(address_type: AddressType) -> i16 {
        match address_type {
            AddressType::Auto => 0,
            AddressType::Manual => 1,
        }
    }

    fn row_to_group(row: &sqlx::postgres::PgRow) -> SchedulerResult<JobGroup> {
        let address_type: i16 = row.try_get("address_type")?;
        Ok(JobGroup {
            id: row.try_get("id")?,
            app_name: row.try_get("app_name")?,
            title: row.try_get("title")?,
            address_type: if address_type == 1 {
                AddressType::Manual
            } else {
                AddressType::Auto
            },
            address_list: row.try_get("address_list")?,
            update_time: row.try_get("update_time")?,
        })
    }
}

#[async_trait]
impl JobGroupRepository for PostgresJobGroupRepository {
    async fn create(&self, group: &JobGroup) -> SchedulerResult<JobGroup> {
        let row = sqlx::query(
            "INSERT INTO job_group (app_name, title, address_type, address_list, update_time) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&group.app_name)
        .bind(&group.title)
        .bind(Self::address_type_code(group.address_type))
        .bind(&group.address_list)
        .bind(group.update_time)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let mut created = group.clone();
        created.id = row.try_get("id")?;
        Ok(created)
    }

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>> {
        let row = sqlx::query(
            "SELECT id, app_name, title, address_type, address_list, update_time FROM job_group WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_group).transpose()
    }

    async fn find_by_address_type(
        &self,
        address_type: AddressType,
    ) -> SchedulerResult<Vec<JobGroup>> {
        let rows = sqlx::query(
            "SELECT id, app_name, title, address_type, address_list, update_time FROM job_group \
             WHERE address_type = $1 ORDER BY id",
        )
        .bind(Self::address_type_code(address_type))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_group).collect()
    }

    async fn update(&self, group: &JobGroup) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE job_group SET app_name = $2, title = $3, address_type = $4, address_list = $5, \
             update_time = $6 WHERE id = $1",
        )
        .bind(group.id)
        .bind(&group.app_name)
        .bind(&group.title)
        .bind(Self::address_type_code(group.address_type))
        .bind(&group.address_list)
        .bind(group.update_time)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobGroupNotFound { id: group.id });
        }
        Ok(())
    }
}
