pub mod postgres;

pub use postgres::{
    DatabaseManager, PostgresJobExecutorMappingRepository, PostgresJobGroupRepository,
    PostgresJobInfoRepository, PostgresJobLogRepository, PostgresRegistryRepository,
    PostgresScheduleLock,
};
