pub mod admin_executor;
pub mod app_config;
pub mod database;
pub mod logging;

pub use admin_executor::{AdminConfig, ExecutorConfig};
pub use app_config::AppConfig;
pub use database::{DatabaseBackend, DatabaseConfig};
pub use logging::{LoggingConfig, ObservabilityConfig};
