//! # scheduler-core
//!
//! 作业调度平台的公共基础：错误类型、配置、日志初始化、数据模型，
//! 以及调度中心与执行器共享的仓储和RPC契约。

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use errors::{SchedulerError, SchedulerResult};

/// 当前时间的毫秒时间戳
pub fn current_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
