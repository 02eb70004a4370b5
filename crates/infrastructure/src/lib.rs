//! # scheduler-infrastructure
//!
//! 仓储的具体实现（内存与PostgreSQL）以及指标采集。

pub mod database;
pub mod memory;
pub mod observability;

pub use database::*;
pub use memory::*;
pub use observability::MetricsCollector;
