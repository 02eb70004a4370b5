//! # 配置
//!
//! 配置按以下顺序合并：
//! 1. 结构体默认值
//! 2. TOML配置文件
//! 3. `SCHEDULER_` 前缀的环境变量，嵌套字段使用 `__` 分隔，
//!    例如 `SCHEDULER_ADMIN__PRE_READ_MS=3000`

pub mod models;

pub use models::*;
