//! # 数据模型
//!
//! 作业调度平台的核心数据结构：作业定义、执行器分组、调度日志、注册表记录，
//! 以及调度中心与执行器之间RPC所使用的报文。
//!
//! ## 核心模型
//!
//! ### JobInfo - 作业定义
//! 持久化的可调度单元，包含调度类型、路由策略、阻塞策略和下次触发时间。
//!
//! ### JobGroup - 执行器分组
//! 一组执行器地址的命名集合，地址列表由注册表周期性汇总得到。
//!
//! ### JobLog - 调度日志
//! 每次触发尝试对应一条日志，调度时写入触发结果，回调时写入执行结果。
//!
//! ### TriggerParam / HandleCallbackParam - RPC报文
//! 一次触发的参数，以及执行完成后回传调度中心的结果。
//!
//! ## 设计原则
//!
//! - 调度时间统一使用毫秒时间戳，`0` 表示停止或终止
//! - 策略字段使用封闭枚举，未知取值在解析时即被拒绝
//! - 网络报文统一使用 camelCase JSON

pub mod job;
pub mod job_log;
pub mod registry;
pub mod rpc;
pub mod strategy;

pub use job::*;
pub use job_log::*;
pub use registry::*;
pub use rpc::*;
pub use strategy::*;
