//! # scheduler-worker
//!
//! 执行器：接收调度中心的触发，按作业ID串行执行处理器，
//! 并把执行结果经回调通道可靠地回传调度中心。

pub mod admin_client;
pub mod backlog;
pub mod callback;
pub mod executor_service;
pub mod executors;
pub mod handler;
pub mod heartbeat;
pub mod job_logger;
pub mod job_thread;
pub mod job_thread_registry;
pub mod service;
pub mod thread_monitor;

pub use admin_client::HttpAdminClient;
pub use backlog::CallbackBacklog;
pub use callback::{CallbackChannel, CallbackSender};
pub use executor_service::ExecutorBizImpl;
pub use executors::{HttpJobHandler, ShellJobHandler};
pub use handler::{FnHandler, HandleResult, HandlerRegistry, JobContext, JobHandler};
pub use heartbeat::ExecutorRegistrar;
pub use job_logger::{JobFileLogger, JobLogAppender};
pub use job_thread::{JobThread, JobThreadFactory, JobThreadOptions, PushError};
pub use job_thread_registry::JobThreadRegistry;
pub use service::{ExecutorRuntime, ExecutorRuntimeBuilder};
pub use thread_monitor::ThreadMonitor;
