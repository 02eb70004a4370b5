//! # scheduler-dispatcher
//!
//! 调度中心：时间轮调度、触发线程池、执行器路由、注册中心与执行结果处理。
//!
//! 组件之间通过显式持有的 `Arc` 协作，由 [`Coordinator`] 统一构建与启停。

pub mod admin_service;
pub mod completer;
pub mod controller;
pub mod coordinator;
pub mod cron_utils;
pub mod executor_client;
pub mod job_trigger;
pub mod registry;
pub mod scheduler;
pub mod strategies;
pub mod time_ring;
pub mod trigger_pool;

pub use admin_service::AdminBizImpl;
pub use completer::JobCompleter;
pub use controller::JobController;
pub use coordinator::{Coordinator, CoordinatorRepositories};
pub use executor_client::{ExecutorClientProvider, HttpExecutorClient, HttpExecutorClientPool};
pub use job_trigger::{JobTrigger, TriggerRequest};
pub use registry::JobRegistryService;
pub use scheduler::JobScheduler;
pub use strategies::ExecutorRouter;
pub use trigger_pool::{JobTriggerPool, TriggerPoolStats, TriggerSubmitter};
