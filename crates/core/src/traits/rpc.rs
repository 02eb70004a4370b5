//! RPC契约
//!
//! `ExecutorBiz` 由执行器实现、由调度中心通过HTTP客户端调用；
//! `AdminBiz` 由调度中心实现、由执行器调用。两端的HTTP服务与客户端
//! 都围绕这两个trait构建，测试中可以直接替换为内存实现。

use async_trait::async_trait;

use crate::models::{
    ExecutorStatus, HandleCallbackParam, IdleBeatParam, KillParam, LogParam, LogResult,
    RegistryParam, ReturnT, ThreadInfo, TriggerParam,
};

/// 执行器控制面
#[async_trait]
pub trait ExecutorBiz: Send + Sync {
    /// 存活探测
    async fn beat(&self) -> ReturnT<String>;

    /// 作业线程正在运行或队列非空时返回失败
    async fn idle_beat(&self, param: IdleBeatParam) -> ReturnT<String>;

    /// 按阻塞策略入队或拒绝
    async fn run(&self, param: TriggerParam) -> ReturnT<String>;

    /// 协作式停止并移除作业线程
    async fn kill(&self, param: KillParam) -> ReturnT<String>;

    async fn log(&self, param: LogParam) -> ReturnT<LogResult>;

    async fn status(&self) -> ReturnT<ExecutorStatus>;

    /// 在协作式停止之外强制中止正在执行的单元
    async fn force_kill(&self, param: KillParam) -> ReturnT<String>;
}

/// 调度中心控制面
#[async_trait]
pub trait AdminBiz: Send + Sync {
    async fn callback(&self, params: Vec<HandleCallbackParam>) -> ReturnT<String>;

    async fn registry(&self, param: RegistryParam) -> ReturnT<String>;

    async fn registry_remove(&self, param: RegistryParam) -> ReturnT<String>;

    async fn report_running_threads(&self, threads: Vec<ThreadInfo>) -> ReturnT<String>;
}
