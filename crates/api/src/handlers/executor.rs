//! 执行器RPC：调度中心通过这些路由下发触发、终止与查询

use std::sync::Arc;

use axum::{extract::State, Json};

use scheduler_core::models::{
    ExecutorStatus, IdleBeatParam, KillParam, LogParam, LogResult, ReturnT, TriggerParam,
};
use scheduler_core::traits::ExecutorBiz;

pub type ExecutorState = Arc<dyn ExecutorBiz>;

pub async fn beat(State(biz): State<ExecutorState>) -> Json<ReturnT<String>> {
    Json(biz.beat().await)
}

pub async fn idle_beat(
    State(biz): State<ExecutorState>,
    Json(param): Json<IdleBeatParam>,
) -> Json<ReturnT<String>> {
    Json(biz.idle_beat(param).await)
}

pub async fn run(
    State(biz): State<ExecutorState>,
    Json(param): Json<TriggerParam>,
) -> Json<ReturnT<String>> {
    Json(biz.run(param).await)
}

pub async fn kill(
    State(biz): State<ExecutorState>,
    Json(param): Json<KillParam>,
) -> Json<ReturnT<String>> {
    Json(biz.kill(param).await)
}

pub async fn log(
    State(biz): State<ExecutorState>,
    Json(param): Json<LogParam>,
) -> Json<ReturnT<LogResult>> {
    Json(biz.log(param).await)
}

pub async fn status(State(biz): State<ExecutorState>) -> Json<ReturnT<ExecutorStatus>> {
    Json(biz.status().await)
}

pub async fn force_kill(
    State(biz): State<ExecutorState>,
    Json(param): Json<KillParam>,
) -> Json<ReturnT<String>> {
    Json(biz.force_kill(param).await)
}
