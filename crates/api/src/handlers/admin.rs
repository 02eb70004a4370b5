use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use scheduler_core::models::{HandleCallbackParam, JobInfo, RegistryParam, ReturnT, ThreadInfo};
use scheduler_core::traits::AdminBiz;
use scheduler_dispatcher::{AdminBizImpl, Coordinator, JobController};

use crate::error::ApiResult;

/// 调度中心路由状态
#[derive(Clone)]
pub struct AdminState {
    pub admin_service: Arc<AdminBizImpl>,
    pub controller: Arc<JobController>,
}

impl AdminState {
    pub fn from_coordinator(coordinator: &Coordinator) -> Self {
        Self {
            admin_service: Arc::clone(coordinator.admin_service()),
            controller: Arc::clone(coordinator.controller()),
        }
    }
}

pub async fn callback(
    State(state): State<AdminState>,
    Json(params): Json<Vec<HandleCallbackParam>>,
) -> Json<ReturnT<String>> {
    Json(state.admin_service.callback(params).await)
}

pub async fn registry(
    State(state): State<AdminState>,
    Json(param): Json<RegistryParam>,
) -> Json<ReturnT<String>> {
    Json(state.admin_service.registry(param).await)
}

pub async fn registry_remove(
    State(state): State<AdminState>,
    Json(param): Json<RegistryParam>,
) -> Json<ReturnT<String>> {
    Json(state.admin_service.registry_remove(param).await)
}

pub async fn report_running_threads(
    State(state): State<AdminState>,
    Json(threads): Json<Vec<ThreadInfo>>,
) -> Json<ReturnT<String>> {
    Json(state.admin_service.report_running_threads(threads).await)
}

/// 执行器最近上报的运行线程
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningThreadsView {
    pub address: String,
    pub reported_at: i64,
    pub threads: Vec<ThreadInfo>,
}

pub async fn running_threads(State(state): State<AdminState>) -> Json<ReturnT<Vec<RunningThreadsView>>> {
    let views = state
        .admin_service
        .running_threads()
        .into_iter()
        .map(|(address, snapshot)| RunningThreadsView {
            address,
            reported_at: snapshot.reported_at.timestamp_millis(),
            threads: snapshot.threads,
        })
        .collect();
    Json(ReturnT::success_with(views))
}

pub async fn add_job(
    State(state): State<AdminState>,
    Json(job): Json<JobInfo>,
) -> ApiResult<Json<ReturnT<i64>>> {
    let created = state.controller.add(job).await?;
    Ok(Json(ReturnT::success_with(created.id)))
}

pub async fn update_job(
    State(state): State<AdminState>,
    Json(job): Json<JobInfo>,
) -> ApiResult<Json<ReturnT<String>>> {
    state.controller.update(job).await?;
    Ok(Json(ReturnT::success()))
}

pub async fn remove_job(
    State(state): State<AdminState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<ReturnT<String>>> {
    state.controller.remove(job_id).await?;
    Ok(Json(ReturnT::success()))
}

/// 启动调度，返回下次触发时间
pub async fn start_job(
    State(state): State<AdminState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<ReturnT<i64>>> {
    let job = state.controller.start(job_id).await?;
    Ok(Json(ReturnT::success_with(job.trigger_next_time)))
}

pub async fn stop_job(
    State(state): State<AdminState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<ReturnT<String>>> {
    state.controller.stop(job_id).await?;
    Ok(Json(ReturnT::success()))
}

/// 手动触发请求
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerJobRequest {
    pub executor_param: Option<String>,
    pub address_list: Option<String>,
}

pub async fn trigger_job(
    State(state): State<AdminState>,
    Path(job_id): Path<i64>,
    Json(request): Json<TriggerJobRequest>,
) -> ApiResult<Json<ReturnT<String>>> {
    state
        .controller
        .trigger(job_id, request.executor_param, request.address_list)
        .await?;
    Ok(Json(ReturnT::success()))
}

pub async fn kill_log(
    State(state): State<AdminState>,
    Path(log_id): Path<i64>,
) -> ApiResult<Json<ReturnT<String>>> {
    Ok(Json(state.controller.kill_log(log_id).await?))
}
