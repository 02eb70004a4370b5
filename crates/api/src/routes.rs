use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use scheduler_core::models::{admin_paths, executor_paths};

use crate::handlers::{
    admin::{self, AdminState},
    executor::{self, ExecutorState},
    health::health_check,
};
use crate::middleware::{access_token_guard, AccessToken};

/// 执行器路由，RPC路由需要访问令牌，健康检查不需要
pub fn create_executor_routes(biz: ExecutorState, token: AccessToken) -> Router {
    let rpc = Router::new()
        .route(executor_paths::BEAT, post(executor::beat))
        .route(executor_paths::IDLE_BEAT, post(executor::idle_beat))
        .route(executor_paths::RUN, post(executor::run))
        .route(executor_paths::KILL, post(executor::kill))
        .route(executor_paths::LOG, post(executor::log))
        .route(executor_paths::STATUS, post(executor::status))
        .route(executor_paths::FORCE_KILL, post(executor::force_kill))
        .route_layer(from_fn_with_state(token, access_token_guard))
        .with_state(biz);

    Router::new().route("/health", get(health_check)).merge(rpc)
}

/// 调度中心路由：执行器回调与注册，以及作业管理
pub fn create_admin_routes(state: AdminState, token: AccessToken) -> Router {
    let rpc = Router::new()
        .route(admin_paths::CALLBACK, post(admin::callback))
        .route(admin_paths::REGISTRY, post(admin::registry))
        .route(admin_paths::REGISTRY_REMOVE, post(admin::registry_remove))
        .route(
            admin_paths::REPORT_RUNNING_THREADS,
            post(admin::report_running_threads),
        )
        .route("/api/runningThreads", get(admin::running_threads))
        .route("/api/job/add", post(admin::add_job))
        .route("/api/job/update", post(admin::update_job))
        .route("/api/job/{id}/remove", post(admin::remove_job))
        .route("/api/job/{id}/start", post(admin::start_job))
        .route("/api/job/{id}/stop", post(admin::stop_job))
        .route("/api/job/{id}/trigger", post(admin::trigger_job))
        .route("/api/log/{id}/kill", post(admin::kill_log))
        .route_layer(from_fn_with_state(token, access_token_guard))
        .with_state(state);

    Router::new().route("/health", get(health_check)).merge(rpc)
}
