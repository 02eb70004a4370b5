//! # Scheduler API
//!
//! 调度中心与执行器之间双向RPC的HTTP接入层，基于Axum构建。
//!
//! ## 执行器端点（POST）
//! - `/beat` `/idleBeat` `/run` `/kill` `/log` `/status` `/forceKill`
//!
//! ## 调度中心端点
//! - `POST /api/callback` `/api/registry` `/api/registryRemove` `/api/reportRunningThreads`
//! - `GET /api/runningThreads` - 执行器最近上报的运行线程
//! - `POST /api/job/add` `/api/job/update` `/api/job/{id}/remove`
//! - `POST /api/job/{id}/start` `/api/job/{id}/stop` `/api/job/{id}/trigger`
//! - `POST /api/log/{id}/kill` - 终止某次运行
//!
//! 两端都提供 `GET /health`。配置了访问令牌时，其余请求必须携带
//! `X-Job-Access-Token` 请求头。请求与响应体均为驼峰命名的JSON，
//! 响应统一为 `ReturnT` 结构。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use scheduler_dispatcher::Coordinator;

pub use error::{ApiError, ApiResult};
pub use handlers::admin::AdminState;
pub use handlers::executor::ExecutorState;
pub use middleware::AccessToken;
use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_admin_routes, create_executor_routes};

/// 创建执行器HTTP应用
pub fn create_executor_app(biz: ExecutorState, access_token: Option<&str>) -> Router {
    create_executor_routes(biz, AccessToken::new(access_token)).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}

/// 创建调度中心HTTP应用
pub fn create_admin_app(coordinator: &Coordinator, access_token: Option<&str>) -> Router {
    create_admin_routes(
        AdminState::from_coordinator(coordinator),
        AccessToken::new(access_token),
    )
    .layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
