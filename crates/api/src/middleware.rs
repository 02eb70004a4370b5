use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use scheduler_core::models::ACCESS_TOKEN_HEADER;

use crate::error::ApiError;

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    info!("开始处理请求: {} {}", method, uri);

    let response = next.run(request).await;
    let duration = start.elapsed();

    info!(
        "完成请求处理: {} {} - 状态: {} - 耗时: {:?}",
        method,
        uri,
        response.status(),
        duration
    );

    response
}

/// 配置的访问令牌，为空时不校验
#[derive(Debug, Clone, Default)]
pub struct AccessToken(pub Option<Arc<str>>);

impl AccessToken {
    pub fn new(token: Option<&str>) -> Self {
        Self(
            token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(Arc::from),
        )
    }

    pub fn matches(&self, provided: Option<&str>) -> bool {
        match self.0.as_deref() {
            Some(expected) => provided == Some(expected),
            None => true,
        }
    }
}

/// 校验 `X-Job-Access-Token` 请求头
pub async fn access_token_guard(
    State(token): State<AccessToken>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if !token.matches(provided) {
        warn!("访问令牌校验失败: {}", request.uri());
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub fn trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}
