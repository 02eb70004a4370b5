use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scheduler_core::models::ReturnT;
use scheduler_core::SchedulerError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("访问令牌错误")]
    Unauthorized,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Scheduler(
                SchedulerError::JobNotFound { .. }
                | SchedulerError::JobLogNotFound { .. }
                | SchedulerError::JobGroupNotFound { .. },
            ) => StatusCode::NOT_FOUND,
            ApiError::Scheduler(
                SchedulerError::InvalidCron { .. }
                | SchedulerError::InvalidSchedule(_)
                | SchedulerError::InvalidArgument(_),
            )
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 错误统一以失败的 `ReturnT` 响应体返回
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let msg = match &self {
            ApiError::Unauthorized => "The access token is wrong.".to_string(),
            other => other.to_string(),
        };
        (status, Json(ReturnT::<String>::fail(msg))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(SchedulerError::JobNotFound { id: 1 }).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SchedulerError::InvalidSchedule("x".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SchedulerError::Internal("x".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
