use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::cache::RateLimitScope;
use crate::utils::{error_codes, error_to_api_response};

/// 业务错误，在请求边界统一转换为响应，不会导致进程退出
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(RateLimitScope),

    #[error("username already taken")]
    DuplicateUsername,

    #[error("email already registered")]
    EmailAlreadyRegistered,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid verification code")]
    InvalidVerificationCode,

    /// 不存在与无权限返回同一个错误，避免泄露文章是否存在
    #[error("not found or forbidden")]
    NotFoundOrForbidden,

    #[error("unauthorized")]
    Unauthorized,

    #[error("upstream failure: {0}")]
    Upstream(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::RateLimitExceeded(_) => error_codes::RATE_LIMIT,
            AppError::DuplicateUsername => error_codes::USER_EXISTS,
            AppError::EmailAlreadyRegistered => error_codes::EMAIL_EXISTS,
            AppError::InvalidCredentials => error_codes::AUTH_FAILED,
            AppError::InvalidVerificationCode => error_codes::VERIFY_CODE,
            AppError::NotFoundOrForbidden => error_codes::NOT_FOUND,
            AppError::Unauthorized => error_codes::UNAUTHORIZED,
            AppError::Upstream(_) => error_codes::INTERNAL_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::RateLimitExceeded(scope) => scope.message().to_string(),
            AppError::DuplicateUsername => "用户名已被使用".to_string(),
            AppError::EmailAlreadyRegistered => "邮箱已被注册".to_string(),
            AppError::InvalidCredentials => "用户名或密码错误".to_string(),
            AppError::InvalidVerificationCode => "验证码错误或已过期".to_string(),
            AppError::NotFoundOrForbidden => "文章不存在或无权操作".to_string(),
            AppError::Unauthorized => "未登录或登录已过期".to_string(),
            AppError::Upstream(_) => "服务暂时不可用，请稍后重试".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Upstream(detail) => {
                tracing::error!("upstream failure: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::OK,
        };

        (status, error_to_api_response::<()>(self.code(), self.message())).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Upstream(format!("cache: {}", e))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return match db.constraint() {
                    Some(c) if c.contains("email") => AppError::EmailAlreadyRegistered,
                    Some(c) if c.contains("username") => AppError::DuplicateUsername,
                    _ => AppError::Upstream(format!("database: {}", e)),
                };
            }
        }
        AppError::Upstream(format!("database: {}", e))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Upstream(format!("search index: {}", e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Upstream(format!("serialization: {}", e))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AppError::Upstream("external call timed out".to_string())
    }
}
