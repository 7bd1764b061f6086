use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{FromRequestParts, OptionalFromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{AppState, error::AppError, services::CurrentUser};

/// 解析请求身份并放入请求扩展，不拒绝匿名请求
///
/// 会话中没有用户时尝试用记住我 cookie 恢复，恢复出的新会话通过响应下发。
pub async fn resolve_identity(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (jar, current) = state.sessions.identify(jar).await?;
    if let Some(current) = current {
        tracing::debug!("Request from user {}", current.user.username);
        req.extensions_mut().insert(current);
    }
    Ok((jar, next.run(req).await).into_response())
}

/// 需要登录的处理函数直接以 `CurrentUser` 为参数，未登录时返回 401
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned())
    }
}
