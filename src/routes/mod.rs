pub mod article;
pub mod user;

use axum::Router;

use crate::{
    AppState,
    middleware::{log_errors, rate_limit, resolve_identity},
};

/// 组装全部路由与中间件
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(user::routes())
        .merge(article::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resolve_identity,
        ));

    Router::new()
        .nest(&state.config.api_base_uri, api)
        .layer(axum::middleware::from_fn(log_errors))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
}
