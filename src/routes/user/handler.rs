use axum::{
    extract::{Json, Query, State},
    http::header,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use rand::Rng;

use crate::{
    AppState,
    error::AppResult,
    middleware::ClientIp,
    services::{CurrentUser, LoginForm, RegisterForm},
    utils::success_to_api_response,
};

use super::model::{EmailCodeRequest, UserResponse, UsernameQuery};

/// 把验证码画成带干扰线的 SVG
fn captcha_svg(code: &str) -> String {
    let mut rng = rand::rng();
    let mut svg = String::from(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="40" viewBox="0 0 100 40"><rect width="100%" height="100%" fill="#f2f2f2"/>"##,
    );

    for _ in 0..4 {
        svg.push_str(&format!(
            r##"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="#9a9a9a" stroke-width="1"/>"##,
            rng.random_range(0..100),
            rng.random_range(0..40),
            rng.random_range(0..100),
            rng.random_range(0..40),
        ));
    }
    for (i, c) in code.chars().enumerate() {
        let x = 10 + i * 22;
        let y = rng.random_range(26..34);
        let angle = rng.random_range(-20..=20);
        svg.push_str(&format!(
            r##"<text x="{x}" y="{y}" font-size="24" font-family="monospace" fill="#333333" transform="rotate({angle} {x} {y})">{c}</text>"##
        ));
    }
    svg.push_str("</svg>");
    svg
}

#[axum::debug_handler]
pub async fn captcha(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let (jar, code) = state.sessions.issue_captcha(jar).await?;
    Ok((
        jar,
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        captcha_svg(&code),
    ))
}

#[axum::debug_handler]
pub async fn send_email_code(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<EmailCodeRequest>,
) -> AppResult<impl IntoResponse> {
    state.verification.issue(&req.email, &ip).await?;
    Ok(success_to_api_response("验证码已发送，5 分钟内有效"))
}

#[axum::debug_handler]
pub async fn verify_username(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> AppResult<impl IntoResponse> {
    state.registration.verify_username(&query.username).await?;
    Ok(success_to_api_response("用户名可以使用"))
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<RegisterForm>,
) -> AppResult<impl IntoResponse> {
    let (jar, current) = state.registration.register(jar, form).await?;
    Ok((jar, success_to_api_response(UserResponse::from(current.user))))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<LoginForm>,
) -> AppResult<impl IntoResponse> {
    let (jar, current) = state.sessions.login(jar, form).await?;
    Ok((jar, success_to_api_response(UserResponse::from(current.user))))
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let tombstone = state.sessions.logout(&current).await?;
    Ok((jar.add(tombstone), success_to_api_response("已退出登录")))
}

#[axum::debug_handler]
pub async fn me(current: CurrentUser) -> impl IntoResponse {
    success_to_api_response(UserResponse::from(current.user))
}
