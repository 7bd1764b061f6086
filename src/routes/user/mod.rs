mod handler;
mod model;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use handler::{captcha, login, logout, me, register, send_email_code, verify_username};
pub use model::UserResponse;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/captcha", get(captcha))
        .route("/users/email-code", post(send_email_code))
        .route("/users/verify-username", get(verify_username))
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/me", get(me))
}
