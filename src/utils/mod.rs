use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::result::ApiResponse;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

/// 记住我秘钥：uuid + md5(用户名 + 服务端秘钥)
pub fn generate_remember_cipher(username: &str, secret: &str) -> String {
    let digest = md5::compute(format!("{}{}", username, secret));
    format!("{}{:x}", Uuid::new_v4(), digest)
}

/// 六位数字邮箱验证码
pub fn generate_email_code() -> String {
    let mut rng = rand::rng();
    (0..6).map(|_| rng.random_range(0..10).to_string()).collect()
}

const CAPTCHA_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// 四位登录图形验证码
pub fn generate_captcha_code() -> String {
    let mut rng = rand::rng();
    (0..4)
        .map(|_| CAPTCHA_CHARSET[rng.random_range(0..CAPTCHA_CHARSET.len())] as char)
        .collect()
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 当天日期 yyyy-MM-dd
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const EMAIL_EXISTS: i32 = 1006;
    pub const VERIFY_CODE: i32 = 1007;
    pub const UNAUTHORIZED: i32 = 1008;
    pub const INTERNAL_ERROR: i32 = 5000;
}
