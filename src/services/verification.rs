use std::sync::Arc;

use crate::cache::{RateLimitScope, RateLimiter, VerificationCodeStore};
use crate::config::Config;
use crate::database::UserStore;
use crate::error::{AppError, AppResult};
use crate::mail::MailSender;
use crate::utils::{generate_email_code, today};

const DAY: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// 邮箱格式的基本校验：恰好一个 @，两侧非空
pub fn valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    ) && !email.chars().any(char::is_whitespace)
}

/// 注册邮箱验证码服务
#[derive(Clone)]
pub struct VerificationCodeService {
    users: Arc<dyn UserStore>,
    codes: VerificationCodeStore,
    limiter: RateLimiter,
    mail: Arc<dyn MailSender>,
    config: Arc<Config>,
}

impl VerificationCodeService {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: VerificationCodeStore,
        limiter: RateLimiter,
        mail: Arc<dyn MailSender>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            users,
            codes,
            limiter,
            mail,
            config,
        }
    }

    /// 发送注册验证码
    ///
    /// 先过单 IP 与全站两个每日限额，再检查邮箱是否已注册。
    /// 邮件发送失败时不保存验证码。
    pub async fn issue(&self, email: &str, client_ip: &str) -> AppResult<String> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::validation("邮箱不能为空"));
        }
        if !valid_email(email) {
            return Err(AppError::validation("邮箱地址格式不正确"));
        }

        self.limiter
            .admit(
                RateLimitScope::EmailSendIp,
                client_ip,
                DAY,
                self.config.register_ip_email_count,
            )
            .await?;
        self.limiter
            .admit(
                RateLimitScope::EmailSendDay,
                &today(),
                DAY,
                self.config.register_day_email_count,
            )
            .await?;

        if self.users.email_registered(email).await? {
            return Err(AppError::EmailAlreadyRegistered);
        }

        let code = generate_email_code();
        tokio::time::timeout(self.config.mail_timeout(), self.mail.send_code(email, &code))
            .await??;
        self.codes.put(email, &code).await?;

        tracing::info!("Sent register code to {} for {}", email, client_ip);
        Ok(code)
    }

    /// 精确匹配，过期或不存在返回 false
    pub async fn validate(&self, email: &str, submitted: &str) -> AppResult<bool> {
        self.codes.matches(email.trim(), submitted).await
    }
}
