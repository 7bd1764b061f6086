//! 邮件发送
//!
//! 配置了 SMTP_URL 时通过 lettre 发送，否则只把验证码写入日志（本地开发用）。

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
};

use crate::error::{AppError, AppResult};

/// 邮件发送接口，只用于注册验证码
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_code(&self, to: &str, code: &str) -> AppResult<()>;
}

/// SMTP 发送实现
pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailSender {
    pub fn new(smtp_url: &str, from: &str) -> AppResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::from_url(smtp_url)
            .map_err(|e| AppError::Upstream(format!("smtp: {}", e)))?
            .build();
        let from = from
            .parse()
            .map_err(|e| AppError::Upstream(format!("invalid MAIL_FROM: {}", e)))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send_code(&self, to: &str, code: &str) -> AppResult<()> {
        let to: Mailbox = to
            .parse()
            .map_err(|_| AppError::validation("邮箱地址格式不正确"))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("注册验证码")
            .header(ContentType::TEXT_PLAIN)
            .body(format!("您的注册验证码是：{}\n\n验证码 5 分钟内有效。", code))
            .map_err(|e| AppError::Upstream(format!("mail build: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::Upstream(format!("smtp: {}", e)))?;

        Ok(())
    }
}

/// 只记录日志的发送实现
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send_code(&self, to: &str, code: &str) -> AppResult<()> {
        tracing::warn!("SMTP not configured, verification code for {}: {}", to, code);
        Ok(())
    }
}
