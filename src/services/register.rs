use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::auth::{CurrentUser, SessionManager};
use super::verification::{VerificationCodeService, valid_email};
use crate::cache::{RateLimitScope, RateLimiter, SessionUser};
use crate::config::Config;
use crate::database::{NewUser, UserStore};
use crate::error::{AppError, AppResult};
use crate::utils::{hash_password, today};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub nickname: String,
    pub email: String,
    /// 邮箱验证码
    pub code: String,
}

fn check_username(username: &str) -> AppResult<()> {
    if username.is_empty() {
        return Err(AppError::validation("用户名不能为空"));
    }
    let len = username.chars().count();
    if !(3..=8).contains(&len) || !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::validation("用户名须为 3 到 8 位字母或数字"));
    }
    Ok(())
}

impl RegisterForm {
    fn validate(&self) -> AppResult<()> {
        check_username(self.username.trim())?;

        let password_len = self.password.chars().count();
        if password_len == 0 {
            return Err(AppError::validation("密码不能为空"));
        }
        if !(6..=18).contains(&password_len) {
            return Err(AppError::validation("密码长度须为 6 到 18 位"));
        }

        let nickname_len = self.nickname.trim().chars().count();
        if !(1..=12).contains(&nickname_len) {
            return Err(AppError::validation("昵称长度须为 1 到 12 个字符"));
        }

        if !valid_email(self.email.trim()) {
            return Err(AppError::validation("邮箱地址格式不正确"));
        }
        if self.code.trim().is_empty() {
            return Err(AppError::validation("验证码不能为空"));
        }
        Ok(())
    }
}

/// 用户注册
#[derive(Clone)]
pub struct RegistrationService {
    users: Arc<dyn UserStore>,
    codes: VerificationCodeService,
    limiter: RateLimiter,
    sessions: SessionManager,
    config: Arc<Config>,
}

impl RegistrationService {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: VerificationCodeService,
        limiter: RateLimiter,
        sessions: SessionManager,
        config: Arc<Config>,
    ) -> Self {
        Self {
            users,
            codes,
            limiter,
            sessions,
            config,
        }
    }

    /// 用户名是否可用
    pub async fn verify_username(&self, username: &str) -> AppResult<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::validation("用户名不能为空"));
        }
        if self.users.find_by_username(username).await?.is_some() {
            return Err(AppError::DuplicateUsername);
        }
        Ok(())
    }

    /// 注册并直接登录
    ///
    /// 用户名重复由存储层的唯一约束裁决，并发注册同名账号时后提交的一方失败。
    pub async fn register(&self, jar: CookieJar, form: RegisterForm) -> AppResult<(CookieJar, CurrentUser)> {
        form.validate()?;
        let email = form.email.trim();

        if !self.codes.validate(email, &form.code).await? {
            return Err(AppError::InvalidVerificationCode);
        }

        self.limiter
            .admit(
                RateLimitScope::Registration,
                &today(),
                DAY,
                self.config.register_day_user_count,
            )
            .await?;

        let password_hash = hash_password(&form.password)
            .map_err(|e| AppError::Upstream(format!("bcrypt: {}", e)))?;
        let user = self
            .users
            .create(NewUser {
                username: form.username.trim().to_string(),
                password_hash,
                nickname: form.nickname.trim().to_string(),
                email: email.to_string(),
            })
            .await?;

        self.sessions
            .bind(
                jar,
                SessionUser {
                    id: user.id,
                    username: user.username,
                    nickname: user.nickname,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, RememberTokenStore, SessionStore, VerificationCodeStore};
    use crate::test_utils::{MemoryUserStore, RecordingMailSender, test_config};

    struct Fixture {
        service: RegistrationService,
        codes: VerificationCodeService,
        sessions: SessionManager,
        mail: RecordingMailSender,
        users: Arc<MemoryUserStore>,
    }

    fn fixture_with(config: Config) -> Fixture {
        let config = Arc::new(config);
        let cache = Arc::new(MemoryCache::new());
        let users = Arc::new(MemoryUserStore::new());
        let mail = RecordingMailSender::default();
        let limiter = RateLimiter::new(cache.clone());
        let codes = VerificationCodeService::new(
            users.clone(),
            VerificationCodeStore::new(cache.clone(), config.email_code_ttl()),
            limiter.clone(),
            Arc::new(mail.clone()),
            config.clone(),
        );
        let sessions = SessionManager::new(
            users.clone(),
            SessionStore::new(cache.clone(), config.session_ttl()),
            RememberTokenStore::new(cache, config.remember_ttl()),
            config.server_secret.clone(),
        );
        let service = RegistrationService::new(
            users.clone(),
            codes.clone(),
            limiter,
            sessions.clone(),
            config,
        );
        Fixture {
            service,
            codes,
            sessions,
            mail,
            users,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(test_config())
    }

    async fn form_for(f: &Fixture, username: &str, email: &str) -> RegisterForm {
        f.codes.issue(email, "1.2.3.4").await.unwrap();
        RegisterForm {
            username: username.into(),
            password: "secret1".into(),
            nickname: "Nick".into(),
            email: email.into(),
            code: f.mail.last_code(email).unwrap(),
        }
    }

    #[tokio::test]
    async fn registration_logs_the_user_in() {
        let f = fixture();
        let form = form_for(&f, "alice", "alice@b.cn").await;

        let (jar, current) = f.service.register(CookieJar::new(), form).await.unwrap();
        assert_eq!(current.user.username, "alice");
        assert_eq!(f.users.count(), 1);

        let (_, identity) = f.sessions.identify(jar).await.unwrap();
        assert_eq!(identity.unwrap().user.username, "alice");
    }

    #[tokio::test(start_paused = true)]
    async fn registered_session_expires_after_an_idle_hour() {
        let f = fixture();
        let form = form_for(&f, "alice", "alice@b.cn").await;
        let (jar, _) = f.service.register(CookieJar::new(), form).await.unwrap();

        // 59 分钟内访问一次，空闲计时重新开始
        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        let (jar, identity) = f.sessions.identify(jar).await.unwrap();
        assert_eq!(identity.unwrap().user.username, "alice");

        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        let (jar, identity) = f.sessions.identify(jar).await.unwrap();
        assert!(identity.is_some());

        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        let (_, identity) = f.sessions.identify(jar).await.unwrap();
        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn username_length_is_checked() {
        let f = fixture();
        let valid = form_for(&f, "x", "x@b.cn").await;
        for username in ["ab", "abcdefghi", "ab_cd", ""] {
            let mut form = valid.clone();
            form.username = username.into();
            assert!(matches!(
                f.service.register(CookieJar::new(), form).await,
                Err(AppError::Validation(_))
            ));
        }
        assert_eq!(f.users.count(), 0);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let f = fixture();
        let first = form_for(&f, "alice", "one@b.cn").await;
        let (_jar, _) = f.service.register(CookieJar::new(), first).await.unwrap();

        let second = form_for(&f, "alice", "two@b.cn").await;
        assert!(matches!(
            f.service.register(CookieJar::new(), second).await,
            Err(AppError::DuplicateUsername)
        ));
        assert_eq!(f.users.count(), 1);
        assert!(matches!(
            f.service.verify_username("alice").await,
            Err(AppError::DuplicateUsername)
        ));
        assert!(f.service.verify_username("bobby").await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_same_username_registers_once() {
        let f = fixture();
        let a = form_for(&f, "carol", "c1@b.cn").await;
        let b = form_for(&f, "carol", "c2@b.cn").await;

        let (ra, rb) = tokio::join!(
            f.service.register(CookieJar::new(), a),
            f.service.register(CookieJar::new(), b)
        );
        assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
        assert_eq!(f.users.count(), 1);
    }

    #[tokio::test]
    async fn wrong_email_code_is_rejected() {
        let f = fixture();
        let mut form = form_for(&f, "dave", "dave@b.cn").await;
        form.code = "abcdef".into();

        assert!(matches!(
            f.service.register(CookieJar::new(), form).await,
            Err(AppError::InvalidVerificationCode)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_email_code_is_rejected() {
        let f = fixture();
        let form = form_for(&f, "erin", "erin@b.cn").await;
        tokio::time::advance(Duration::from_secs(5 * 60)).await;

        assert!(matches!(
            f.service.register(CookieJar::new(), form).await,
            Err(AppError::InvalidVerificationCode)
        ));
    }

    #[tokio::test]
    async fn daily_registration_cap_applies() {
        let f = fixture_with(Config {
            register_day_user_count: 1,
            ..test_config()
        });
        let first = form_for(&f, "frank", "f1@b.cn").await;
        let (_jar, _) = f.service.register(CookieJar::new(), first).await.unwrap();

        let second = form_for(&f, "grace", "g1@b.cn").await;
        assert!(matches!(
            f.service.register(CookieJar::new(), second).await,
            Err(AppError::RateLimitExceeded(RateLimitScope::Registration))
        ));
    }
}
