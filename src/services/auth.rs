use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;

use crate::cache::{RememberTokenStore, SessionState, SessionStore, SessionUser, keys};
use crate::database::{UserEntity, UserStore};
use crate::error::{AppError, AppResult};
use crate::utils::{generate_captcha_code, generate_remember_cipher, verify_password};

/// 会话 id 所在的 cookie
pub const SESSION_COOKIE: &str = "SESSION";

/// 已加载的服务端会话
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
}

/// 当前请求的登录身份，由认证中间件放入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub session_id: String,
    pub user: SessionUser,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// 图形验证码
    pub code: String,
    #[serde(default)]
    pub remember: bool,
}

/// 会话与记住我令牌管理
///
/// 客户端只持有会话 id；用户身份保存在服务端会话中，空闲一小时后由缓存过期。
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    sessions: SessionStore,
    tokens: RememberTokenStore,
    secret: String,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionStore,
        tokens: RememberTokenStore,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            secret: secret.into(),
        }
    }

    fn session_cookie(id: &str) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, id.to_string()))
            .path("/")
            .http_only(true)
            .build()
    }

    /// 按 SESSION cookie 读取会话，同时刷新空闲过期时间
    pub async fn load(&self, jar: &CookieJar) -> AppResult<Option<Session>> {
        let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Ok(None);
        };
        Ok(self
            .sessions
            .load(&id)
            .await?
            .map(|state| Session { id, state }))
    }

    /// 读取会话，不存在时新建匿名会话并写入 cookie
    async fn load_or_create(&self, jar: CookieJar) -> AppResult<(CookieJar, Session)> {
        if let Some(session) = self.load(&jar).await? {
            return Ok((jar, session));
        }
        let state = SessionState::default();
        let id = self.sessions.create(&state).await?;
        Ok((jar.add(Self::session_cookie(&id)), Session { id, state }))
    }

    /// 生成登录图形验证码并绑定到当前会话
    pub async fn issue_captcha(&self, jar: CookieJar) -> AppResult<(CookieJar, String)> {
        let (jar, mut session) = self.load_or_create(jar).await?;
        let code = generate_captcha_code();
        session.state.verify_code = Some(code.clone());
        self.sessions.save(&session.id, &session.state).await?;
        Ok((jar, code))
    }

    /// 把用户绑定到当前会话，没有会话时新建
    pub async fn bind(&self, jar: CookieJar, user: SessionUser) -> AppResult<(CookieJar, CurrentUser)> {
        let (jar, mut session) = self.load_or_create(jar).await?;
        session.state.user = Some(user.clone());
        self.sessions.save(&session.id, &session.state).await?;
        Ok((
            jar,
            CurrentUser {
                session_id: session.id,
                user,
            },
        ))
    }

    /// 登录：先校验用户名密码，再校验会话中的图形验证码（不区分大小写）
    pub async fn login(&self, jar: CookieJar, form: LoginForm) -> AppResult<(CookieJar, CurrentUser)> {
        let username = form.username.trim();
        if username.is_empty() || form.password.is_empty() {
            return Err(AppError::validation("用户名和密码不能为空"));
        }
        if form.code.trim().is_empty() {
            return Err(AppError::validation("验证码不能为空"));
        }

        let session = self.load(&jar).await?;
        let checked = self.check_login(username, &form, session.as_ref()).await;

        // 验证码一次有效，登录失败同样作废
        if let Some(mut session) = session {
            if session.state.verify_code.take().is_some() {
                self.sessions.save(&session.id, &session.state).await?;
            }
        }
        let user = checked?;

        let (mut jar, current) = self
            .bind(
                jar,
                SessionUser {
                    id: user.id,
                    username: user.username.clone(),
                    nickname: user.nickname.clone(),
                },
            )
            .await?;

        if form.remember {
            jar = jar.add(self.issue_remember_token(&user.username).await?);
        }
        tracing::info!("User {} logged in", user.username);
        Ok((jar, current))
    }

    async fn check_login(
        &self,
        username: &str,
        form: &LoginForm,
        session: Option<&Session>,
    ) -> AppResult<UserEntity> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AppError::InvalidCredentials)?;
        let password_ok = verify_password(&form.password, &user.password_hash)
            .map_err(|e| AppError::Upstream(format!("bcrypt: {}", e)))?;
        if !password_ok {
            tracing::debug!("Wrong password for {}", username);
            return Err(AppError::InvalidCredentials);
        }

        match session.and_then(|s| s.state.verify_code.as_deref()) {
            Some(code) if code.eq_ignore_ascii_case(form.code.trim()) => Ok(user),
            _ => Err(AppError::InvalidVerificationCode),
        }
    }

    /// 生成记住我令牌：服务端缓存一份，返回需要下发给客户端的 cookie
    pub async fn issue_remember_token(&self, username: &str) -> AppResult<Cookie<'static>> {
        let token = generate_remember_cipher(username, &self.secret);
        self.tokens.store(username, &token).await?;

        Ok(Cookie::build((keys::remember_key(username), token))
            .path("/")
            .http_only(true)
            .max_age(time::Duration::seconds(self.tokens.ttl().as_secs() as i64))
            .build())
    }

    /// 用记住我 cookie 恢复登录
    ///
    /// 已经登录的会话原样返回；否则按 cookie 顺序逐个比对，第一个与缓存
    /// 完全一致的令牌生效，不匹配的 cookie 直接跳过。
    pub async fn resume_from_remember_token(
        &self,
        jar: &CookieJar,
        session: Option<Session>,
    ) -> AppResult<Option<Session>> {
        if let Some(session) = &session {
            if session.state.user.is_some() {
                return Ok(Some(session.clone()));
            }
        }

        for cookie in jar.iter() {
            let Some(username) = cookie.name().strip_prefix(keys::REMEMBER_PREFIX) else {
                continue;
            };
            if username.is_empty() || cookie.value().is_empty() {
                continue;
            }
            if !self.tokens.matches(username, cookie.value()).await? {
                tracing::debug!("Ignoring stale remember cookie for {}", username);
                continue;
            }
            let Some(user) = self.users.find_by_username(username).await? else {
                continue;
            };

            let mut session = session.unwrap_or(Session {
                id: String::new(),
                state: SessionState::default(),
            });
            session.state.user = Some(SessionUser {
                id: user.id,
                username: user.username,
                nickname: user.nickname,
            });
            if session.id.is_empty() {
                session.id = self.sessions.create(&session.state).await?;
            } else {
                self.sessions.save(&session.id, &session.state).await?;
            }
            tracing::info!("Resumed session for {} from remember token", username);
            return Ok(Some(session));
        }

        Ok(None)
    }

    /// 解析请求身份：会话中的用户优先，其次是记住我 cookie
    ///
    /// 恢复时新建了会话的，返回的 jar 中带有新的 SESSION cookie。
    pub async fn identify(&self, jar: CookieJar) -> AppResult<(CookieJar, Option<CurrentUser>)> {
        let session = self.load(&jar).await?;
        let previous_id = session.as_ref().map(|s| s.id.clone());

        let Some(session) = self.resume_from_remember_token(&jar, session).await? else {
            return Ok((jar, None));
        };
        let Some(user) = session.state.user else {
            return Ok((jar, None));
        };

        let jar = if previous_id.as_deref() == Some(session.id.as_str()) {
            jar
        } else {
            jar.add(Self::session_cookie(&session.id))
        };
        Ok((
            jar,
            Some(CurrentUser {
                session_id: session.id,
                user,
            }),
        ))
    }

    /// 退出登录：解除会话中的用户，返回清空记住我 cookie 的墓碑 cookie
    ///
    /// 服务端缓存的记住我令牌保留到自身过期。
    pub async fn logout(&self, current: &CurrentUser) -> AppResult<Cookie<'static>> {
        if let Some(mut state) = self.sessions.load(&current.session_id).await? {
            state.user = None;
            self.sessions.save(&current.session_id, &state).await?;
        }
        tracing::info!("User {} logged out", current.user.username);

        Ok(Cookie::build((keys::remember_key(&current.user.username), ""))
            .path("/")
            .max_age(time::Duration::ZERO)
            .build())
    }
}
