use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::error::{AppError, AppResult};

/// 限流维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// 单个 IP 每天发送注册邮件次数
    EmailSendIp,
    /// 全站每天发送注册邮件次数
    EmailSendDay,
    /// 全站每天注册账号次数
    Registration,
    /// 单个用户每天发表文章次数
    ArticleIssue,
    /// 单个 IP 的请求频率
    Request,
}

impl RateLimitScope {
    fn key_prefix(&self) -> &'static str {
        match self {
            RateLimitScope::EmailSendIp => "email:register:ip:",
            RateLimitScope::EmailSendDay => "email:register:day:",
            RateLimitScope::Registration => "user:register:",
            RateLimitScope::ArticleIssue => "article:issue:",
            RateLimitScope::Request => "rate_limit:",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RateLimitScope::EmailSendIp => "当前 IP 今日发送邮件次数已达上限",
            RateLimitScope::EmailSendDay => "今日发送邮件次数已达上限，请明天再试",
            RateLimitScope::Registration => "今日注册人数已达上限，请明天再试",
            RateLimitScope::ArticleIssue => "今日发表文章次数已达上限",
            RateLimitScope::Request => "请求过于频繁，请稍后重试",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RateLimitScope::EmailSendIp => "email-send/ip",
            RateLimitScope::EmailSendDay => "email-send/day",
            RateLimitScope::Registration => "registration/day",
            RateLimitScope::ArticleIssue => "article-issue/day",
            RateLimitScope::Request => "request/ip",
        };
        f.write_str(name)
    }
}

/// 固定窗口准入限流
///
/// 被拒绝的请求不计数，计数停在上限，窗口到期后由 TTL 自动清零。
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn CacheStore>,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub async fn check_and_increment(
        &self,
        scope: RateLimitScope,
        key: &str,
        window: Duration,
        ceiling: u64,
    ) -> AppResult<bool> {
        let cache_key = format!("{}{}", scope.key_prefix(), key);
        let admitted = self.cache.incr_capped(&cache_key, window, ceiling).await?;
        if admitted.is_none() {
            tracing::info!("Rate limit hit: scope={} key={}", scope, key);
        }
        Ok(admitted.is_some())
    }

    /// 同 check_and_increment，超限时返回 RateLimitExceeded
    pub async fn admit(
        &self,
        scope: RateLimitScope,
        key: &str,
        window: Duration,
        ceiling: u64,
    ) -> AppResult<()> {
        if self.check_and_increment(scope, key, window, ceiling).await? {
            Ok(())
        } else {
            Err(AppError::RateLimitExceeded(scope))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, MockCacheStore};
    use futures_util::future::join_all;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn exactly_ceiling_calls_are_admitted() {
        let limiter = limiter();
        for _ in 0..3 {
            assert!(
                limiter
                    .check_and_increment(RateLimitScope::EmailSendIp, "1.2.3.4", DAY, 3)
                    .await
                    .unwrap()
            );
        }
        let err = limiter
            .admit(RateLimitScope::EmailSendIp, "1.2.3.4", DAY, 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::RateLimitExceeded(RateLimitScope::EmailSendIp)
        ));
    }

    #[tokio::test]
    async fn zero_ceiling_rejects_everything() {
        assert!(
            !limiter()
                .check_and_increment(RateLimitScope::Registration, "2026-01-01", DAY, 0)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn scopes_and_keys_are_independent() {
        let limiter = limiter();
        limiter
            .admit(RateLimitScope::EmailSendIp, "1.2.3.4", DAY, 1)
            .await
            .unwrap();
        limiter
            .admit(RateLimitScope::EmailSendIp, "5.6.7.8", DAY, 1)
            .await
            .unwrap();
        limiter
            .admit(RateLimitScope::Registration, "1.2.3.4", DAY, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ip_named_like_a_date_keeps_its_own_counter() {
        let limiter = limiter();
        limiter
            .admit(RateLimitScope::EmailSendIp, "2026-10-18", DAY, 1)
            .await
            .unwrap();
        limiter
            .admit(RateLimitScope::EmailSendDay, "2026-10-18", DAY, 1)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_over_admit() {
        let limiter = limiter();
        let attempts = (0..64).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .check_and_increment(RateLimitScope::EmailSendDay, "2026-10-18", DAY, 10)
                    .await
                    .unwrap()
            })
        });

        let admitted = join_all(attempts)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(admitted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_resets_the_counter() {
        let limiter = limiter();
        let window = Duration::from_secs(60);
        limiter
            .admit(RateLimitScope::Request, "ip", window, 1)
            .await
            .unwrap();
        assert!(
            limiter
                .admit(RateLimitScope::Request, "ip", window, 1)
                .await
                .is_err()
        );

        tokio::time::advance(window).await;
        limiter
            .admit(RateLimitScope::Request, "ip", window, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cache_failure_surfaces_as_upstream() {
        let mut cache = MockCacheStore::new();
        cache
            .expect_incr_capped()
            .returning(|_, _, _| Err(AppError::Upstream("down".into())));

        let limiter = RateLimiter::new(Arc::new(cache));
        assert!(matches!(
            limiter
                .admit(RateLimitScope::EmailSendIp, "ip", DAY, 5)
                .await,
            Err(AppError::Upstream(_))
        ));
    }
}
