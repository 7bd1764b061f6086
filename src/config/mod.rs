use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    /// 记住我令牌的 md5 盐
    pub server_secret: String,
    pub register_ip_email_count: u64,
    pub register_day_email_count: u64,
    pub register_day_user_count: u64,
    pub article_day_count: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u64,
    pub session_ttl_secs: u64,
    pub remember_ttl_secs: u64,
    pub email_code_ttl_secs: u64,
    pub heat_ttl_secs: u64,
    pub cache_timeout_ms: u64,
    pub mail_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub index_timeout_ms: u64,
    pub smtp_url: Option<String>,
    pub mail_from: String,
    pub search_url: Option<String>,
    pub search_index: String,
    pub event_stream: String,
}

/// 可选配置项，缺失或无法解析时使用默认值
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_secret: env::var("SERVER_SECRET")?,
            server_host: env_or("SERVER_HOST", "::".to_string()),
            server_port: env_or("SERVER_PORT", 3000),
            api_base_uri: env_or("API_BASE_URI", "/api".to_string()),
            register_ip_email_count: env_or("REGISTER_IP_EMAIL_COUNT", 5),
            register_day_email_count: env_or("REGISTER_DAY_EMAIL_COUNT", 200),
            register_day_user_count: env_or("REGISTER_DAY_USER_COUNT", 100),
            article_day_count: env_or("ARTICLE_DAY_COUNT", 20),
            rate_limit_window_secs: env_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: env_or("RATE_LIMIT_REQUESTS", 100),
            session_ttl_secs: env_or("SESSION_TTL", 60 * 60),
            remember_ttl_secs: env_or("REMEMBER_TTL", 7 * 24 * 60 * 60),
            email_code_ttl_secs: env_or("EMAIL_CODE_TTL", 5 * 60),
            heat_ttl_secs: env_or("HEAT_TTL", 7 * 24 * 60 * 60),
            cache_timeout_ms: env_or("CACHE_TIMEOUT_MS", 500),
            mail_timeout_ms: env_or("MAIL_TIMEOUT_MS", 5000),
            publish_timeout_ms: env_or("PUBLISH_TIMEOUT_MS", 1000),
            index_timeout_ms: env_or("INDEX_TIMEOUT_MS", 3000),
            smtp_url: env_opt("SMTP_URL"),
            mail_from: env_or("MAIL_FROM", "noreply@langhai.cc".to_string()),
            search_url: env_opt("SEARCH_URL"),
            search_index: env_or("SEARCH_INDEX", "blogs".to_string()),
            event_stream: env_or("EVENT_STREAM", "blogs:events".to_string()),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn remember_ttl(&self) -> Duration {
        Duration::from_secs(self.remember_ttl_secs)
    }

    pub fn email_code_ttl(&self) -> Duration {
        Duration::from_secs(self.email_code_ttl_secs)
    }

    pub fn heat_ttl(&self) -> Duration {
        Duration::from_secs(self.heat_ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn mail_timeout(&self) -> Duration {
        Duration::from_millis(self.mail_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }
}
