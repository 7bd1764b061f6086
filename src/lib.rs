use std::sync::Arc;

use cache::{
    CacheStore, HeatCounter, RateLimiter, RememberTokenStore, SessionStore, VerificationCodeStore,
};
use config::Config;
use database::{ArticleStore, UserStore};
use mail::MailSender;
use publish::{ArticlePublisher, EventPublisher};
use search::SearchIndex;
use services::{ArticleService, RegistrationService, SessionManager, VerificationCodeService};

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod mail;
pub mod middleware;
pub mod publish;
pub mod result;
pub mod routes;
pub mod search;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_utils;

/// 组装应用状态所需的外部依赖
pub struct Collaborators {
    pub cache: Arc<dyn CacheStore>,
    pub users: Arc<dyn UserStore>,
    pub articles: Arc<dyn ArticleStore>,
    pub index: Arc<dyn SearchIndex>,
    pub mail: Arc<dyn MailSender>,
    pub publisher: Arc<dyn EventPublisher>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: RateLimiter,
    pub sessions: SessionManager,
    pub verification: VerificationCodeService,
    pub registration: RegistrationService,
    pub articles: ArticleService,
}

impl AppState {
    pub fn new(config: Config, deps: Collaborators) -> Self {
        let config = Arc::new(config);
        let limiter = RateLimiter::new(deps.cache.clone());

        let sessions = SessionManager::new(
            deps.users.clone(),
            SessionStore::new(deps.cache.clone(), config.session_ttl()),
            RememberTokenStore::new(deps.cache.clone(), config.remember_ttl()),
            config.server_secret.clone(),
        );
        let verification = VerificationCodeService::new(
            deps.users.clone(),
            VerificationCodeStore::new(deps.cache.clone(), config.email_code_ttl()),
            limiter.clone(),
            deps.mail,
            config.clone(),
        );
        let registration = RegistrationService::new(
            deps.users,
            verification.clone(),
            limiter.clone(),
            sessions.clone(),
            config.clone(),
        );
        let articles = ArticleService::new(
            deps.articles,
            deps.index,
            HeatCounter::new(deps.cache, config.heat_ttl()),
            ArticlePublisher::new(deps.publisher, config.publish_timeout()),
            config.clone(),
        );

        Self {
            config,
            limiter,
            sessions,
            verification,
            registration,
            articles,
        }
    }
}
