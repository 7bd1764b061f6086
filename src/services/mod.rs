//! 业务服务，由路由处理函数调用

pub mod article;
pub mod auth;
pub mod register;
pub mod verification;

pub use article::{ArticleForm, ArticleService, ArticleView, check_page};
pub use auth::{CurrentUser, LoginForm, SESSION_COOKIE, Session, SessionManager};
pub use register::{RegisterForm, RegistrationService};
pub use verification::VerificationCodeService;
