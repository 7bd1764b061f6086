/// 缓存操作
/// 在 CacheStore 之上实现各类业务计数与会话数据

pub mod heat;
pub mod rate_limit;
pub mod session;
pub mod token;
pub mod verification;

pub use heat::HeatCounter;
pub use rate_limit::{RateLimitScope, RateLimiter};
pub use session::{SessionState, SessionStore, SessionUser};
pub use token::RememberTokenStore;
pub use verification::VerificationCodeStore;
