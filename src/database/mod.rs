// 数据库模块
// 包含数据库实体定义和存储库操作

pub mod models; // 数据库实体定义
pub mod repositories; // 存储库接口与 Postgres 实现

// 重新导出常用类型和函数，方便其他模块使用
pub use models::article::{Article, ArticleUpdate, Label, NewArticle, Page};
pub use models::user::{NewUser, UserEntity};
pub use repositories::article::{ArticleStore, PgArticleStore};
pub use repositories::user::{PgUserStore, UserStore};
