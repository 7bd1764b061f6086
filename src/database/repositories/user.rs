use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::user::{NewUser, UserEntity};
use crate::error::AppResult;

/// 用户存储，用户名与邮箱的唯一性由存储层的唯一约束保证
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserEntity>>;

    async fn email_registered(&self, email: &str) -> AppResult<bool>;

    /// 在一个事务内写入用户与用户详情，任一失败整体回滚
    async fn create(&self, user: NewUser) -> AppResult<UserEntity>;
}

/// 用户存储库 Postgres 实现
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserEntity>> {
        let user = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, username, password_hash, nickname, add_time
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn email_registered(&self, email: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM user_info WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn create(&self, user: NewUser) -> AppResult<UserEntity> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, UserEntity>(
            r#"
            INSERT INTO users (username, password_hash, nickname, add_time)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, username, password_hash, nickname, add_time
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_info (id, email) VALUES ($1, $2)")
            .bind(created.id)
            .bind(&user.email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Registered user {} ({})", created.username, created.id);
        Ok(created)
    }
}
