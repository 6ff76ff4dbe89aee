use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::Session;

/// セッションストレージの抽象
///
/// キーはトークンの SHA-256 ダイジェスト。平文トークンはストアに渡さない
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// セッションを保存
    async fn insert(&self, session: &Session) -> Result<(), AppError>;

    /// トークンダイジェストでセッションを検索
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, AppError>;

    /// セッションを削除（存在しない場合も成功）
    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn insert(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, role, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(&session.role)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT token_hash, user_id, role, created_at, expires_at
            FROM sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
