use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;

/// 新規ユーザー作成時の入力
#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub role: &'a str,
    pub user_name: &'a str,
    pub password_hash: &'a str,
}

/// ユーザーストレージの抽象
///
/// AuthService は本トレイト経由でのみレコードにアクセスし、
/// 具体的なストア（PostgreSQL / インメモリ）を差し替え可能にする
#[async_trait]
pub trait UserStore: Send + Sync {
    /// ユーザーIDで検索
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// ユーザー名で検索
    async fn find_by_username(&self, user_name: &str) -> Result<Option<User>, AppError>;

    /// 新しいユーザーを作成
    ///
    /// # Errors
    /// ユーザー名重複時は `AppError::UserAlreadyExists`
    async fn create_user(&self, new_user: NewUser<'_>) -> Result<User, AppError>;

    /// 確認待ちTOTPシークレットを保存（compare-and-set）
    ///
    /// シークレット未設定かつ2FA無効のレコードにのみ書き込む。
    /// 書き込みの成否に関わらず現在のレコードを返すため、
    /// 並行する有効化リクエストは勝者のシークレットに収束する。
    async fn store_totp_secret(
        &self,
        user_id: Uuid,
        secret_enc: &[u8],
    ) -> Result<User, AppError>;

    /// 2FAを有効化
    async fn enable_totp(&self, user_id: Uuid) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, role, user_name, password_hash,
                   totp_secret_enc, totp_enabled, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_username(&self, user_name: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, role, user_name, password_hash,
                   totp_secret_enc, totp_enabled, created_at, updated_at
            FROM users
            WHERE user_name = $1
            "#,
        )
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser<'_>) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, role, user_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, role, user_name, password_hash,
                      totp_secret_enc, totp_enabled, created_at, updated_at
            "#,
        )
        .bind(new_user.name)
        .bind(new_user.role)
        .bind(new_user.user_name)
        .bind(new_user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // UNIQUE制約違反チェック
            if let sqlx::Error::Database(db_err) = &e
                && db_err.constraint() == Some("users_user_name_key")
            {
                return AppError::UserAlreadyExists;
            }
            AppError::Database(e)
        })
    }

    async fn store_totp_secret(
        &self,
        user_id: Uuid,
        secret_enc: &[u8],
    ) -> Result<User, AppError> {
        // 未設定のレコードにのみ書き込む。0行更新は競合（他リクエストが
        // 先に設定済み）を意味し、その場合も現在のレコードを返す
        sqlx::query(
            r#"
            UPDATE users
            SET totp_secret_enc = $2, updated_at = NOW()
            WHERE id = $1 AND totp_secret_enc IS NULL AND totp_enabled = FALSE
            "#,
        )
        .bind(user_id)
        .bind(secret_enc)
        .execute(&self.pool)
        .await?;

        self.find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    async fn enable_totp(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_enabled = TRUE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
