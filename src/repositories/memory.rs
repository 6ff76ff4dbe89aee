use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Session, User};
use crate::repositories::session::SessionStore;
use crate::repositories::user::{NewUser, UserStore};

/// インメモリのユーザーストア
///
/// テストおよびDBなしのローカル起動用。
/// 書き込み系は単一のwriteロック内で完結するため、
/// store_totp_secret の compare-and-set もアトミックに動作する
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_by_username(&self, user_name: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.user_name == user_name)
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser<'_>) -> Result<User, AppError> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.user_name == new_user.user_name) {
            return Err(AppError::UserAlreadyExists);
        }

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name.to_string(),
            role: new_user.role.to_string(),
            user_name: new_user.user_name.to_string(),
            password_hash: new_user.password_hash.to_string(),
            totp_secret_enc: None,
            totp_enabled: false,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn store_totp_secret(
        &self,
        user_id: Uuid,
        secret_enc: &[u8],
    ) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(AppError::UserNotFound)?;

        if user.totp_secret_enc.is_none() && !user.totp_enabled {
            user.totp_secret_enc = Some(secret_enc.to_vec());
            user.updated_at = OffsetDateTime::now_utc();
        }

        Ok(user.clone())
    }

    async fn enable_totp(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(AppError::UserNotFound)?;
        user.totp_enabled = true;
        user.updated_at = OffsetDateTime::now_utc();

        Ok(())
    }
}

/// インメモリのセッションストア
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.read().await.get(token_hash).cloned())
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<(), AppError> {
        self.sessions.write().await.remove(token_hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user_fixture<'a>() -> NewUser<'a> {
        NewUser {
            name: "テスト 太郎",
            role: "member",
            user_name: "taro",
            password_hash: "$argon2id$dummy",
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_username() {
        let store = InMemoryUserStore::new();
        store.create_user(new_user_fixture()).await.unwrap();

        let result = store
            .create_user(NewUser {
                name: "別人",
                role: "admin",
                user_name: "taro",
                password_hash: "$argon2id$other",
            })
            .await;

        assert!(matches!(result, Err(AppError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn test_store_totp_secret_keeps_first_writer() {
        let store = InMemoryUserStore::new();
        let user = store.create_user(new_user_fixture()).await.unwrap();

        let first = store.store_totp_secret(user.id, b"secret-a").await.unwrap();
        let second = store.store_totp_secret(user.id, b"secret-b").await.unwrap();

        // 2回目の書き込みは無視され、最初のシークレットが残る
        assert_eq!(first.totp_secret_enc.as_deref(), Some(&b"secret-a"[..]));
        assert_eq!(second.totp_secret_enc.as_deref(), Some(&b"secret-a"[..]));
    }

    #[tokio::test]
    async fn test_enable_totp_unknown_user() {
        let store = InMemoryUserStore::new();
        let result = store.enable_totp(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::UserNotFound)));
    }
}
