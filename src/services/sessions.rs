use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::error::AppError;
use crate::models::{Session, User};
use crate::repositories::SessionStore;

/// セッション発行・検証サービス
///
/// トークンは (userId, role) に紐づくサーバー側セッションとして保存される。
/// グローバルな Cookie 状態は持たず、トークンは常に明示的に受け渡しする
///
/// # Security
/// - トークン平文はDBに保存しない（SHA-256ダイジェストのみ）
/// - トークン平文はログに出力しない
#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionService {
    /// 新しい SessionService を作成
    pub fn new(sessions: Arc<dyn SessionStore>, ttl_secs: i64) -> Self {
        Self {
            sessions,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// セッションを発行し、平文トークンを返す
    pub async fn issue(&self, user: &User) -> Result<String, AppError> {
        let token = generate_token();
        let now = OffsetDateTime::now_utc();

        let session = Session {
            token_hash: hash_token(&token),
            user_id: user.id,
            role: user.role.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.insert(&session).await?;

        tracing::info!(user_id = %user.id, "セッション発行");

        Ok(token)
    }

    /// トークンからセッションを解決
    ///
    /// 不明なトークンと期限切れトークンは呼び出し側から区別できない
    pub async fn authenticate(&self, token: &str) -> Result<Session, AppError> {
        let session = self
            .sessions
            .find_by_token_hash(&hash_token(token))
            .await?
            .ok_or(AppError::SessionInvalid)?;

        if session.expires_at < OffsetDateTime::now_utc() {
            // 期限切れセッションは掃除してから拒否
            self.sessions
                .delete_by_token_hash(&session.token_hash)
                .await?;
            return Err(AppError::SessionInvalid);
        }

        Ok(session)
    }

    /// セッションを破棄（存在しないトークンでも成功）
    pub async fn revoke(&self, token: &str) -> Result<(), AppError> {
        self.sessions.delete_by_token_hash(&hash_token(token)).await
    }
}

/// 32バイトのランダムトークンを生成
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// トークンをSHA-256でハッシュ化
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemorySessionStore;
    use uuid::Uuid;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "テスト 太郎".to_string(),
            role: "member".to_string(),
            user_name: "taro".to_string(),
            password_hash: "$argon2id$dummy".to_string(),
            totp_secret_enc: None,
            totp_enabled: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn test_service(ttl_secs: i64) -> SessionService {
        SessionService::new(Arc::new(InMemorySessionStore::new()), ttl_secs)
    }

    #[test]
    fn test_token_generation() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_ne!(token1, token2);
        // 32バイトのBase64 URL-safe（パディングなし）= 43文字
        assert_eq!(token1.len(), 43);
    }

    #[tokio::test]
    async fn test_issue_and_authenticate() {
        let service = test_service(3600);
        let user = test_user();

        let token = service.issue(&user).await.unwrap();
        let session = service.authenticate(&token).await.unwrap();

        assert_eq!(session.user_id, user.id);
        assert_eq!(session.role, "member");
    }

    #[tokio::test]
    async fn test_authenticate_unknown_token() {
        let service = test_service(3600);
        let result = service.authenticate("no-such-token").await;
        assert!(matches!(result, Err(AppError::SessionInvalid)));
    }

    #[tokio::test]
    async fn test_authenticate_expired_token() {
        // TTLを負にして発行時点で期限切れにする
        let service = test_service(-1);
        let token = service.issue(&test_user()).await.unwrap();

        let result = service.authenticate(&token).await;
        assert!(matches!(result, Err(AppError::SessionInvalid)));
    }

    #[tokio::test]
    async fn test_revoke() {
        let service = test_service(3600);
        let token = service.issue(&test_user()).await.unwrap();

        service.revoke(&token).await.unwrap();

        let result = service.authenticate(&token).await;
        assert!(matches!(result, Err(AppError::SessionInvalid)));

        // 再度のrevokeも成功する
        service.revoke(&token).await.unwrap();
    }
}
