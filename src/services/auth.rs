use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{TotpState, User};
use crate::repositories::{NewUser, UserStore};
use crate::services::sessions::SessionService;
use crate::services::totp::TotpService;

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// 2FA有効化時にクライアントへ返す設定情報
///
/// 平文シークレットを含む（元プロダクトの仕様を踏襲。
/// QRスキャン限定にすべきかは DESIGN.md の未解決事項参照）
#[derive(Debug)]
pub struct TwoFactorSetup {
    /// Base32エンコードされた平文シークレット
    pub secret: String,
    /// otpauth:// プロビジョニングURI
    pub otpauth_url: String,
    /// QRコード（PNG、Base64エンコード）
    pub qr_code: String,
}

/// 認証サービス
///
/// signup / login / logout / セッション確認 / 2FA有効化・検証を
/// ストアとTOTPサービスの組み合わせで提供する。
/// 全操作でセッショントークンを明示的に受け渡しし、
/// リクエスト間で共有する可変状態は持たない
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionService,
    totp: TotpService,
}

impl AuthService {
    /// 新しい AuthService を作成
    pub fn new(users: Arc<dyn UserStore>, sessions: SessionService, totp: TotpService) -> Self {
        Self {
            users,
            sessions,
            totp,
        }
    }

    /// ユーザーを登録し、セッショントークンを発行
    ///
    /// # Errors
    /// ユーザー名重複時は `AppError::UserAlreadyExists`
    ///
    /// # Security
    /// - パスワードは即座にハッシュ化し、平文は保持しない
    pub async fn sign_up(
        &self,
        name: &str,
        role: &str,
        user_name: &str,
        password: &str,
    ) -> Result<(User, String), AppError> {
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create_user(NewUser {
                name,
                role,
                user_name,
                password_hash: &password_hash,
            })
            .await?;

        let token = self.sessions.issue(&user).await?;

        tracing::info!(user_id = %user.id, user_name = %user_name, "ユーザー登録成功");

        Ok((user, token))
    }

    /// ユーザー認証を実行し、セッショントークンを発行
    ///
    /// タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を実行。
    /// ユーザー不在とパスワード不一致は同一のエラーに集約する（列挙攻撃防止）
    pub async fn login(&self, user_name: &str, password: &str) -> Result<(User, String), AppError> {
        let user = self.users.find_by_username(user_name).await?;

        match user {
            Some(user) => {
                if self.verify_password(password, &user.password_hash)? {
                    tracing::info!(user_name = %user_name, "認証成功");
                    let token = self.sessions.issue(&user).await?;
                    Ok((user, token))
                } else {
                    tracing::warn!(user_name = %user_name, "認証失敗: パスワード不一致");
                    Err(AppError::Authentication("invalid_credentials".to_string()))
                }
            }
            None => {
                // タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を実行
                // これにより、ユーザーの存在有無を応答時間から推測できなくなる
                let dummy_hash = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$RWh6";
                let _ = self.verify_password(password, dummy_hash);
                tracing::warn!(user_name = %user_name, "認証失敗: ユーザー不在");
                Err(AppError::Authentication("invalid_credentials".to_string()))
            }
        }
    }

    /// セッションを破棄する。常に成功する
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.sessions.revoke(token).await?;
        tracing::info!("ログアウト完了");
        Ok(())
    }

    /// セッショントークンを検証し、対応するユーザーを返す
    ///
    /// # Errors
    /// - トークン無効・期限切れ: `AppError::SessionInvalid`
    /// - 発行後にユーザーが消えている場合: `AppError::UserNotFound`
    pub async fn check_auth(&self, token: &str) -> Result<User, AppError> {
        let session = self.sessions.authenticate(token).await?;

        self.users
            .find_by_id(session.user_id)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    /// 2FA設定を開始（シークレット生成、URI・QRコード返却）
    ///
    /// 状態遷移: Disabled → PendingVerification。
    /// 確認待ちの場合は既存シークレットを再利用する（再生成すると
    /// 認証アプリに登録済みのQRが無効になるため）。
    /// 並行リクエストはストア側の compare-and-set で単一シークレットに収束する
    pub async fn enable_2fa(&self, user_id: Uuid) -> Result<TwoFactorSetup, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let secret = match user.totp_state() {
            TotpState::Enabled => return Err(AppError::TotpAlreadyEnabled),
            TotpState::PendingVerification => self.pending_secret(&user)?,
            TotpState::Disabled => {
                let secret = TotpService::generate_secret();
                let encrypted = self.totp.encrypt_secret(&secret)?;

                let stored = self.users.store_totp_secret(user.id, &encrypted).await?;
                match stored.totp_state() {
                    TotpState::Enabled => return Err(AppError::TotpAlreadyEnabled),
                    // 競合時は勝者のシークレットを復号して返す
                    _ => self.pending_secret(&stored)?,
                }
            }
        };

        let otpauth_url = self.totp.provisioning_uri(&user.user_name, &secret)?;
        let qr_code = self.totp.generate_qr_code(&user.user_name, &secret)?;

        tracing::info!(user_id = %user.id, "2FA設定開始");

        Ok(TwoFactorSetup {
            secret,
            otpauth_url,
            qr_code,
        })
    }

    /// 2FA設定を確認（初回コード検証で有効化）
    ///
    /// 検証失敗時は状態を変更しない
    ///
    /// # Security
    /// - コードはログ出力禁止
    pub async fn verify_2fa(&self, user_id: Uuid, code: &str) -> Result<(), AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        match user.totp_state() {
            TotpState::Enabled => Err(AppError::TotpAlreadyEnabled),
            // シークレット未発行ならコード計算せず決定的に失敗
            TotpState::Disabled => Err(AppError::TotpNotEnabled),
            TotpState::PendingVerification => {
                let secret = self.pending_secret(&user)?;

                if !self.totp.verify_code(&secret, code)? {
                    return Err(AppError::TotpInvalid);
                }

                self.users.enable_totp(user.id).await?;

                tracing::info!(user_id = %user.id, "2FA有効化完了");

                Ok(())
            }
        }
    }

    /// 保存済みシークレットを復号して返す
    fn pending_secret(&self, user: &User) -> Result<String, AppError> {
        let encrypted = user.totp_secret_enc.as_deref().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("totp secret missing for user"))
        })?;
        self.totp.decrypt_secret(encrypted)
    }

    /// パスワードを検証
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
            AppError::Internal(anyhow::anyhow!("password hash parse error"))
        })?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemorySessionStore, InMemoryUserStore};
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    fn test_totp_service() -> TotpService {
        let key_base64 = STANDARD.encode([0u8; 32]);
        TotpService::new("TestApp".to_string(), 6, 30, 1, &key_base64).unwrap()
    }

    fn test_auth_service() -> AuthService {
        let users = Arc::new(InMemoryUserStore::new());
        let sessions = SessionService::new(Arc::new(InMemorySessionStore::new()), 3600);
        AuthService::new(users, sessions, test_totp_service())
    }

    async fn sign_up_taro(service: &AuthService) -> (User, String) {
        service
            .sign_up("テスト 太郎", "member", "taro", "password123")
            .await
            .unwrap()
    }

    fn unix_now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[tokio::test]
    async fn test_sign_up_and_check_auth() {
        let service = test_auth_service();
        let (user, token) = sign_up_taro(&service).await;

        // パスワードは平文では保存されない
        assert_ne!(user.password_hash, "password123");
        assert_eq!(user.totp_state(), TotpState::Disabled);

        let checked = service.check_auth(&token).await.unwrap();
        assert_eq!(checked.id, user.id);
    }

    #[tokio::test]
    async fn test_sign_up_duplicate_username_conflicts() {
        let service = test_auth_service();
        sign_up_taro(&service).await;

        // 他フィールドが違ってもユーザー名重複は常に拒否
        for _ in 0..2 {
            let result = service
                .sign_up("別人", "admin", "taro", "otherpassword")
                .await;
            assert!(matches!(result, Err(AppError::UserAlreadyExists)));
        }
    }

    #[tokio::test]
    async fn test_login_success() {
        let service = test_auth_service();
        let (user, _) = sign_up_taro(&service).await;

        let (logged_in, token) = service.login("taro", "password123").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let checked = service.check_auth(&token).await.unwrap();
        assert_eq!(checked.id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let service = test_auth_service();
        sign_up_taro(&service).await;

        // パスワード不一致とユーザー不在は同一のエラーバリアント
        let wrong_password = service.login("taro", "wrongpassword").await;
        assert!(matches!(wrong_password, Err(AppError::Authentication(_))));

        let unknown_user = service.login("nobody", "password123").await;
        assert!(matches!(unknown_user, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let service = test_auth_service();
        let (_, token) = sign_up_taro(&service).await;

        service.logout(&token).await.unwrap();

        let result = service.check_auth(&token).await;
        assert!(matches!(result, Err(AppError::SessionInvalid)));

        // 無効なトークンのログアウトも成功
        service.logout(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_check_auth_with_garbage_token() {
        let service = test_auth_service();
        let result = service.check_auth("garbage").await;
        assert!(matches!(result, Err(AppError::SessionInvalid)));
    }

    #[tokio::test]
    async fn test_enable_2fa_unknown_user() {
        let service = test_auth_service();
        let result = service.enable_2fa(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_enable_2fa_reuses_pending_secret() {
        let service = test_auth_service();
        let (user, _) = sign_up_taro(&service).await;

        let first = service.enable_2fa(user.id).await.unwrap();
        let second = service.enable_2fa(user.id).await.unwrap();

        // 確認待ちの間は同一シークレットを返す（再生成しない）
        assert_eq!(first.secret, second.secret);
        assert_eq!(first.otpauth_url, second.otpauth_url);
        assert!(first.otpauth_url.starts_with("otpauth://totp/"));
        assert!(!first.qr_code.is_empty());
    }

    #[tokio::test]
    async fn test_verify_2fa_enables_user() {
        let service = test_auth_service();
        let (user, _) = sign_up_taro(&service).await;

        let setup = service.enable_2fa(user.id).await.unwrap();
        let code = test_totp_service()
            .code_at(&setup.secret, unix_now())
            .unwrap();

        service.verify_2fa(user.id, &code).await.unwrap();

        let user = service.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.totp_state(), TotpState::Enabled);
    }

    #[tokio::test]
    async fn test_verify_2fa_wrong_code_keeps_state() {
        let service = test_auth_service();
        let (user, _) = sign_up_taro(&service).await;

        let setup = service.enable_2fa(user.id).await.unwrap();

        let result = service.verify_2fa(user.id, "000000").await;
        assert!(matches!(result, Err(AppError::TotpInvalid)));

        // 失敗しても確認待ちのまま、シークレットも変わらない
        let again = service.enable_2fa(user.id).await.unwrap();
        assert_eq!(again.secret, setup.secret);
    }

    #[tokio::test]
    async fn test_verify_2fa_stale_code_rejected() {
        let service = test_auth_service();
        let (user, _) = sign_up_taro(&service).await;

        let setup = service.enable_2fa(user.id).await.unwrap();
        // 2ステップ前のコードは許容ウィンドウ（skew=1）の外
        let stale = test_totp_service()
            .code_at(&setup.secret, unix_now() - 60)
            .unwrap();

        let result = service.verify_2fa(user.id, &stale).await;
        assert!(matches!(result, Err(AppError::TotpInvalid)));
    }

    #[tokio::test]
    async fn test_verify_2fa_without_setup() {
        let service = test_auth_service();
        let (user, _) = sign_up_taro(&service).await;

        let result = service.verify_2fa(user.id, "123456").await;
        assert!(matches!(result, Err(AppError::TotpNotEnabled)));
    }

    #[tokio::test]
    async fn test_verify_2fa_unknown_user() {
        let service = test_auth_service();
        let result = service.verify_2fa(Uuid::new_v4(), "123456").await;
        assert!(matches!(result, Err(AppError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_enable_2fa_after_enabled_conflicts() {
        let service = test_auth_service();
        let (user, _) = sign_up_taro(&service).await;

        let setup = service.enable_2fa(user.id).await.unwrap();
        let code = test_totp_service()
            .code_at(&setup.secret, unix_now())
            .unwrap();
        service.verify_2fa(user.id, &code).await.unwrap();

        // Enabled は終端状態: 再有効化は何度でも拒否される
        for _ in 0..2 {
            let result = service.enable_2fa(user.id).await;
            assert!(matches!(result, Err(AppError::TotpAlreadyEnabled)));
        }
    }
}
