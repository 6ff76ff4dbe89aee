use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{SessionRepository, SessionStore, UserRepository, UserStore};
use crate::services::{AuthService, SessionService, TotpService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 認証サービス（signup / login / セッション / 2FA）
    pub auth_service: AuthService,
}

impl AppState {
    /// 新しい AppState を作成
    ///
    /// ストアは PostgreSQL 実装で構成する。
    /// テストでは AuthService をインメモリストアで直接組み立てる
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);

        let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(db_pool.clone()));
        let sessions: Arc<dyn SessionStore> = Arc::new(SessionRepository::new(db_pool.clone()));

        let session_service = SessionService::new(sessions, config.session_ttl_secs);
        let totp_service = TotpService::new(
            config.totp_issuer.clone(),
            config.totp_digits,
            config.totp_period,
            config.totp_skew,
            config.encryption_key.expose_secret(),
        )?;

        let auth_service = AuthService::new(users, session_service, totp_service);

        Ok(Self {
            db_pool,
            config,
            auth_service,
        })
    }
}
