use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// 二要素認証の登録状態
///
/// Disabled → PendingVerification → Enabled の一方向にのみ遷移する。
/// Enabled は終端状態（無効化操作は提供しない）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotpState {
    /// 未設定
    Disabled,
    /// シークレット発行済み、初回コード確認待ち
    PendingVerification,
    /// 有効化済み
    Enabled,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    /// 表示名
    pub name: String,
    pub role: String,
    /// ログインID（ユニーク）
    pub user_name: String,
    #[serde(skip)]
    pub password_hash: String,
    /// AES-256-GCM で暗号化された TOTP シークレット
    /// 平文シークレットはログ出力禁止
    #[serde(skip)]
    pub totp_secret_enc: Option<Vec<u8>>,
    pub totp_enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// 保存カラムから二要素認証状態を導出
    pub fn totp_state(&self) -> TotpState {
        match (&self.totp_secret_enc, self.totp_enabled) {
            (Some(_), true) => TotpState::Enabled,
            (Some(_), false) => TotpState::PendingVerification,
            (None, _) => TotpState::Disabled,
        }
    }
}
