use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// サーバー側セッション
///
/// トークン平文は保存せず、SHA-256 ダイジェストのみ保持する。
/// 平文はログイン・登録レスポンスで一度だけクライアントに渡る。
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Uuid,
    /// 発行時点のロール（トークンは (userId, role) に紐づく）
    pub role: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}
