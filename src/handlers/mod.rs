pub mod check_auth;
pub mod health;
pub mod login;
pub mod logout;
pub mod signup;
pub mod two_factor;

pub use check_auth::check_auth;
pub use health::health_check;
pub use login::login;
pub use logout::logout;
pub use signup::sign_up;
pub use two_factor::{enable_2fa, verify_2fa};

use axum::http::{HeaderMap, header};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::User;

/// サニタイズ済みユーザー表現（レスポンス用）
///
/// パスワードハッシュ・TOTPシークレットは含まない
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub totp_enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            role: user.role.clone(),
            user_name: user.user_name.clone(),
            totp_enabled: user.totp_enabled,
            created_at: user.created_at,
        }
    }
}

/// Authorization ヘッダーから Bearer トークンを取り出す
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
