use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::UserResponse;
use crate::state::AppState;

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "userName")]
    pub user_name: String,
    pub password: String,
}

/// ログインレスポンス
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    /// 以降のリクエストで Authorization: Bearer として送るトークン
    pub session_token: String,
}

/// ログインハンドラー
///
/// POST /login
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー認証（ストア照合、argon2検証）
/// 3. セッショントークン発行
///
/// ユーザー不在とパスワード不一致は同一レスポンスに集約される
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    // 1. リクエストバリデーション
    validate_login_request(&request)?;

    // 2-3. 認証とトークン発行
    let (user, session_token) = state
        .auth_service
        .login(&request.user_name, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            user: UserResponse::from(&user),
            session_token,
        }),
    ))
}

/// ログインリクエストのバリデーション
fn validate_login_request(request: &LoginRequest) -> Result<(), AppError> {
    if request.user_name.trim().is_empty() {
        return Err(AppError::Validation("ユーザー名は必須です".to_string()));
    }
    if request.password.is_empty() {
        return Err(AppError::Validation("パスワードは必須です".to_string()));
    }
    Ok(())
}
