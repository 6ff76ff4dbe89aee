use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;

use crate::error::AppError;
use crate::handlers::{UserResponse, bearer_token};
use crate::state::AppState;

/// セッション確認レスポンス
#[derive(Debug, Serialize)]
pub struct CheckAuthResponse {
    pub user: UserResponse,
}

/// セッション確認ハンドラー
///
/// GET /checkAuth
///
/// Authorization ヘッダーのセッショントークンを検証し、
/// 対応するユーザーをサニタイズして返す
pub async fn check_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CheckAuthResponse>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::SessionInvalid)?;

    let user = state.auth_service.check_auth(token).await?;

    Ok(Json(CheckAuthResponse {
        user: UserResponse::from(&user),
    }))
}
