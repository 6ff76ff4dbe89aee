use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;

use crate::error::AppError;
use crate::handlers::bearer_token;
use crate::state::AppState;

/// ログアウトレスポンス
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// ログアウトハンドラー
///
/// GET /logout
///
/// Authorization ヘッダーのセッションを破棄する。
/// トークンが無い・無効な場合でも常に 200 を返す
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, AppError> {
    if let Some(token) = bearer_token(&headers) {
        state.auth_service.logout(token).await?;
    }

    Ok(Json(LogoutResponse { success: true }))
}
