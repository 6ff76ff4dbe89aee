use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// === 2FA Enable ===

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct EnableResponse {
    /// QRコード（data URL形式）
    pub qr_code: String,
    /// Base32エンコードされた平文シークレット
    pub secret: String,
    /// otpauth:// プロビジョニングURI
    pub otpauth_url: String,
}

/// POST /enable2FA
///
/// 2FA設定を開始（シークレット生成、URI・QRコード返却）。
/// 確認待ちの再リクエストは同じシークレットを返す
///
/// # Security
/// - シークレット平文はログ出力禁止
pub async fn enable_2fa(
    State(state): State<AppState>,
    Json(request): Json<EnableRequest>,
) -> Result<Json<EnableResponse>, AppError> {
    let setup = state.auth_service.enable_2fa(request.user_id).await?;

    Ok(Json(EnableResponse {
        qr_code: format!("data:image/png;base64,{}", setup.qr_code),
        secret: setup.secret,
        otpauth_url: setup.otpauth_url,
    }))
}

// === 2FA Verify ===

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    /// 認証アプリが表示したコード
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub enabled: bool,
}

/// POST /verify2FA
///
/// 2FA設定確認（初回コード検証で有効化）
///
/// # Security
/// - コードはログ出力禁止
pub async fn verify_2fa(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    // バリデーション
    validate_totp_code(&request.token, state.config.totp_digits)?;

    state
        .auth_service
        .verify_2fa(request.user_id, &request.token)
        .await?;

    Ok(Json(VerifyResponse { enabled: true }))
}

/// TOTPコードバリデーション
fn validate_totp_code(code: &str, digits: usize) -> Result<(), AppError> {
    if code.is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }
    if code.len() != digits || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "認証コードは{digits}桁の数字で入力してください"
        )));
    }
    Ok(())
}
