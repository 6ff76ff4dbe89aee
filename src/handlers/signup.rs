use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::UserResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    /// 表示名
    pub name: String,
    pub role: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub password: String, // SecretBox不要（Deserialize後すぐハッシュ化）
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub user: UserResponse,
    /// 以降のリクエストで Authorization: Bearer として送るトークン
    pub session_token: String,
}

/// ユーザー登録ハンドラー
///
/// POST /signup
///
/// 登録成功時はセッショントークンも発行する
///
/// # Security
/// - パスワードはログに出力しない
/// - パスワードは即座にハッシュ化
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    // バリデーション
    validate_sign_up_request(&request)?;

    let (user, session_token) = state
        .auth_service
        .sign_up(
            &request.name,
            &request.role,
            &request.user_name,
            &request.password,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            user: UserResponse::from(&user),
            session_token,
        }),
    ))
}

/// 登録リクエストのバリデーション
fn validate_sign_up_request(request: &SignUpRequest) -> Result<(), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("表示名は必須です".to_string()));
    }
    if request.role.trim().is_empty() {
        return Err(AppError::Validation("ロールは必須です".to_string()));
    }
    if request.user_name.trim().is_empty() {
        return Err(AppError::Validation("ユーザー名は必須です".to_string()));
    }
    // password: 8文字以上
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> SignUpRequest {
        SignUpRequest {
            name: "テスト 太郎".to_string(),
            role: "member".to_string(),
            user_name: "taro".to_string(),
            password: "password123".to_string(),
        }
    }

    #[test]
    fn test_validate_empty_name() {
        let request = SignUpRequest {
            name: "".to_string(),
            ..valid_request()
        };
        assert!(validate_sign_up_request(&request).is_err());
    }

    #[test]
    fn test_validate_empty_role() {
        let request = SignUpRequest {
            role: "  ".to_string(),
            ..valid_request()
        };
        assert!(validate_sign_up_request(&request).is_err());
    }

    #[test]
    fn test_validate_empty_user_name() {
        let request = SignUpRequest {
            user_name: "".to_string(),
            ..valid_request()
        };
        assert!(validate_sign_up_request(&request).is_err());
    }

    #[test]
    fn test_validate_short_password() {
        let request = SignUpRequest {
            password: "short".to_string(),
            ..valid_request()
        };
        assert!(validate_sign_up_request(&request).is_err());
    }

    #[test]
    fn test_validate_valid_request() {
        assert!(validate_sign_up_request(&valid_request()).is_ok());
    }
}
