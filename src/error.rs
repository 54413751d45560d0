use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::services::cipher::CipherError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("未認証")]
    Unauthenticated,

    #[error("管理者権限が必要です")]
    Forbidden,

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("設定エラー: {0}")]
    Configuration(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("シークレット復号エラー")]
    Cipher(#[from] CipherError),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("認証コードが無効です")]
    TotpInvalid,

    #[error("二要素認証が設定されていません")]
    TotpNotEnrolled,

    #[error("二要素認証は既に有効です")]
    TotpAlreadyEnabled,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "ログインが必要です".to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "管理者権限が必要です".to_string()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Configuration(msg) => {
                tracing::error!(error = %msg, "設定エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Cipher(e) => {
                // 改ざんまたはデータ破損の可能性
                tracing::error!(error = %e, "2FAシークレットの復号に失敗");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::TotpInvalid => (
                StatusCode::UNAUTHORIZED,
                "認証コードが正しくありません".to_string(),
            ),
            Self::TotpNotEnrolled => (
                StatusCode::BAD_REQUEST,
                "二要素認証が設定されていません".to_string(),
            ),
            Self::TotpAlreadyEnabled => {
                (StatusCode::CONFLICT, "二要素認証は既に有効です".to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
