use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::trust::normalize_ip;

/// 上流の認証ゲートウェイが付与するヘッダー
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// ユーザー種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Private,
    Business,
    Admin,
}

impl Role {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "private" => Some(Self::Private),
            "business" => Some(Self::Business),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// 認証済みセッションのユーザー
///
/// 認証・セッション管理は外部サービスが担当し、本サービスはヘッダーを受け取るだけ。
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub role: Role,
    pub email: Option<String>,
}

impl SessionUser {
    /// 管理者のみ許可
    pub fn require_admin(&self) -> Result<Uuid, AppError> {
        if self.role != Role::Admin {
            tracing::warn!(user_id = %self.user_id, role = ?self.role, "管理者以外の2FAアクセス");
            return Err(AppError::Forbidden);
        }
        Ok(self.user_id)
    }

    /// 認証アプリに表示するアカウント名
    pub fn account_label(&self) -> String {
        self.email
            .clone()
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(&parts.headers, USER_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(AppError::Unauthenticated)?;

        let role = header_str(&parts.headers, USER_ROLE_HEADER)
            .and_then(Role::parse)
            .ok_or(AppError::Unauthenticated)?;

        let email = header_str(&parts.headers, USER_EMAIL_HEADER)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self {
            user_id,
            role,
            email,
        })
    }
}

/// リクエストヘッダーからクライアントIPを取得（正規化済み）
///
/// X-Forwarded-For の先頭、なければ X-Real-IP。どちらもなければループバック。
pub fn client_ip(headers: &HeaderMap) -> String {
    let raw = header_str(headers, "x-forwarded-for")
        .or_else(|| header_str(headers, "x-real-ip"))
        .unwrap_or_default();
    normalize_ip(raw)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}
