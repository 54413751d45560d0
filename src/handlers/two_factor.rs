use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, header},
};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::session::{SessionUser, client_ip};
use crate::services::TotpService;
use crate::state::AppState;

/// 信頼トークンを保持する Cookie 名
pub const TRUST_COOKIE_NAME: &str = "anbud_admin_2fa";

type WithCookie<T> = ([(HeaderName, String); 1], Json<T>);

// === 2FA Setup ===

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub secret: String,
    pub otpauth_uri: String,
}

/// POST /api/admin/2fa/setup
///
/// シークレットを生成して暗号化保存し、登録用 URI を返す。
/// 再登録は上書き（有効化済みの場合は信頼済みデバイスからのみ）。
///
/// # Security
/// - シークレット平文はログ出力禁止
pub async fn setup_2fa(
    State(state): State<AppState>,
    session: SessionUser,
    headers: HeaderMap,
) -> Result<Json<SetupResponse>, AppError> {
    let user_id = session.require_admin()?;

    if let Some(existing) = state.two_factor_store.find_by_user_id(user_id).await?
        && existing.enabled
        && !is_device_trusted(&state, &headers, user_id)
    {
        return Err(AppError::TotpAlreadyEnabled);
    }

    // シークレット生成
    let secret = TotpService::generate_secret();

    // 暗号化してDB保存
    let encrypted = state.cipher.encrypt(&secret)?;
    state.two_factor_store.upsert(user_id, &encrypted).await?;

    let otpauth_uri = state
        .totp_service
        .enrollment_uri(&session.account_label(), &secret);

    tracing::info!(user_id = %user_id, "2FA設定開始");

    Ok(Json(SetupResponse {
        secret,
        otpauth_uri,
    }))
}

// === 2FA Verify ===

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub trusted_days: u16,
}

/// POST /api/admin/2fa/verify
///
/// コードを検証し、成功したら2FAを有効化して信頼 Cookie を発行する。
///
/// # Security
/// - コード・トークンはログ出力禁止
pub async fn verify_2fa(
    State(state): State<AppState>,
    session: SessionUser,
    headers: HeaderMap,
    Json(request): Json<VerifyRequest>,
) -> Result<WithCookie<VerifyResponse>, AppError> {
    let user_id = session.require_admin()?;
    let code = validate_totp_code(&request.code, state.totp_service.params().digits)?;

    let record = state
        .two_factor_store
        .find_by_user_id(user_id)
        .await?
        .ok_or(AppError::TotpNotEnrolled)?;

    // 復号失敗は改ざん・破損として 500
    let secret = state.cipher.decrypt(&record.secret_encrypted)?;

    if !state.totp_service.verify_code(&secret, &code) {
        tracing::warn!(user_id = %user_id, "2FAコード不一致");
        return Err(AppError::TotpInvalid);
    }

    // 有効化より先に発行し、失敗時に enabled だけが書き込まれないようにする
    let token = state.trust_service.sign(user_id, &client_ip(&headers))?;
    let trusted_days = state.trust_service.valid_days();
    let cookie = trust_cookie(token, trusted_days, state.config.app_env.is_production());

    if !record.enabled {
        state.two_factor_store.enable(user_id).await?;
        tracing::info!(user_id = %user_id, "2FA有効化完了");
    }

    tracing::info!(user_id = %user_id, "2FA検証成功、信頼デバイスを記録");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(VerifyResponse {
            verified: true,
            trusted_days,
        }),
    ))
}

// === 2FA Status ===

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub enrolled: bool,
    pub enabled: bool,
    pub trusted: bool,
}

/// GET /api/admin/2fa/status
///
/// 管理画面の各リクエスト前に呼ばれ、再検証が必要かを返す。
pub async fn two_factor_status(
    State(state): State<AppState>,
    session: SessionUser,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    let user_id = session.require_admin()?;
    let record = state.two_factor_store.find_by_user_id(user_id).await?;

    Ok(Json(StatusResponse {
        enrolled: record.is_some(),
        enabled: record.is_some_and(|r| r.enabled),
        trusted: is_device_trusted(&state, &headers, user_id),
    }))
}

// === Trust cookie logout ===

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub cleared: bool,
}

/// POST /api/admin/2fa/logout
///
/// 信頼 Cookie を削除する。
pub async fn clear_trust(State(state): State<AppState>) -> WithCookie<LogoutResponse> {
    let mut cookie = base_cookie(String::new(), state.config.app_env.is_production());
    cookie.make_removal();

    (
        [(header::SET_COOKIE, cookie.to_string())],
        Json(LogoutResponse { cleared: true }),
    )
}

// === Helper Functions ===

/// このデバイスが該当ユーザーとして2FA済みか
pub fn is_device_trusted(state: &AppState, headers: &HeaderMap, user_id: Uuid) -> bool {
    let Some(token) = trust_cookie_value(headers) else {
        return false;
    };

    state
        .trust_service
        .verify(&token, &client_ip(headers))
        .is_some_and(|claims| claims.uid == user_id)
}

/// Cookie ヘッダーから信頼トークンを取り出す
fn trust_cookie_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value).flatten())
        .find(|cookie| cookie.name() == TRUST_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
}

fn base_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((TRUST_COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Set-Cookie 値を構築（HttpOnly, SameSite=Lax, 本番のみ Secure）
fn trust_cookie(token: String, days: u16, secure: bool) -> String {
    let mut cookie = base_cookie(token, secure);
    cookie.set_max_age(Duration::days(i64::from(days)));
    cookie.to_string()
}

/// TOTPコードバリデーション（空白除去後の値を返す）
fn validate_totp_code(code: &str, digits: usize) -> Result<String, AppError> {
    let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if code.is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }
    if code.len() != digits || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "認証コードは{}桁の数字で入力してください",
            digits
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::HeaderValue;

    use crate::repositories::InMemoryTwoFactorStore;

    #[test]
    fn test_validate_empty_code() {
        assert!(validate_totp_code("", 6).is_err());
        assert!(validate_totp_code("   ", 6).is_err());
    }

    #[test]
    fn test_validate_short_code() {
        assert!(validate_totp_code("12345", 6).is_err());
    }

    #[test]
    fn test_validate_non_digit_code() {
        assert!(validate_totp_code("12345a", 6).is_err());
    }

    #[test]
    fn test_validate_valid_code() {
        assert_eq!(validate_totp_code("123456", 6).unwrap(), "123456");
        assert_eq!(validate_totp_code(" 123 456 ", 6).unwrap(), "123456");
    }

    #[test]
    fn test_trust_cookie_attributes() {
        let cookie = trust_cookie("a.b.c".to_string(), 14, false);
        assert!(cookie.starts_with("anbud_admin_2fa=a.b.c"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=1209600"));
        assert!(!cookie.contains("Secure"));

        let secure = trust_cookie("a.b.c".to_string(), 14, true);
        assert!(secure.contains("Secure"));
    }

    #[test]
    fn test_trust_cookie_max_age_follows_days() {
        assert!(trust_cookie("t".to_string(), 1, false).contains("Max-Age=86400"));
        assert!(trust_cookie("t".to_string(), 365, false).contains("Max-Age=31536000"));
        // u16 の上限でも Duration は溢れない
        let max = trust_cookie("t".to_string(), u16::MAX, false);
        assert!(max.contains(&format!("Max-Age={}", i64::from(u16::MAX) * 86_400)));
    }

    #[test]
    fn test_is_device_trusted() {
        let config = envy::from_iter([
            (
                "DATABASE_URL".to_string(),
                "postgres://localhost/anbud_test".to_string(),
            ),
            ("APP_ENV".to_string(), "production".to_string()),
            ("TWO_FACTOR_SECRET".to_string(), "test-secret".to_string()),
        ])
        .unwrap();
        let state =
            AppState::with_store(Arc::new(InMemoryTwoFactorStore::new()), config).unwrap();

        let user_id = Uuid::new_v4();
        let token = state.trust_service.sign(user_id, "10.0.0.5").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{TRUST_COOKIE_NAME}={token}")).unwrap(),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.5"));

        assert!(is_device_trusted(&state, &headers, user_id));
        // 別ユーザーのセッションでは無効
        assert!(!is_device_trusted(&state, &headers, Uuid::new_v4()));

        // 本番では別IPからの再利用は無効
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.6"));
        assert!(!is_device_trusted(&state, &headers, user_id));
    }

    #[test]
    fn test_trust_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; anbud_admin_2fa=x.y.z; lang=nb"),
        );
        assert_eq!(trust_cookie_value(&headers).as_deref(), Some("x.y.z"));

        assert!(trust_cookie_value(&HeaderMap::new()).is_none());
    }
}
