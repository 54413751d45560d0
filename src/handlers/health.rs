use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

/// ヘルスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// 信頼トークンを IP に紐付けているか（本番のみ true）
    pub ip_binding: bool,
}

/// GET /api/health
///
/// ロードバランサーから呼び出される。DB には触れない。
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ip_binding: state.config.app_env.is_production(),
    })
}
