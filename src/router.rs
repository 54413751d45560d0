use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::state::AppState;

/// Router の構築
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        // 管理者二要素認証
        .route("/api/admin/2fa/setup", post(handlers::setup_2fa))
        .route("/api/admin/2fa/verify", post(handlers::verify_2fa))
        .route("/api/admin/2fa/status", get(handlers::two_factor_status))
        .route("/api/admin/2fa/logout", post(handlers::clear_trust))
        .with_state(state)
}
