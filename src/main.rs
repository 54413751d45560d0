use std::net::SocketAddr;

use anyhow::Context;
use secrecy::ExposeSecret;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use anbud2fa::{config::Config, router::create_router, state::AppState};

const DB_MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    let addr = bind_address(&config)?;
    let db_pool = connect_database(&config).await?;

    let state = AppState::new(db_pool, config).context("failed to initialise 2FA services")?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    tracing::info!(addr = %addr, "2FAサービス起動");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("2FAサービス終了");
    Ok(())
}

/// tracing の初期化（JSON形式、RUST_LOG で上書き可能）
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,anbud2fa=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 環境変数を読み込み、DB 接続前に 2FA 設定を検証する
///
/// 本番でシークレット未設定、または信頼日数が範囲外ならここで停止。
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().context("failed to load config from environment")?;
    config.validate().map_err(|e| {
        tracing::error!(error = %e, "2FA設定が不正");
        anyhow::anyhow!("invalid 2FA configuration: {e}")
    })?;

    tracing::info!(
        app_env = ?config.app_env,
        ip_binding = config.app_env.is_production(),
        trust_token_days = config.trust_token_days,
        totp_issuer = %config.totp_issuer,
        "2FA設定読み込み完了"
    );

    Ok(config)
}

fn bind_address(config: &Config) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))
}

async fn connect_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .connect(config.database_url.expose_secret())
        .await
        .context("failed to connect to database")?;

    tracing::info!(max_connections = DB_MAX_CONNECTIONS, "データベース接続完了");
    Ok(pool)
}

/// Ctrl+C または SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "sigterm",
    };
    tracing::info!(signal, "シャットダウン開始");
}
