use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{AdminTwoFactorRepository, TwoFactorStore};
use crate::services::{SecretCipher, TotpService, TrustTokenService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// 鍵素材は起動後は読み取り専用。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 管理者2FAシークレットの保存先
    pub two_factor_store: Arc<dyn TwoFactorStore>,
    /// TOTPサービス
    pub totp_service: TotpService,
    /// シークレット暗号化
    pub cipher: SecretCipher,
    /// 信頼トークン署名・検証
    pub trust_service: TrustTokenService,
}

impl AppState {
    /// PostgreSQL を保存先として AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        Self::with_store(Arc::new(AdminTwoFactorRepository::new(db_pool)), config)
    }

    /// 保存先を指定して AppState を作成
    ///
    /// 本番で共有シークレットが未設定、または信頼日数が範囲外ならエラー。
    pub fn with_store(
        two_factor_store: Arc<dyn TwoFactorStore>,
        config: Config,
    ) -> Result<Self, AppError> {
        let secret = config.two_factor_secret()?;
        let trust_days = config.trust_token_days()?;

        let cipher = SecretCipher::new(secret);
        let trust_service =
            TrustTokenService::new(secret, config.app_env.is_production(), trust_days);
        let totp_service = TotpService::new(config.totp_issuer.clone());

        tracing::info!(app_env = ?config.app_env, trust_days, "2FAサービスを初期化");

        Ok(Self {
            config: Arc::new(config),
            two_factor_store,
            totp_service,
            cipher,
            trust_service,
        })
    }
}
