use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;

use crate::error::AppError;

/// 開発環境専用のフォールバックシークレット（本番では使用禁止）
pub const DEV_FALLBACK_SECRET: &str = "dev-secret-change-me";

/// 実行環境
///
/// 本番のみ信頼トークンをクライアントIPに紐付ける。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Production,
    #[default]
    Development,
}

impl AppEnv {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub app_env: AppEnv,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    /// シークレット暗号化と信頼トークン署名の共有シークレット
    #[serde(default)]
    pub two_factor_secret: Option<SecretBox<String>>,
    /// 信頼トークン（2FA済みデバイス）の有効日数（1〜365）
    #[serde(default = "default_trust_token_days")]
    pub trust_token_days: u16,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TOTP_ISSUER: &str = "Anbudsmarkedet";
const DEFAULT_TRUST_TOKEN_DAYS: u16 = 14;
const MAX_TRUST_TOKEN_DAYS: u16 = 365;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_totp_issuer() -> String {
    DEFAULT_TOTP_ISSUER.to_string()
}

fn default_trust_token_days() -> u16 {
    DEFAULT_TRUST_TOKEN_DAYS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// 起動前の設定検証（DB接続より先に呼ぶ）
    pub fn validate(&self) -> Result<(), AppError> {
        self.two_factor_secret()?;
        self.trust_token_days()?;
        Ok(())
    }

    /// 信頼トークンの有効日数
    ///
    /// 0 日だと発行直後のトークンが失効するため拒否する。
    pub fn trust_token_days(&self) -> Result<u16, AppError> {
        if !(1..=MAX_TRUST_TOKEN_DAYS).contains(&self.trust_token_days) {
            tracing::error!(
                trust_token_days = self.trust_token_days,
                max = MAX_TRUST_TOKEN_DAYS,
                "TRUST_TOKEN_DAYS が範囲外"
            );
            return Err(AppError::Configuration(format!(
                "TRUST_TOKEN_DAYS must be between 1 and {}",
                MAX_TRUST_TOKEN_DAYS
            )));
        }
        Ok(self.trust_token_days)
    }

    /// 2FA 共有シークレットを解決
    ///
    /// 本番で未設定の場合は起動エラー。開発環境ではフォールバック値を使う。
    pub fn two_factor_secret(&self) -> Result<&str, AppError> {
        match &self.two_factor_secret {
            Some(secret) if !secret.expose_secret().is_empty() => {
                Ok(secret.expose_secret().as_str())
            }
            _ if self.app_env.is_production() => {
                tracing::error!("本番環境で TWO_FACTOR_SECRET が未設定");
                Err(AppError::Configuration(
                    "TWO_FACTOR_SECRET must be set in production".to_string(),
                ))
            }
            _ => {
                tracing::warn!("TWO_FACTOR_SECRET 未設定: 開発用シークレットを使用");
                Ok(DEV_FALLBACK_SECRET)
            }
        }
    }
}
