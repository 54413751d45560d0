use std::net::{IpAddr, Ipv4Addr};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

/// 非本番環境で IP の代わりに埋め込む値
pub const ANY_IP_SENTINEL: &str = "any";

const SECONDS_PER_DAY: i64 = 86_400;

/// 信頼トークンのクレーム
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustClaims {
    pub uid: Uuid,
    pub ip: String,
    /// 有効期限（Unix秒）
    pub exp: i64,
}

/// 2FA 済みデバイスの信頼トークン（HS256 署名）
///
/// `header.payload.signature` の3セグメント。2FA 成功時に発行し、
/// HttpOnly Cookie として保存される。期限内は再検証を省略できる。
///
/// # Security
/// - 本番ではクライアントIPに紐付け、盗まれた Cookie の別ネットワークからの再利用を防ぐ
/// - 開発環境では NAT/プロキシ越しの誤拒否を避けるため IP を固定値にする
/// - トークンはログに出力しない
#[derive(Clone)]
pub struct TrustTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    bind_ip: bool,
    valid_days: u16,
}

impl TrustTokenService {
    /// # Arguments
    /// * `secret` - HMAC 署名鍵
    /// * `bind_ip` - クライアントIPへの紐付け（本番のみ true）
    /// * `valid_days` - 有効日数
    pub fn new(secret: &str, bind_ip: bool, valid_days: u16) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // 期限は verify_at で注入時刻と比較する
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            bind_ip,
            valid_days,
        }
    }

    pub fn valid_days(&self) -> u16 {
        self.valid_days
    }

    /// 現在時刻で信頼トークンを発行
    pub fn sign(&self, uid: Uuid, ip: &str) -> Result<String, AppError> {
        self.sign_at(uid, ip, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// 指定時刻（Unix秒）を発行時刻として信頼トークンを発行
    pub fn sign_at(&self, uid: Uuid, ip: &str, now: i64) -> Result<String, AppError> {
        let exp = i64::from(self.valid_days)
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|lifetime| now.checked_add(lifetime))
            .ok_or_else(|| {
                tracing::error!(
                    now,
                    valid_days = self.valid_days,
                    "信頼トークンの有効期限がオーバーフロー"
                );
                AppError::Internal(anyhow::anyhow!("trust token expiry overflow"))
            })?;

        let claims = TrustClaims {
            uid,
            ip: if self.bind_ip {
                normalize_ip(ip)
            } else {
                ANY_IP_SENTINEL.to_string()
            },
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "信頼トークンの署名に失敗");
            AppError::Internal(anyhow::anyhow!("trust token signing error"))
        })
    }

    /// 現在時刻で信頼トークンを検証
    pub fn verify(&self, token: &str, current_ip: &str) -> Option<TrustClaims> {
        self.verify_at(token, current_ip, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// 指定時刻（Unix秒）で信頼トークンを検証
    ///
    /// 署名不一致・期限切れ・（本番のみ）IP不一致・形式不正はすべて `None`。
    /// 署名比較は定数時間。
    pub fn verify_at(&self, token: &str, current_ip: &str, now: i64) -> Option<TrustClaims> {
        if token.split('.').count() != 3 {
            return None;
        }

        let claims = match decode::<TrustClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "信頼トークンの検証に失敗");
                return None;
            }
        };

        if claims.exp < now {
            tracing::debug!(uid = %claims.uid, "信頼トークンの期限切れ");
            return None;
        }

        if self.bind_ip && claims.ip != normalize_ip(current_ip) {
            tracing::warn!(uid = %claims.uid, "信頼トークンのIP不一致");
            return None;
        }

        Some(claims)
    }
}

/// クライアントIPを正規化
///
/// カンマ区切り（X-Forwarded-For）の先頭を採用し、IPv6 ループバックと
/// IPv4射影アドレスを IPv4 表記に揃える。空ならループバック。
pub fn normalize_ip(raw: &str) -> String {
    let first = raw.split(',').next().unwrap_or_default().trim();
    if first.is_empty() {
        return Ipv4Addr::LOCALHOST.to_string();
    }

    match first.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) if v6.is_loopback() => Ipv4Addr::LOCALHOST.to_string(),
        Ok(ip) => ip.to_canonical().to_string(),
        Err(_) => first.to_string(),
    }
}
