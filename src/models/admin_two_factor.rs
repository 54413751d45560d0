use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// 管理者の二要素認証（TOTP）シークレット
///
/// シークレットは [`SecretCipher`](crate::services::SecretCipher) の
/// エンベロープ形式で保存される。平文シークレットはログ出力禁止。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AdminTwoFactor {
    pub user_id: Uuid,
    #[serde(skip)]
    pub secret_encrypted: String,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
