use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::AdminTwoFactor;

/// 管理者2FAシークレットの保存先
#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    /// ユーザーIDで2FAシークレットを検索
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<AdminTwoFactor>, sqlx::Error>;

    /// 2FAシークレットを登録（既存があれば上書きし enabled = false に戻す）
    async fn upsert(&self, user_id: Uuid, secret_encrypted: &str) -> Result<(), sqlx::Error>;

    /// 2FAを有効化
    async fn enable(&self, user_id: Uuid) -> Result<(), sqlx::Error>;
}

/// `admin_two_factor` テーブル
///
/// ```sql
/// CREATE TABLE admin_two_factor (
///     user_id          UUID PRIMARY KEY,
///     secret_encrypted TEXT NOT NULL,
///     enabled          BOOLEAN NOT NULL DEFAULT false,
///     created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
#[derive(Clone)]
pub struct AdminTwoFactorRepository {
    pool: PgPool,
}

impl AdminTwoFactorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TwoFactorStore for AdminTwoFactorRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<AdminTwoFactor>, sqlx::Error> {
        sqlx::query_as::<_, AdminTwoFactor>(
            r#"
            SELECT user_id, secret_encrypted, enabled, created_at, updated_at
            FROM admin_two_factor
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// # Note
    /// 登録・再登録時は enabled = false
    /// 最初のコード検証成功後に enable() を呼び出す
    async fn upsert(&self, user_id: Uuid, secret_encrypted: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO admin_two_factor (user_id, secret_encrypted)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET secret_encrypted = EXCLUDED.secret_encrypted,
                enabled = false,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(secret_encrypted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn enable(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE admin_two_factor
            SET enabled = true, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
