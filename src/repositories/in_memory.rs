//! プロセス内の2FAシークレット保存先
//!
//! 開発環境と、DB を用意しないテストで使う。再起動で内容は失われる。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::AdminTwoFactor;
use crate::repositories::TwoFactorStore;

#[derive(Clone, Default)]
pub struct InMemoryTwoFactorStore {
    records: Arc<RwLock<HashMap<Uuid, AdminTwoFactor>>>,
}

impl InMemoryTwoFactorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TwoFactorStore for InMemoryTwoFactorStore {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<AdminTwoFactor>, sqlx::Error> {
        Ok(self.records.read().await.get(&user_id).cloned())
    }

    async fn upsert(&self, user_id: Uuid, secret_encrypted: &str) -> Result<(), sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.records.write().await;

        records
            .entry(user_id)
            .and_modify(|record| {
                record.secret_encrypted = secret_encrypted.to_string();
                record.enabled = false;
                record.updated_at = now;
            })
            .or_insert_with(|| AdminTwoFactor {
                user_id,
                secret_encrypted: secret_encrypted.to_string(),
                enabled: false,
                created_at: now,
                updated_at: now,
            });

        Ok(())
    }

    async fn enable(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        if let Some(record) = self.records.write().await.get_mut(&user_id) {
            record.enabled = true;
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}
