use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use tokenbot_core::domain::grant::{Grant, GrantId, StoredGrant};
use tokenbot_core::errors::StoreError;
use tokenbot_core::period::QuotaPeriod;
use tokenbot_core::store::GrantStore;

use super::RepositoryError;
use crate::DbPool;

const SELECT_COLUMNS: &str =
    "SELECT id, giver, recipient, token_id, reason, is_private, granted_at FROM grant_record";

pub struct SqlGrantRepository {
    pool: DbPool,
}

impl SqlGrantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM grant_record")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn fetch(
        &self,
        filter: &str,
        binds: &[String],
    ) -> Result<Vec<StoredGrant>, RepositoryError> {
        let sql = format!("{SELECT_COLUMNS} {filter} ORDER BY granted_at ASC, id ASC");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_grant).collect()
    }
}

/// Fixed-width UTC rendering so lexical order in sqlite matches time order.
fn encode_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn row_to_grant(row: &sqlx::sqlite::SqliteRow) -> Result<StoredGrant, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let giver: String =
        row.try_get("giver").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recipient: String =
        row.try_get("recipient").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let token_id: String =
        row.try_get("token_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reason: String =
        row.try_get("reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_private: bool =
        row.try_get("is_private").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let granted_at_str: String =
        row.try_get("granted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let granted_at = DateTime::parse_from_rfc3339(&granted_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("granted_at `{granted_at_str}`: {e}")))?;

    Ok(StoredGrant {
        id: GrantId(id),
        grant: Grant::new(giver, recipient, token_id, reason, is_private, granted_at),
    })
}

#[async_trait]
impl GrantStore for SqlGrantRepository {
    async fn given_since(
        &self,
        giver: &str,
        token_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredGrant>, StoreError> {
        let grants = match token_id {
            Some(token_id) => {
                self.fetch(
                    "WHERE giver = ? AND token_id = ? AND granted_at >= ?",
                    &[giver.to_string(), token_id.to_string(), encode_timestamp(since)],
                )
                .await?
            }
            None => {
                self.fetch(
                    "WHERE giver = ? AND granted_at >= ?",
                    &[giver.to_string(), encode_timestamp(since)],
                )
                .await?
            }
        };
        Ok(grants)
    }

    async fn received_since(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredGrant>, StoreError> {
        Ok(self
            .fetch(
                "WHERE recipient = ? AND granted_at >= ?",
                &[recipient.to_string(), encode_timestamp(since)],
            )
            .await?)
    }

    async fn list(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredGrant>, StoreError> {
        let grants = match since {
            Some(since) => self.fetch("WHERE granted_at >= ?", &[encode_timestamp(since)]).await?,
            None => self.fetch("", &[]).await?,
        };
        Ok(grants)
    }

    async fn insert(&self, grant: &Grant, period: &QuotaPeriod) -> Result<GrantId, StoreError> {
        let id = GrantId::generate();

        sqlx::query(
            "INSERT INTO grant_record (id, giver, recipient, token_id, reason, is_private,
                                       granted_at, quota_period)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(&grant.giver)
        .bind(&grant.recipient)
        .bind(&grant.token_id)
        .bind(&grant.reason)
        .bind(grant.private)
        .bind(encode_timestamp(grant.timestamp))
        .bind(&period.key)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        Ok(id)
    }
}
