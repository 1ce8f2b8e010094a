use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::grant::{Grant, GrantId, StoredGrant};
use crate::errors::StoreError;
use crate::period::QuotaPeriod;

/// Grant history queries plus the single persist operation.
///
/// Query results are ordered oldest first and bounds are inclusive.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn given_since(
        &self,
        giver: &str,
        token_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredGrant>, StoreError>;

    async fn received_since(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredGrant>, StoreError>;

    async fn list(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredGrant>, StoreError>;

    /// Persists `grant` under its quota period. Implementations that can
    /// enforce the monthly quota atomically return `StoreError::Conflict` when
    /// the (giver, token, period) slot is already taken.
    async fn insert(&self, grant: &Grant, period: &QuotaPeriod) -> Result<GrantId, StoreError>;
}
