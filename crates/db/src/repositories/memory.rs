use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tokenbot_core::domain::grant::{Grant, GrantId, StoredGrant};
use tokenbot_core::errors::StoreError;
use tokenbot_core::period::QuotaPeriod;
use tokenbot_core::store::GrantStore;

#[derive(Default)]
struct MemoryState {
    grants: Vec<StoredGrant>,
    quota_slots: HashSet<(String, String, String)>,
}

/// Grant store held in process memory. Enforces the same monthly quota slot
/// as the sql schema so both behave alike under concurrent grants.
#[derive(Default)]
pub struct InMemoryGrantRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryGrantRepository {
    async fn select(&self, keep: impl Fn(&Grant) -> bool) -> Vec<StoredGrant> {
        let state = self.state.read().await;
        let mut grants: Vec<StoredGrant> =
            state.grants.iter().filter(|stored| keep(&stored.grant)).cloned().collect();
        grants.sort_by(|a, b| a.grant.timestamp.cmp(&b.grant.timestamp).then(a.id.0.cmp(&b.id.0)));
        grants
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantRepository {
    async fn given_since(
        &self,
        giver: &str,
        token_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredGrant>, StoreError> {
        Ok(self
            .select(|grant| {
                grant.giver == giver
                    && token_id.map_or(true, |token_id| grant.token_id == token_id)
                    && grant.timestamp >= since
            })
            .await)
    }

    async fn received_since(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredGrant>, StoreError> {
        Ok(self.select(|grant| grant.recipient == recipient && grant.timestamp >= since).await)
    }

    async fn list(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredGrant>, StoreError> {
        Ok(self.select(|grant| since.map_or(true, |since| grant.timestamp >= since)).await)
    }

    async fn insert(&self, grant: &Grant, period: &QuotaPeriod) -> Result<GrantId, StoreError> {
        let mut state = self.state.write().await;
        let slot = (grant.giver.clone(), grant.token_id.clone(), period.key.clone());
        if !state.quota_slots.insert(slot) {
            return Err(StoreError::Conflict(format!(
                "{} already granted {} in {}",
                grant.giver, grant.token_id, period.key
            )));
        }

        let id = GrantId::generate();
        state.grants.push(StoredGrant { id: id.clone(), grant: grant.clone() });
        Ok(id)
    }
}
