use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::catalog::TokenCatalog;
use crate::domain::grant::{Grant, GrantContext, StoredGrant};
use crate::errors::{GrantError, GrantRuleViolation, StoreError};
use crate::notify::{FanoutReport, NotificationFanout};
use crate::parser::parse_grant;
use crate::store::GrantStore;
use crate::validator::GrantValidator;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantOutcome {
    pub stored: StoredGrant,
    pub fanout: FanoutReport,
}

/// Parse, validate, persist, notify.
pub struct GrantService {
    catalog: Arc<TokenCatalog>,
    validator: GrantValidator,
    store: Arc<dyn GrantStore>,
    fanout: Arc<NotificationFanout>,
}

impl GrantService {
    pub fn new(
        catalog: Arc<TokenCatalog>,
        validator: GrantValidator,
        store: Arc<dyn GrantStore>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        Self { catalog, validator, store, fanout }
    }

    pub fn catalog(&self) -> &TokenCatalog {
        &self.catalog
    }

    pub async fn grant(
        &self,
        text: &str,
        invoker: &str,
        context: &GrantContext,
    ) -> Result<GrantOutcome, GrantError> {
        self.grant_at(text, invoker, context, Utc::now()).await
    }

    pub async fn grant_at(
        &self,
        text: &str,
        invoker: &str,
        context: &GrantContext,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, GrantError> {
        let grant = parse_grant(text, invoker, &self.catalog, now)?;
        self.validator.validate(&grant, self.store.as_ref()).await?;

        let period = self.validator.calendar().quota_period(grant.timestamp);
        let id = match self.store.insert(&grant, &period).await {
            Ok(id) => id,
            Err(StoreError::Conflict(detail)) => {
                warn!(
                    event_name = "grant.quota.race_lost",
                    giver = %grant.giver,
                    token_id = %grant.token_id,
                    quota_period = %period.key,
                    detail = %detail,
                    "concurrent grant claimed the monthly quota first"
                );
                return Err(self.quota_conflict(&grant, period.start).await.into());
            }
            Err(store_error) => {
                error!(
                    event_name = "grant.persist.failed",
                    giver = %grant.giver,
                    token_id = %grant.token_id,
                    error = %store_error,
                    "failed to persist grant"
                );
                return Err(store_error.into());
            }
        };

        info!(
            event_name = "grant.accepted",
            grant_id = %id,
            giver = %grant.giver,
            recipient = %grant.recipient,
            token_id = %grant.token_id,
            private = grant.private,
            "grant persisted"
        );

        let stored = StoredGrant { id, grant };
        let fanout = self.fanout.notify(&stored, context).await;
        Ok(GrantOutcome { stored, fanout })
    }

    async fn quota_conflict(&self, grant: &Grant, since: DateTime<Utc>) -> GrantRuleViolation {
        let recipient = match self.store.given_since(&grant.giver, Some(&grant.token_id), since).await
        {
            Ok(prior) => prior.into_iter().next().map(|stored| stored.grant.recipient),
            Err(_) => None,
        };
        GrantRuleViolation::AlreadyGrantedThisMonth {
            token_id: grant.token_id.clone(),
            recipient: recipient.unwrap_or_else(|| grant.recipient.clone()),
        }
    }
}
