use tracing::debug;

use crate::domain::grant::Grant;
use crate::errors::{GrantError, GrantRuleViolation};
use crate::period::OrgCalendar;
use crate::store::GrantStore;

/// Applies the business rules a structurally valid grant must still pass.
///
/// The check reads history and never writes, so on its own it cannot stop two
/// concurrent grants of the same token. Stores that enforce the quota on insert
/// close that gap.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrantValidator {
    calendar: OrgCalendar,
}

impl GrantValidator {
    pub fn new(calendar: OrgCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &OrgCalendar {
        &self.calendar
    }

    pub async fn validate(
        &self,
        grant: &Grant,
        history: &dyn GrantStore,
    ) -> Result<(), GrantError> {
        if grant.is_self_grant() {
            return Err(GrantRuleViolation::SelfGrant.into());
        }

        let since = self.calendar.month_start(grant.timestamp);
        let prior = history.given_since(&grant.giver, Some(&grant.token_id), since).await?;

        if let Some(previous) = prior.first() {
            debug!(
                event_name = "grant.quota.exhausted",
                giver = %grant.giver,
                token_id = %grant.token_id,
                previous_id = %previous.id,
                "giver already granted this token this month"
            );
            return Err(GrantRuleViolation::AlreadyGrantedThisMonth {
                token_id: grant.token_id.clone(),
                recipient: previous.grant.recipient.clone(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::GrantValidator;
    use crate::domain::grant::Grant;
    use crate::errors::{GrantError, GrantRuleViolation};
    use crate::store::testing::VecStore;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 17, 0, 0).single().expect("valid utc")
    }

    fn grant(recipient: &str, token: &str, timestamp: DateTime<Utc>) -> Grant {
        Grant::new("@alice", recipient, token, "shipped it", false, timestamp)
    }

    #[tokio::test]
    async fn self_grant_rejected_regardless_of_history() {
        let validator = GrantValidator::default();
        let store = VecStore::default();

        let result = validator.validate(&grant("@alice", "token-data", at(2016, 3, 10)), &store).await;
        assert_eq!(result, Err(GrantError::Rule(GrantRuleViolation::SelfGrant)));
    }

    #[tokio::test]
    async fn second_grant_of_same_token_this_month_rejected() {
        let validator = GrantValidator::default();
        let store = VecStore::with(vec![grant("@carol", "token-data", at(2016, 3, 2))]);

        let result = validator.validate(&grant("@bob", "token-data", at(2016, 3, 20)), &store).await;
        assert_eq!(
            result,
            Err(GrantError::Rule(GrantRuleViolation::AlreadyGrantedThisMonth {
                token_id: "token-data".to_owned(),
                recipient: "@carol".to_owned(),
            }))
        );
    }

    #[tokio::test]
    async fn other_token_or_previous_month_is_accepted() {
        let validator = GrantValidator::default();
        let store = VecStore::with(vec![
            grant("@carol", "token-life", at(2016, 3, 2)),
            grant("@carol", "token-data", at(2016, 2, 27)),
        ]);

        let result = validator.validate(&grant("@bob", "token-data", at(2016, 3, 20)), &store).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn other_givers_do_not_consume_the_quota() {
        let validator = GrantValidator::default();
        let store = VecStore::with(vec![Grant::new(
            "@dave",
            "@bob",
            "token-data",
            "also shipped",
            false,
            at(2016, 3, 3),
        )]);

        let result = validator.validate(&grant("@bob", "token-data", at(2016, 3, 20)), &store).await;
        assert_eq!(result, Ok(()));
    }
}
