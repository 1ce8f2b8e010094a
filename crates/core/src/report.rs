use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::{TokenCatalog, TokenDefinition};
use crate::domain::grant::{normalize_handle, Grant};
use crate::errors::StoreError;
use crate::period::OrgCalendar;
use crate::store::GrantStore;

/// What one user gave and received this quarter, including private grants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersonalSummary {
    pub user: String,
    /// Oldest first.
    pub given: Vec<Grant>,
    /// Catalog tokens not yet given since the start of the month.
    pub still_to_give: Vec<TokenDefinition>,
    /// Oldest first.
    pub received: Vec<Grant>,
}

/// Every public grant this quarter, most recent first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicReport {
    pub since: DateTime<Utc>,
    pub grants: Vec<Grant>,
}

pub struct ReportService {
    catalog: Arc<TokenCatalog>,
    calendar: OrgCalendar,
    store: Arc<dyn GrantStore>,
}

impl ReportService {
    pub fn new(catalog: Arc<TokenCatalog>, calendar: OrgCalendar, store: Arc<dyn GrantStore>) -> Self {
        Self { catalog, calendar, store }
    }

    pub async fn personal_summary(
        &self,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<PersonalSummary, StoreError> {
        let user = normalize_handle(user);
        let quarter = self.calendar.quarter_start(now);
        let month = self.calendar.month_start(now);

        let given: Vec<Grant> = self
            .store
            .given_since(&user, None, quarter)
            .await?
            .into_iter()
            .map(|stored| stored.grant)
            .collect();

        let given_this_month: HashSet<&str> = given
            .iter()
            .filter(|grant| grant.timestamp >= month)
            .map(|grant| grant.token_id.as_str())
            .collect();

        let still_to_give = self
            .catalog
            .list_tokens()
            .iter()
            .filter(|token| !given_this_month.contains(token.id.as_str()))
            .cloned()
            .collect();

        let received = self
            .store
            .received_since(&user, quarter)
            .await?
            .into_iter()
            .map(|stored| stored.grant)
            .collect();

        Ok(PersonalSummary { user, given, still_to_give, received })
    }

    pub async fn public_report(&self, now: DateTime<Utc>) -> Result<PublicReport, StoreError> {
        let since = self.calendar.quarter_start(now);
        let mut grants: Vec<Grant> = self
            .store
            .list(Some(since))
            .await?
            .into_iter()
            .map(|stored| stored.grant)
            .filter(|grant| !grant.private)
            .collect();
        grants.reverse();
        Ok(PublicReport { since, grants })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::ReportService;
    use crate::catalog::TokenCatalog;
    use crate::domain::grant::Grant;
    use crate::period::OrgCalendar;
    use crate::store::testing::VecStore;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, month, day, 17, 0, 0).single().expect("valid utc")
    }

    fn service(grants: Vec<Grant>) -> ReportService {
        ReportService::new(
            Arc::new(TokenCatalog::default()),
            OrgCalendar::default(),
            Arc::new(VecStore::with(grants)),
        )
    }

    #[tokio::test]
    async fn personal_summary_splits_given_remaining_and_received() {
        let service = service(vec![
            Grant::new("@alice", "@bob", "token-life", "vacation", false, at(1, 20)),
            Grant::new("@alice", "@bob", "token-data", "charts", true, at(3, 2)),
            Grant::new("@alice", "@carol", "token-honesty", "feedback", false, at(2, 10)),
            Grant::new("@bob", "@alice", "token-customer", "support rota", true, at(2, 12)),
            Grant::new("@carol", "@alice", "token-freedom", "old news", false, at(1, 5)),
        ]);

        let summary = service.personal_summary("alice", at(3, 14)).await.expect("summary");

        assert_eq!(summary.user, "@alice");
        let given: Vec<&str> = summary.given.iter().map(|g| g.token_id.as_str()).collect();
        assert_eq!(given, vec!["token-honesty", "token-data"]);

        let remaining: Vec<&str> =
            summary.still_to_give.iter().map(|token| token.id.as_str()).collect();
        assert_eq!(remaining.len(), 7);
        assert!(!remaining.contains(&"token-data"));
        assert!(remaining.contains(&"token-honesty"));

        assert_eq!(summary.received.len(), 1);
        assert_eq!(summary.received[0].giver, "@bob");
    }

    #[tokio::test]
    async fn public_report_hides_private_and_lists_newest_first() {
        let service = service(vec![
            Grant::new("@alice", "@bob", "token-life", "vacation", false, at(2, 3)),
            Grant::new("@alice", "@bob", "token-data", "charts", true, at(3, 2)),
            Grant::new("@dave", "@carol", "token-honesty", "feedback", false, at(3, 10)),
            Grant::new("@carol", "@alice", "token-freedom", "last quarter", false, at(1, 5)),
        ]);

        let report = service.public_report(at(3, 14)).await.expect("report");

        let reasons: Vec<&str> = report.grants.iter().map(|g| g.reason.as_str()).collect();
        assert_eq!(reasons, vec!["feedback", "vacation"]);
    }
}
