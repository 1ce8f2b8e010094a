use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use tokenbot_core::catalog::TokenCatalog;
use tokenbot_core::errors::{GrantError, StoreError};
use tokenbot_core::report::{PersonalSummary, PublicReport, ReportService};
use tokenbot_core::workflow::GrantService;
use tokenbot_slack::blocks::MessageTemplate;
use tokenbot_slack::dialog::{grant_dialog, DialogDefaults};
use tokenbot_slack::{
    InteractionService, Invoker, SlackApi, SlackApiError, TokenCommandService, UserDirectory,
};

/// The production command service: grants and reports from the core, dialogs
/// and lookups from Slack.
pub struct TokenbotService {
    catalog: Arc<TokenCatalog>,
    grants: GrantService,
    reports: ReportService,
    api: Arc<dyn SlackApi>,
    directory: UserDirectory,
}

impl TokenbotService {
    pub fn new(
        catalog: Arc<TokenCatalog>,
        grants: GrantService,
        reports: ReportService,
        api: Arc<dyn SlackApi>,
        directory: UserDirectory,
    ) -> Self {
        Self { catalog, grants, reports, api, directory }
    }
}

#[async_trait]
impl TokenCommandService for TokenbotService {
    fn catalog(&self) -> &TokenCatalog {
        &self.catalog
    }

    async fn grant(&self, text: &str, invoker: &Invoker) -> Result<(), GrantError> {
        let outcome = self.grants.grant(text, &invoker.handle(), &invoker.grant_context()).await?;
        info!(
            event_name = "grant.fanout.completed",
            grant_id = %outcome.stored.id.0,
            attempted = outcome.fanout.deliveries.len(),
            failed = outcome.fanout.failures(),
            "grant notifications attempted"
        );
        Ok(())
    }

    async fn personal_summary(&self, invoker: &Invoker) -> Result<PersonalSummary, StoreError> {
        self.reports.personal_summary(&invoker.handle(), Utc::now()).await
    }

    async fn public_report(&self) -> Result<PublicReport, StoreError> {
        self.reports.public_report(Utc::now()).await
    }

    async fn open_dialog(
        &self,
        trigger_id: &str,
        defaults: DialogDefaults,
    ) -> Result<(), SlackApiError> {
        let dialog = grant_dialog(&self.catalog, &defaults);
        self.api.open_dialog(trigger_id, &dialog).await
    }
}

#[async_trait]
impl InteractionService for TokenbotService {
    async fn user_name(&self, user_id: &str) -> Result<String, SlackApiError> {
        self.directory.name_for(user_id).await
    }

    async fn user_id_for(&self, handle: &str) -> Result<Option<String>, SlackApiError> {
        self.directory.user_id_for(handle).await
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.api.post_ephemeral(channel_id, user_id, message).await
    }
}


#[cfg(test)]
mod tests {
    use tokenbot_core::errors::{GrantError, GrantRuleViolation};
    use tokenbot_core::store::GrantStore;
    use tokenbot_slack::dialog::{DialogDefaults, RECIPIENT_ELEMENT};
    use tokenbot_slack::{InteractionService, Invoker, TokenCommandService};

    use super::testing::{harness, SlackCall};

    fn alice() -> Invoker {
        Invoker {
            user_id: "U1".to_owned(),
            user_name: "alice".to_owned(),
            channel_id: "C1".to_owned(),
            channel_name: "general".to_owned(),
            trigger_id: "trigger-1".to_owned(),
        }
    }

    #[tokio::test]
    async fn grant_persists_and_notifies_through_slack() {
        let harness = harness();

        harness
            .service
            .grant(":token-data: @bob great job on the launch", &alice())
            .await
            .expect("grant");

        let stored = harness.store.list(None).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].grant.giver, "@alice");
        assert_eq!(stored[0].grant.recipient, "@bob");

        let channels: Vec<String> = harness
            .slack
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SlackCall::Message { channel, .. } => Some(channel),
                _ => None,
            })
            .collect();
        assert_eq!(channels, vec!["U1", "U2", "#token-announcements", "#general"]);
    }

    #[tokio::test]
    async fn second_grant_of_the_month_is_a_rule_violation() {
        let harness = harness();
        let service = &harness.service;
        service.grant(":token-data: @bob first", &alice()).await.expect("first grant");

        let error = service.grant(":token-data: @bob again", &alice()).await.expect_err("quota");
        assert!(matches!(
            error,
            GrantError::Rule(GrantRuleViolation::AlreadyGrantedThisMonth { .. })
        ));
    }

    #[tokio::test]
    async fn reports_include_the_new_grant() {
        let harness = harness();
        let service = &harness.service;
        service.grant(":token-data: @bob shipped it", &alice()).await.expect("grant");

        let summary = service.personal_summary(&alice()).await.expect("summary");
        assert_eq!(summary.given.len(), 1);
        assert!(summary.still_to_give.iter().all(|token| token.id != "token-data"));

        let report = service.public_report().await.expect("report");
        assert_eq!(report.grants.len(), 1);
    }

    #[tokio::test]
    async fn dialogs_and_lookups_go_to_slack() {
        let harness = harness();
        let service = &harness.service;

        let defaults = DialogDefaults { recipient_user_id: Some("U2".to_owned()), token_id: None };
        service.open_dialog("trigger-1", defaults).await.expect("dialog");
        let Some(SlackCall::Dialog { trigger_id, dialog }) = harness.slack.calls().pop() else {
            panic!("expected a dialog call");
        };
        assert_eq!(trigger_id, "trigger-1");
        let recipient = dialog.element(RECIPIENT_ELEMENT).expect("recipient element");
        assert_eq!(recipient.value(), Some("U2"));

        assert_eq!(service.user_name("U2").await.expect("name"), "bob");
        assert_eq!(service.user_id_for("@alice").await.expect("lookup").as_deref(), Some("U1"));
    }
}
