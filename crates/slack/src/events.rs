use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use tokenbot_core::domain::grant::GrantFollowUp;
use tokenbot_core::notify::{GRANT_BACK_ACTION, JOIN_ACTION};

use crate::{
    blocks::{self, MessageTemplate},
    client::SlackApiError,
    commands::{
        application_error, CommandParseError, CommandResponse, CommandRouteError, CommandRouter,
        Invoker, SlashCommandPayload, TokenCommandService,
    },
    dialog::{DialogDefaults, DialogErrors, DialogSubmission, DIALOG_CALLBACK_ID},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PayloadUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PayloadChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DialogSubmissionPayload {
    #[serde(default)]
    pub token: String,
    pub callback_id: String,
    pub user: PayloadUser,
    #[serde(default)]
    pub channel: PayloadChannel,
    pub submission: DialogSubmission,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BlockAction {
    pub action_id: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BlockActionsPayload {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub trigger_id: String,
    pub user: PayloadUser,
    #[serde(default)]
    pub channel: PayloadChannel,
    #[serde(default)]
    pub actions: Vec<BlockAction>,
}

/// JSON carried in the `payload` form field of an interactivity request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractivePayload {
    DialogSubmission(DialogSubmissionPayload),
    BlockActions(BlockActionsPayload),
    #[serde(other)]
    Unsupported,
}

impl InteractivePayload {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn token(&self) -> &str {
        match self {
            Self::DialogSubmission(payload) => &payload.token,
            Self::BlockActions(payload) => &payload.token,
            Self::Unsupported => "",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    Interaction(InteractivePayload),
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::Interaction(InteractivePayload::DialogSubmission(_)) => {
                SlackEventType::DialogSubmission
            }
            Self::Interaction(InteractivePayload::BlockActions(_)) => SlackEventType::BlockActions,
            Self::Interaction(InteractivePayload::Unsupported) => SlackEventType::Unsupported,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Self::SlashCommand(payload) => &payload.token,
            Self::Interaction(payload) => payload.token(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    DialogSubmission,
    BlockActions,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    /// Keeps the dialog open with inline errors.
    Rejected(DialogErrors),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

impl From<SlackApiError> for EventHandlerError {
    fn from(value: SlackApiError) -> Self {
        Self::Route(value.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&event.event_type()) else {
            debug!(
                event_name = "slack.event.ignored",
                correlation_id = %ctx.correlation_id,
                event_type = ?event.event_type(),
                "no handler registered"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers the slash command, dialog and button handlers around one shared
/// service.
pub fn token_dispatcher<S>(command: &str, service: Arc<S>) -> EventDispatcher
where
    S: InteractionService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(command, Arc::clone(&service)));
    dispatcher.register(DialogSubmissionHandler::new(command, Arc::clone(&service)));
    dispatcher.register(BlockActionsHandler::new(service));
    dispatcher
}

/// Lookups and side channels the interactive flow needs beyond the slash
/// command service.
#[async_trait]
pub trait InteractionService: TokenCommandService {
    async fn user_name(&self, user_id: &str) -> Result<String, SlackApiError>;

    async fn user_id_for(&self, handle: &str) -> Result<Option<String>, SlackApiError>;

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;
}

#[async_trait]
impl<T> InteractionService for Arc<T>
where
    T: InteractionService + ?Sized,
{
    async fn user_name(&self, user_id: &str) -> Result<String, SlackApiError> {
        (**self).user_name(user_id).await
    }

    async fn user_id_for(&self, handle: &str) -> Result<Option<String>, SlackApiError> {
        (**self).user_id_for(handle).await
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        (**self).post_ephemeral(channel_id, user_id, message).await
    }
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: TokenCommandService,
{
    pub fn new(command: &str, service: S) -> Self {
        Self { router: CommandRouter::new(command, service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: TokenCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = event else {
            return Ok(HandlerResult::Ignored);
        };

        self.router.accepts(payload)?;
        Ok(match self.router.route(payload, &ctx.correlation_id).await {
            CommandResponse::Message(message) => HandlerResult::Responded(message),
            CommandResponse::Acknowledged => HandlerResult::Processed,
        })
    }
}

pub struct DialogSubmissionHandler<S> {
    command: String,
    service: S,
}

impl<S> DialogSubmissionHandler<S>
where
    S: InteractionService,
{
    pub fn new(command: &str, service: S) -> Self {
        Self { command: command.to_owned(), service }
    }
}

#[async_trait]
impl<S> EventHandler for DialogSubmissionHandler<S>
where
    S: InteractionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::DialogSubmission
    }

    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Interaction(InteractivePayload::DialogSubmission(payload)) = event else {
            return Ok(HandlerResult::Ignored);
        };
        if payload.callback_id != DIALOG_CALLBACK_ID {
            return Ok(HandlerResult::Ignored);
        }

        let invoker = Invoker {
            user_id: payload.user.id.clone(),
            user_name: payload.user.name.clone(),
            channel_id: payload.channel.id.clone(),
            channel_name: payload.channel.name.clone(),
            trigger_id: String::new(),
        };
        let recipient_name =
            self.service.user_name(payload.submission.recipient_user_id()).await?;
        let text = payload.submission.command_text(&recipient_name);
        info!(
            event_name = "slack.dialog.submitted",
            correlation_id = %ctx.correlation_id,
            user = %invoker.handle(),
            "grant dialog submitted"
        );

        let grant_error = match self.service.grant(&text, &invoker).await {
            Ok(()) => return Ok(HandlerResult::Processed),
            Err(grant_error) => grant_error,
        };

        if let Some(field) = grant_error.rule_field() {
            return Ok(HandlerResult::Rejected(DialogErrors::single(field, grant_error.to_string())));
        }

        let message = if grant_error.is_user_facing() {
            blocks::grant_error_message(&self.command, &text, &grant_error)
        } else {
            error!(
                event_name = "slack.dialog.failed",
                correlation_id = %ctx.correlation_id,
                user = %invoker.handle(),
                error = %grant_error,
                "dialog grant failed"
            );
            let interface = application_error(grant_error.into()).into_interface(&ctx.correlation_id);
            blocks::error_message(interface.user_message(), interface.correlation_id())
        };

        if let Err(post_error) =
            self.service.post_ephemeral(&invoker.channel_id, &invoker.user_id, &message).await
        {
            warn!(
                event_name = "slack.dialog.reply_failed",
                correlation_id = %ctx.correlation_id,
                error = %post_error,
                "could not tell the user why the dialog grant failed"
            );
        }
        Ok(HandlerResult::Processed)
    }
}

pub struct BlockActionsHandler<S> {
    service: S,
}

impl<S> BlockActionsHandler<S>
where
    S: InteractionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionsHandler<S>
where
    S: InteractionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockActions
    }

    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Interaction(InteractivePayload::BlockActions(payload)) = event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(action) = payload.actions.first() else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(follow_up) = action.value.as_deref().and_then(GrantFollowUp::decode) else {
            debug!(
                event_name = "slack.action.undecodable",
                correlation_id = %ctx.correlation_id,
                action_id = %action.action_id,
                "button value is not a follow-up payload"
            );
            return Ok(HandlerResult::Ignored);
        };

        let defaults = match action.action_id.as_str() {
            GRANT_BACK_ACTION => {
                DialogDefaults { recipient_user_id: Some(follow_up.recipient), token_id: None }
            }
            JOIN_ACTION => {
                let recipient_user_id = self
                    .service
                    .user_id_for(&follow_up.recipient)
                    .await?
                    .unwrap_or(follow_up.recipient);
                DialogDefaults {
                    recipient_user_id: Some(recipient_user_id),
                    token_id: Some(follow_up.token_id).filter(|token| !token.is_empty()),
                }
            }
            _ => return Ok(HandlerResult::Ignored),
        };

        info!(
            event_name = "slack.action.reopen_dialog",
            correlation_id = %ctx.correlation_id,
            action_id = %action.action_id,
            user = %payload.user.name,
            "reopening grant dialog from button"
        );
        self.service.open_dialog(&payload.trigger_id, defaults).await?;
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use tokenbot_core::catalog::TokenCatalog;
    use tokenbot_core::errors::{GrantError, GrantRuleViolation, StoreError, ValidationError};
    use tokenbot_core::report::{PersonalSummary, PublicReport};

    use super::{
        token_dispatcher, EventContext, EventDispatcher, HandlerResult,
        InteractionService, InteractivePayload, SlackEvent, SlackEventType,
    };
    use crate::blocks::MessageTemplate;
    use crate::client::SlackApiError;
    use crate::commands::{Invoker, SlashCommandPayload, TokenCommandService};
    use crate::dialog::DialogDefaults;

    #[derive(Default)]
    struct ScriptedService {
        catalog: TokenCatalog,
        grant_error: Option<GrantError>,
        calls: Mutex<Vec<String>>,
        ephemeral: Mutex<Vec<MessageTemplate>>,
    }

    impl ScriptedService {
        fn failing(error: impl Into<GrantError>) -> Self {
            Self { grant_error: Some(error.into()), ..Self::default() }
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("lock").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl TokenCommandService for ScriptedService {
        fn catalog(&self) -> &TokenCatalog {
            &self.catalog
        }

        async fn grant(&self, text: &str, invoker: &Invoker) -> Result<(), GrantError> {
            self.record(format!("grant {} {text}", invoker.handle()));
            self.grant_error.clone().map_or(Ok(()), Err)
        }

        async fn personal_summary(&self, _invoker: &Invoker) -> Result<PersonalSummary, StoreError> {
            Err(StoreError::Backend("unused".to_owned()))
        }

        async fn public_report(&self) -> Result<PublicReport, StoreError> {
            Err(StoreError::Backend("unused".to_owned()))
        }

        async fn open_dialog(
            &self,
            trigger_id: &str,
            defaults: DialogDefaults,
        ) -> Result<(), SlackApiError> {
            self.record(format!(
                "dialog {trigger_id} {} {}",
                defaults.recipient_user_id.unwrap_or_default(),
                defaults.token_id.unwrap_or_default()
            ));
            Ok(())
        }
    }

    #[async_trait]
    impl InteractionService for ScriptedService {
        async fn user_name(&self, user_id: &str) -> Result<String, SlackApiError> {
            match user_id {
                "U2" => Ok("bob".to_owned()),
                _ => Err(SlackApiError::Api("user_not_found".to_owned())),
            }
        }

        async fn user_id_for(&self, handle: &str) -> Result<Option<String>, SlackApiError> {
            Ok((handle == "@bob").then(|| "U2".to_owned()))
        }

        async fn post_ephemeral(
            &self,
            channel_id: &str,
            user_id: &str,
            message: &MessageTemplate,
        ) -> Result<(), SlackApiError> {
            self.record(format!("ephemeral {channel_id} {user_id}"));
            self.ephemeral.lock().expect("lock").push(message.clone());
            Ok(())
        }
    }

    fn submission(private: &str, recipient: &str) -> SlackEvent {
        let raw = json!({
            "type": "dialog_submission",
            "token": "verify-me",
            "callback_id": "token_dialog_callback",
            "user": {"id": "U1", "name": "alice"},
            "channel": {"id": "C1", "name": "general"},
            "submission": {
                "tokenRecipient": recipient,
                "tokenType": ":token-data:",
                "tokenReason": "great charts",
                "tokenIsPrivate": private
            },
            "response_url": "https://hooks.slack.example/1"
        });
        SlackEvent::Interaction(InteractivePayload::parse(&raw.to_string()).expect("parse"))
    }

    fn button(action_id: &str, value: &str) -> SlackEvent {
        let raw = json!({
            "type": "block_actions",
            "token": "verify-me",
            "trigger_id": "trigger-9",
            "user": {"id": "U3", "username": "carol", "name": "carol"},
            "channel": {"id": "C1", "name": "general"},
            "actions": [{"action_id": action_id, "value": value, "type": "button"}]
        });
        SlackEvent::Interaction(InteractivePayload::parse(&raw.to_string()).expect("parse"))
    }

    #[test]
    fn payloads_parse_by_type() {
        let event = submission("true", "U2");
        assert_eq!(event.event_type(), SlackEventType::DialogSubmission);
        assert_eq!(event.token(), "verify-me");

        assert_eq!(button("join", "{}").event_type(), SlackEventType::BlockActions);

        let other = InteractivePayload::parse(r#"{"type":"view_closed","token":"x"}"#)
            .expect("unknown types still parse");
        assert_eq!(other, InteractivePayload::Unsupported);
        assert!(InteractivePayload::parse("not json").is_err());
    }

    #[tokio::test]
    async fn dispatcher_routes_slash_commands() {
        let service = Arc::new(ScriptedService::default());
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));
        let event = SlackEvent::SlashCommand(SlashCommandPayload {
            command: "/token".to_owned(),
            text: "help".to_owned(),
            ..SlashCommandPayload::default()
        });

        let result = dispatcher.dispatch(&event, &EventContext::default()).await.expect("dispatch");

        assert!(matches!(result, HandlerResult::Responded(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn dispatcher_rejects_foreign_slash_commands() {
        let service = Arc::new(ScriptedService::default());
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));
        let event = SlackEvent::SlashCommand(SlashCommandPayload {
            command: "/other".to_owned(),
            ..SlashCommandPayload::default()
        });

        assert!(dispatcher.dispatch(&event, &EventContext::default()).await.is_err());
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let result = dispatcher
            .dispatch(&submission("false", "U2"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn token_dispatcher_registers_handlers() {
        let dispatcher = token_dispatcher("/token", Arc::new(ScriptedService::default()));
        assert_eq!(dispatcher.handler_count(), 3);
    }

    #[tokio::test]
    async fn dialog_submission_grants_with_resolved_name() {
        let service = Arc::new(ScriptedService::default());
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));

        let result = dispatcher
            .dispatch(&submission("true", "U2"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(service.calls(), vec!["grant @alice :token-data: @bob great charts private"]);
    }

    #[tokio::test]
    async fn rule_violations_become_field_errors() {
        let service = Arc::new(ScriptedService::failing(GrantRuleViolation::SelfGrant));
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));
        let result = dispatcher
            .dispatch(&submission("false", "U2"), &EventContext::default())
            .await
            .expect("dispatch");
        let HandlerResult::Rejected(errors) = result else {
            panic!("expected field errors, got {result:?}");
        };
        assert_eq!(errors.errors[0].name, "tokenRecipient");

        let service = Arc::new(ScriptedService::failing(
            GrantRuleViolation::AlreadyGrantedThisMonth {
                token_id: "token-data".to_owned(),
                recipient: "@carol".to_owned(),
            },
        ));
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));
        let result = dispatcher
            .dispatch(&submission("false", "U2"), &EventContext::default())
            .await
            .expect("dispatch");
        let HandlerResult::Rejected(errors) = result else {
            panic!("expected field errors, got {result:?}");
        };
        assert_eq!(errors.errors[0].name, "tokenType");
        assert_eq!(errors.errors[0].error, "You already gave your monthly :token-data: to @carol");
    }

    #[tokio::test]
    async fn other_grant_errors_are_posted_ephemerally() {
        let service = Arc::new(ScriptedService::failing(ValidationError::MissingReason));
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));

        let result = dispatcher
            .dispatch(&submission("false", "U2"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(service.calls()[1], "ephemeral C1 U1");
        let posted = service.ephemeral.lock().expect("lock").clone();
        assert_eq!(posted[0].fallback_text, "Try *`/token help`* for instructions");

        let service = Arc::new(ScriptedService::failing(StoreError::Backend("disk".to_owned())));
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));
        dispatcher
            .dispatch(&submission("false", "U2"), &EventContext::default())
            .await
            .expect("dispatch");
        let posted = service.ephemeral.lock().expect("lock").clone();
        assert!(posted[0].texts()[0].contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn unknown_recipient_fails_the_submission() {
        let service = Arc::new(ScriptedService::default());
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));

        let result = dispatcher.dispatch(&submission("false", "U404"), &EventContext::default()).await;

        assert!(result.is_err());
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn grant_back_reopens_dialog_for_original_giver() {
        let service = Arc::new(ScriptedService::default());
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));

        let result = dispatcher
            .dispatch(&button("grant_back", r#"{"recipient":"U1"}"#), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(service.calls(), vec!["dialog trigger-9 U1 "]);
    }

    #[tokio::test]
    async fn join_resolves_recipient_and_preselects_token() {
        let service = Arc::new(ScriptedService::default());
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));

        dispatcher
            .dispatch(
                &button("join", r#"{"recipient":"@bob","type":"token-data"}"#),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");
        dispatcher
            .dispatch(
                &button("join", r#"{"recipient":"@ghost","type":"token-life"}"#),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(
            service.calls(),
            vec!["dialog trigger-9 U2 token-data", "dialog trigger-9 @ghost token-life"]
        );
    }

    #[tokio::test]
    async fn unrelated_buttons_are_ignored() {
        let service = Arc::new(ScriptedService::default());
        let dispatcher = token_dispatcher("/token", Arc::clone(&service));

        for event in [button("refresh", r#"{"recipient":"U1"}"#), button("join", "not json")] {
            let result = dispatcher.dispatch(&event, &EventContext::default()).await.expect("ok");
            assert_eq!(result, HandlerResult::Ignored);
        }
        assert!(service.calls().is_empty());
    }
}
