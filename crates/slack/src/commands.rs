use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use tokenbot_core::catalog::TokenCatalog;
use tokenbot_core::domain::grant::{normalize_handle, GrantContext};
use tokenbot_core::errors::{ApplicationError, GrantError, StoreError};
use tokenbot_core::report::{PersonalSummary, PublicReport};

use crate::blocks::{self, MessageTemplate};
use crate::client::SlackApiError;
use crate::dialog::DialogDefaults;

/// Form body Slack posts for a slash command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub response_url: String,
    #[serde(default)]
    pub trigger_id: String,
}

/// The person and place a command or interaction came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invoker {
    pub user_id: String,
    pub user_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub trigger_id: String,
}

impl Invoker {
    pub fn handle(&self) -> String {
        normalize_handle(&self.user_name)
    }

    pub fn grant_context(&self) -> GrantContext {
        GrantContext {
            giver_user_id: self.user_id.clone(),
            channel_id: self.channel_id.clone(),
            channel_name: self.channel_name.clone(),
        }
    }
}

impl From<&SlashCommandPayload> for Invoker {
    fn from(payload: &SlashCommandPayload) -> Self {
        Self {
            user_id: payload.user_id.clone(),
            user_name: payload.user_name.clone(),
            channel_id: payload.channel_id.clone(),
            channel_name: payload.channel_name.clone(),
            trigger_id: payload.trigger_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenCommand {
    /// Anything that is not a sub-command is grant text.
    Grant { text: String },
    Me,
    Report,
    Help,
    Dialog,
}

pub fn classify(text: &str) -> TokenCommand {
    let trimmed = text.trim();
    let verb = trimmed.split_whitespace().next().unwrap_or_default().to_ascii_lowercase();
    match verb.as_str() {
        "" | "int" => TokenCommand::Dialog,
        "help" => TokenCommand::Help,
        "me" => TokenCommand::Me,
        "report" => TokenCommand::Report,
        _ => TokenCommand::Grant { text: trimmed.to_owned() },
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error(transparent)]
    Grant(#[from] GrantError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Slack(#[from] SlackApiError),
}

/// What goes back in the HTTP response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandResponse {
    /// Empty 200; anything visible was posted separately.
    Acknowledged,
    Message(MessageTemplate),
}

#[async_trait]
pub trait TokenCommandService: Send + Sync {
    fn catalog(&self) -> &TokenCatalog;

    async fn grant(&self, text: &str, invoker: &Invoker) -> Result<(), GrantError>;

    async fn personal_summary(&self, invoker: &Invoker) -> Result<PersonalSummary, StoreError>;

    async fn public_report(&self) -> Result<PublicReport, StoreError>;

    async fn open_dialog(
        &self,
        trigger_id: &str,
        defaults: DialogDefaults,
    ) -> Result<(), SlackApiError>;
}

#[async_trait]
impl<T> TokenCommandService for std::sync::Arc<T>
where
    T: TokenCommandService + ?Sized,
{
    fn catalog(&self) -> &TokenCatalog {
        (**self).catalog()
    }

    async fn grant(&self, text: &str, invoker: &Invoker) -> Result<(), GrantError> {
        (**self).grant(text, invoker).await
    }

    async fn personal_summary(&self, invoker: &Invoker) -> Result<PersonalSummary, StoreError> {
        (**self).personal_summary(invoker).await
    }

    async fn public_report(&self) -> Result<PublicReport, StoreError> {
        (**self).public_report().await
    }

    async fn open_dialog(
        &self,
        trigger_id: &str,
        defaults: DialogDefaults,
    ) -> Result<(), SlackApiError> {
        (**self).open_dialog(trigger_id, defaults).await
    }
}

pub struct CommandRouter<S> {
    command: String,
    service: S,
}

impl<S> CommandRouter<S>
where
    S: TokenCommandService,
{
    pub fn new(command: impl Into<String>, service: S) -> Self {
        Self { command: command.into(), service }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn accepts(&self, payload: &SlashCommandPayload) -> Result<(), CommandParseError> {
        if payload.command == self.command {
            Ok(())
        } else {
            Err(CommandParseError::UnsupportedCommand(payload.command.clone()))
        }
    }

    /// Runs one command. Every failure is turned into an ephemeral reply for
    /// the invoking user; nothing is surfaced to Slack as an HTTP error.
    pub async fn route(
        &self,
        payload: &SlashCommandPayload,
        correlation_id: &str,
    ) -> CommandResponse {
        let command = classify(&payload.text);
        let invoker = Invoker::from(payload);
        info!(
            event_name = "slack.command.received",
            correlation_id,
            user = %invoker.handle(),
            channel = %invoker.channel_name,
            command = ?command,
            "slash command received"
        );

        match self.dispatch(command, &invoker).await {
            Ok(response) => response,
            Err(CommandRouteError::Grant(grant_error)) if grant_error.is_user_facing() => {
                CommandResponse::Message(blocks::grant_error_message(
                    &self.command,
                    &payload.text,
                    &grant_error,
                ))
            }
            Err(route_error) => {
                error!(
                    event_name = "slack.command.failed",
                    correlation_id,
                    user = %invoker.handle(),
                    error = %route_error,
                    "slash command failed"
                );
                let interface = application_error(route_error).into_interface(correlation_id);
                CommandResponse::Message(blocks::error_message(
                    interface.user_message(),
                    interface.correlation_id(),
                ))
            }
        }
    }

    async fn dispatch(
        &self,
        command: TokenCommand,
        invoker: &Invoker,
    ) -> Result<CommandResponse, CommandRouteError> {
        match command {
            TokenCommand::Help => Ok(CommandResponse::Message(blocks::help_message(
                &self.command,
                self.service.catalog(),
            ))),
            TokenCommand::Me => {
                let summary = self.service.personal_summary(invoker).await?;
                Ok(CommandResponse::Message(blocks::personal_summary_message(&summary)))
            }
            TokenCommand::Report => {
                let report = self.service.public_report().await?;
                Ok(CommandResponse::Message(blocks::public_report_message(&report)))
            }
            TokenCommand::Dialog => {
                self.service.open_dialog(&invoker.trigger_id, DialogDefaults::default()).await?;
                Ok(CommandResponse::Acknowledged)
            }
            TokenCommand::Grant { text } => {
                self.service.grant(&text, invoker).await?;
                Ok(CommandResponse::Acknowledged)
            }
        }
    }
}

pub(crate) fn application_error(error: CommandRouteError) -> ApplicationError {
    match error {
        CommandRouteError::Grant(error) => error.into(),
        CommandRouteError::Store(error) => error.into(),
        CommandRouteError::Slack(error) => ApplicationError::Integration(error.to_string()),
    }
}
