//! Slack Web API access.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use tokenbot_core::errors::DeliveryError;

use crate::blocks::MessageTemplate;
use crate::dialog::Dialog;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Transport(String),
    #[error("slack returned http status {0}")]
    Status(u16),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("could not decode slack response: {0}")]
    Decode(String),
}

impl From<SlackApiError> for DeliveryError {
    fn from(value: SlackApiError) -> Self {
        match value {
            SlackApiError::Transport(detail) => Self::Transport(detail),
            SlackApiError::Status(status) => {
                Self::Rejected { status, detail: "slack web api".to_owned() }
            }
            SlackApiError::Api(detail) | SlackApiError::Decode(detail) => Self::Api(detail),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlackUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    /// `chat.postMessage`. A user id as `channel` posts to the bot DM.
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    /// `chat.postEphemeral`.
    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    /// `dialog.open`.
    async fn open_dialog(&self, trigger_id: &str, dialog: &Dialog) -> Result<(), SlackApiError>;

    /// `users.list`, every page.
    async fn list_users(&self) -> Result<Vec<SlackUser>, SlackApiError>;

    /// `users.info`.
    async fn user_info(&self, user_id: &str) -> Result<SlackUser, SlackApiError>;
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(flatten)]
    message: &'a MessageTemplate,
}

#[derive(Serialize)]
struct OpenDialogRequest<'a> {
    trigger_id: &'a str,
    dialog: &'a Dialog,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct UsersListResponse {
    #[serde(default)]
    members: Vec<SlackUser>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    user: SlackUser,
}

const USERS_PAGE_LIMIT: &str = "200";

/// `reqwest` implementation of [`SlackApi`] authenticated with the bot token.
#[derive(Clone)]
pub struct SlackWebClient {
    http: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_owned(), bot_token })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<Value, SlackApiError> {
        debug!(event_name = "slack.api.request", method, "calling slack web api");
        let response = self
            .http
            .post(self.url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        read_envelope(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SlackApiError> {
        debug!(event_name = "slack.api.request", method, "calling slack web api");
        let response = self
            .http
            .get(self.url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        let payload = read_envelope(response).await?;
        serde_json::from_value(payload).map_err(|error| SlackApiError::Decode(error.to_string()))
    }
}

/// Slack reports most failures as HTTP 200 with `ok: false`.
async fn read_envelope(response: reqwest::Response) -> Result<Value, SlackApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SlackApiError::Status(status.as_u16()));
    }

    let payload: Value =
        response.json().await.map_err(|error| SlackApiError::Decode(error.to_string()))?;
    let envelope: ApiEnvelope = serde_json::from_value(payload.clone())
        .map_err(|error| SlackApiError::Decode(error.to_string()))?;
    if !envelope.ok {
        return Err(SlackApiError::Api(envelope.error.unwrap_or_else(|| "unknown_error".to_owned())));
    }
    Ok(payload)
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let request = PostMessageRequest { channel, user: None, message };
        self.post_json("chat.postMessage", &request).await.map(|_| ())
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let request = PostMessageRequest { channel, user: Some(user_id), message };
        self.post_json("chat.postEphemeral", &request).await.map(|_| ())
    }

    async fn open_dialog(&self, trigger_id: &str, dialog: &Dialog) -> Result<(), SlackApiError> {
        let request = OpenDialogRequest { trigger_id, dialog };
        self.post_json("dialog.open", &request).await.map(|_| ())
    }

    async fn list_users(&self) -> Result<Vec<SlackUser>, SlackApiError> {
        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let page: UsersListResponse = {
                let mut query = vec![("limit", USERS_PAGE_LIMIT)];
                if !cursor.is_empty() {
                    query.push(("cursor", cursor.as_str()));
                }
                self.get("users.list", &query).await?
            };
            users.extend(page.members);

            cursor = page.response_metadata.map(|meta| meta.next_cursor).unwrap_or_default();
            if cursor.is_empty() {
                return Ok(users);
            }
        }
    }

    async fn user_info(&self, user_id: &str) -> Result<SlackUser, SlackApiError> {
        let response: UserInfoResponse = self.get("users.info", &[("user", user_id)]).await?;
        Ok(response.user)
    }
}
