use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{emoji, TokenCatalog};
use crate::domain::grant::{Grant, GrantFollowUp};

pub const GRANT_BACK_ACTION: &str = "grant_back";
pub const JOIN_ACTION: &str = "join";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Direct message to a single user.
    Direct,
    /// Posted to a channel everyone in it can read.
    Broadcast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageColor {
    Good,
    Warning,
    Danger,
}

impl MessageColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

/// A button attached to a grant notification. `value` is an encoded
/// [`GrantFollowUp`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    pub action_id: String,
    pub label: String,
    pub value: String,
}

impl MessageAction {
    pub fn grant_back(grant: &Grant, giver_user_id: &str) -> Self {
        Self {
            action_id: GRANT_BACK_ACTION.to_owned(),
            label: format!("Token {} back", grant.giver),
            value: GrantFollowUp::grant_back(giver_user_id).encode(),
        }
    }

    pub fn join(grant: &Grant) -> Self {
        Self {
            action_id: JOIN_ACTION.to_owned(),
            label: format!("Join the {}", emoji(&grant.token_id)),
            value: GrantFollowUp::join(grant).encode(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub visibility: Visibility,
    pub actions: Vec<MessageAction>,
    pub color: MessageColor,
}

impl OutboundMessage {
    pub fn direct(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visibility: Visibility::Direct,
            actions: Vec::new(),
            color: MessageColor::Good,
        }
    }

    pub fn broadcast(text: impl Into<String>) -> Self {
        Self { visibility: Visibility::Broadcast, ..Self::direct(text) }
    }

    pub fn with_action(mut self, action: MessageAction) -> Self {
        self.actions.push(action);
        self
    }
}

pub fn grant_announcement(grant: &Grant) -> String {
    format!(
        "{} gave {} to {} because {}",
        grant.giver,
        emoji(&grant.token_id),
        grant.recipient,
        grant.reason
    )
}

/// Flat copy of a grant as the reporting sinks receive it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub giver: String,
    pub recipient: String,
    pub token_id: String,
    pub reason: String,
    pub is_private: bool,
    /// RFC 2822 rendering of the grant timestamp.
    pub sent_at: String,
    /// Grant timestamp in Unix nanoseconds.
    pub timestamp: i64,
    pub token_name: String,
    pub token_image: String,
}

impl SinkRecord {
    pub fn from_grant(grant: &Grant, catalog: &TokenCatalog) -> Self {
        Self {
            giver: grant.giver.clone(),
            recipient: grant.recipient.clone(),
            token_id: grant.token_id.clone(),
            reason: grant.reason.clone(),
            is_private: grant.private,
            sent_at: grant.timestamp.to_rfc2822(),
            timestamp: unix_nanos(grant.timestamp),
            token_name: catalog.display_name(&grant.token_id).to_owned(),
            token_image: catalog.image(&grant.token_id).to_owned(),
        }
    }
}

fn unix_nanos(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_nanos_opt().unwrap_or_else(|| instant.timestamp().saturating_mul(1_000_000_000))
}
