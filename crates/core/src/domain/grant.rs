use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const HANDLE_PREFIX: char = '@';

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId(pub String);

impl GrantId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for GrantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single recognition token award from one user to another.
///
/// Handles carry the `@` prefix. Grants are immutable once constructed; the
/// store owns persistence and nothing in the workspace updates or deletes them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub giver: String,
    pub recipient: String,
    #[serde(rename = "token_type")]
    pub token_id: String,
    pub reason: String,
    pub private: bool,
    pub timestamp: DateTime<Utc>,
}

impl Grant {
    pub fn new(
        giver: impl Into<String>,
        recipient: impl Into<String>,
        token_id: impl Into<String>,
        reason: impl Into<String>,
        private: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            giver: giver.into(),
            recipient: recipient.into(),
            token_id: token_id.into(),
            reason: reason.into(),
            private,
            timestamp,
        }
    }

    pub fn is_self_grant(&self) -> bool {
        self.giver == self.recipient
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGrant {
    pub id: GrantId,
    pub grant: Grant,
}

/// Where a grant command came from. The fan-out needs the originating channel
/// for broadcasts and the giver's platform user id for the "grant back" action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GrantContext {
    pub giver_user_id: String,
    pub channel_id: String,
    pub channel_name: String,
}

/// Button payload for the "grant back" and "join" follow-up actions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFollowUp {
    pub recipient: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub token_id: String,
}

impl GrantFollowUp {
    pub fn grant_back(giver_user_id: &str) -> Self {
        Self { recipient: giver_user_id.to_owned(), token_id: String::new() }
    }

    pub fn join(grant: &Grant) -> Self {
        Self { recipient: grant.recipient.clone(), token_id: grant.token_id.clone() }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"recipient\":\"{}\"}}", self.recipient.replace('"', ""))
        })
    }

    pub fn decode(value: &str) -> Option<Self> {
        serde_json::from_str(value).ok()
    }
}

pub fn normalize_handle(user: &str) -> String {
    let trimmed = user.trim();
    if trimmed.starts_with(HANDLE_PREFIX) {
        trimmed.to_owned()
    } else {
        format!("{HANDLE_PREFIX}{trimmed}")
    }
}
