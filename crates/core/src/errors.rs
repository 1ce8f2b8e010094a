use thiserror::Error;

use crate::catalog::emoji;

/// Structural problems with the command text itself.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing token: you forgot your recognition token emoji")]
    MissingToken,
    #[error("missing recipient: you forgot the recipient handle")]
    MissingRecipient,
    #[error("missing reason: please say why you are granting this token")]
    MissingReason,
}

/// Business rules a well-formed grant can still break.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GrantRuleViolation {
    #[error("Don't grant yourself a token, that's just weird!")]
    SelfGrant,
    #[error("You already gave your monthly {} to {recipient}", emoji(.token_id))]
    AlreadyGrantedThisMonth { token_id: String, recipient: String },
}

/// Dialog inputs an error can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantField {
    Token,
    Recipient,
}

impl GrantRuleViolation {
    pub fn field(&self) -> GrantField {
        match self {
            Self::SelfGrant => GrantField::Recipient,
            Self::AlreadyGrantedThisMonth { .. } => GrantField::Token,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conflicting grant already stored: {0}")]
    Conflict(String),
    #[error("grant store failure: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery transport failed: {0}")]
    Transport(String),
    #[error("delivery rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("delivery api error: {0}")]
    Api(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GrantError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Rule(#[from] GrantRuleViolation),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl GrantError {
    /// Errors the invoking user caused and can fix by retyping the command.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }

    pub fn rule_field(&self) -> Option<GrantField> {
        match self {
            Self::Rule(violation) => Some(violation.field()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Rule(#[from] GrantRuleViolation),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<GrantError> for ApplicationError {
    fn from(value: GrantError) -> Self {
        match value {
            GrantError::Validation(error) => Self::Validation(error),
            GrantError::Rule(violation) => Self::Rule(violation),
            GrantError::Persistence(error) => Self::Persistence(error.to_string()),
        }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Validation(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Rule(violation) => Self::BadRequest {
                message: violation.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
