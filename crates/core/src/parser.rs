use chrono::{DateTime, Utc};

use crate::catalog::TokenCatalog;
use crate::domain::grant::{normalize_handle, Grant, HANDLE_PREFIX};
use crate::errors::ValidationError;

/// Every spelling of the privacy marker that has ever shown up in the help
/// text. Matched case-insensitively against the final field only.
pub const PRIVACY_DIRECTIVES: &[&str] = &[
    "private",
    "privately",
    "<private<",
    "<privately>",
    "<private(ly)<",
    "<private(ly)>",
    "private(ly)",
];

pub fn is_privacy_directive(field: &str) -> bool {
    let lowered = field.to_lowercase();
    PRIVACY_DIRECTIVES.iter().any(|directive| *directive == lowered)
}

/// Parses `<token> @recipient reason words... [private]` into a candidate
/// grant given by `user`. The privacy directive is stripped before anything
/// else is read, so it never ends up in the reason.
pub fn parse_grant(
    command: &str,
    user: &str,
    catalog: &TokenCatalog,
    now: DateTime<Utc>,
) -> Result<Grant, ValidationError> {
    let mut fields: Vec<&str> = command.split_whitespace().collect();

    let private = fields.last().is_some_and(|last| is_privacy_directive(last));
    if private {
        fields.pop();
    }

    let mut fields = fields.into_iter();
    let token = fields
        .next()
        .and_then(|field| catalog.lookup(field))
        .ok_or(ValidationError::MissingToken)?;

    let recipient = fields
        .next()
        .filter(|field| field.strip_prefix(HANDLE_PREFIX).is_some_and(|name| !name.is_empty()))
        .ok_or(ValidationError::MissingRecipient)?;

    let reason = fields.collect::<Vec<_>>().join(" ");
    if reason.is_empty() {
        return Err(ValidationError::MissingReason);
    }

    Ok(Grant::new(normalize_handle(user), recipient, token.id.clone(), reason, private, now))
}
