//! The "Token a Teammate" dialog and its submission.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tokenbot_core::catalog::TokenCatalog;
use tokenbot_core::domain::grant::HANDLE_PREFIX;
use tokenbot_core::errors::GrantField;
use tokenbot_core::parser::PRIVACY_DIRECTIVES;

pub const DIALOG_CALLBACK_ID: &str = "token_dialog_callback";
pub const RECIPIENT_ELEMENT: &str = "tokenRecipient";
pub const TOKEN_ELEMENT: &str = "tokenType";
pub const REASON_ELEMENT: &str = "tokenReason";
pub const PRIVATE_ELEMENT: &str = "tokenIsPrivate";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogElement {
    Select {
        label: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data_source: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        options: Vec<SelectOption>,
        placeholder: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Text {
        label: String,
        name: String,
        min_length: u32,
    },
}

impl DialogElement {
    pub fn name(&self) -> &str {
        match self {
            Self::Select { name, .. } | Self::Text { name, .. } => name,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Select { value, .. } => value.as_deref(),
            Self::Text { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dialog {
    pub callback_id: String,
    pub title: String,
    pub submit_label: String,
    pub notify_on_cancel: bool,
    pub elements: Vec<DialogElement>,
}

impl Dialog {
    pub fn element(&self, name: &str) -> Option<&DialogElement> {
        self.elements.iter().find(|element| element.name() == name)
    }
}

/// Preselected values, used by the "grant back" and "join" buttons.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DialogDefaults {
    /// Platform user id of the recipient.
    pub recipient_user_id: Option<String>,
    /// Catalog identifier, without colons.
    pub token_id: Option<String>,
}

pub fn grant_dialog(catalog: &TokenCatalog, defaults: &DialogDefaults) -> Dialog {
    let token_options = catalog
        .list_tokens()
        .iter()
        .map(|token| SelectOption::new(format!("{} {}", token.emoji(), token.display_name), token.emoji()))
        .collect();
    let token_default = defaults
        .token_id
        .as_deref()
        .and_then(|id| catalog.lookup(id))
        .map(|token| token.emoji());

    Dialog {
        callback_id: DIALOG_CALLBACK_ID.to_owned(),
        title: "Token a Teammate".to_owned(),
        submit_label: "Grant".to_owned(),
        notify_on_cancel: false,
        elements: vec![
            DialogElement::Select {
                label: "Who?".to_owned(),
                name: RECIPIENT_ELEMENT.to_owned(),
                data_source: Some("users".to_owned()),
                options: Vec::new(),
                placeholder: "Choose a teammate...".to_owned(),
                value: defaults.recipient_user_id.clone().filter(|id| !id.is_empty()),
            },
            DialogElement::Select {
                label: "What?".to_owned(),
                name: TOKEN_ELEMENT.to_owned(),
                data_source: None,
                options: token_options,
                placeholder: "Choose a token...".to_owned(),
                value: token_default,
            },
            DialogElement::Text {
                label: "Why?".to_owned(),
                name: REASON_ELEMENT.to_owned(),
                min_length: 1,
            },
            DialogElement::Select {
                label: "Is it private?".to_owned(),
                name: PRIVATE_ELEMENT.to_owned(),
                data_source: None,
                options: vec![SelectOption::new("No", "false"), SelectOption::new("Yes", "true")],
                placeholder: "Is this token private?".to_owned(),
                value: Some("false".to_owned()),
            },
        ],
    }
}

/// Values the user picked, keyed by element name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DialogSubmission(pub HashMap<String, Option<String>>);

impl DialogSubmission {
    fn field(&self, name: &str) -> &str {
        self.0.get(name).and_then(|value| value.as_deref()).unwrap_or_default().trim()
    }

    pub fn recipient_user_id(&self) -> &str {
        self.field(RECIPIENT_ELEMENT)
    }

    pub fn is_private(&self) -> bool {
        self.field(PRIVATE_ELEMENT) == "true"
    }

    /// Builds the command text the slash command would have carried, with
    /// the recipient already resolved to a user name.
    pub fn command_text(&self, recipient_name: &str) -> String {
        let recipient = recipient_name.trim_start_matches(HANDLE_PREFIX);
        let mut text = format!(
            "{} {HANDLE_PREFIX}{recipient} {}",
            self.field(TOKEN_ELEMENT),
            self.field(REASON_ELEMENT)
        );
        if self.is_private() {
            text.push(' ');
            text.push_str(PRIVACY_DIRECTIVES[0]);
        }
        text
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub name: String,
    pub error: String,
}

/// Response body that keeps the dialog open with inline errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DialogErrors {
    pub errors: Vec<FieldError>,
}

impl DialogErrors {
    pub fn single(field: GrantField, error: impl Into<String>) -> Self {
        Self { errors: vec![FieldError { name: element_for(field).to_owned(), error: error.into() }] }
    }
}

pub fn element_for(field: GrantField) -> &'static str {
    match field {
        GrantField::Token => TOKEN_ELEMENT,
        GrantField::Recipient => RECIPIENT_ELEMENT,
    }
}
