use serde::Serialize;

use tokenbot_core::catalog::{emoji, TokenCatalog};
use tokenbot_core::errors::GrantError;
use tokenbot_core::notify::{MessageColor, OutboundMessage, GRANT_BACK_ACTION};
use tokenbot_core::report::{PersonalSummary, PublicReport};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

/// A colored side-bar group of blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: String,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Only the invoking user sees the message.
    Ephemeral,
    InChannel,
}

/// Wire shape shared by slash-command responses, `chat.postMessage` and
/// `chat.postEphemeral`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl MessageTemplate {
    pub fn is_ephemeral(&self) -> bool {
        self.response_type == Some(ResponseType::Ephemeral)
    }

    /// Every mrkdwn and plain text fragment, top-level blocks first.
    pub fn texts(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .chain(self.attachments.iter().flat_map(|attachment| attachment.blocks.iter()))
            .flat_map(block_texts)
            .collect()
    }
}

fn block_texts(block: &Block) -> Vec<&str> {
    match block {
        Block::Section { text, .. } => vec![object_text(text)],
        Block::Actions { elements, .. } => {
            elements.iter().map(|button| object_text(&button.text)).collect()
        }
        Block::Context { elements, .. } => elements.iter().map(object_text).collect(),
    }
}

fn object_text(object: &TextObject) -> &str {
    match object {
        TextObject::PlainText { text } | TextObject::Mrkdwn { text } => text,
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    response_type: Option<ResponseType>,
    blocks: Vec<Block>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self {
            fallback_text: fallback_text.into(),
            response_type: None,
            blocks: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.response_type = Some(ResponseType::Ephemeral);
        self
    }

    pub fn section(mut self, block_id: impl Into<String>, text: TextObject) -> Self {
        self.blocks.push(Block::Section { block_id: block_id.into(), text });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn attachment<F>(mut self, color: MessageColor, build: F) -> Self
    where
        F: FnOnce(&mut AttachmentBuilder),
    {
        let mut builder = AttachmentBuilder::default();
        build(&mut builder);
        self.attachments.push(Attachment { color: color.as_str().to_owned(), blocks: builder.blocks });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate {
            fallback_text: self.fallback_text,
            response_type: self.response_type,
            blocks: self.blocks,
            attachments: self.attachments,
        }
    }
}

#[derive(Default)]
pub struct AttachmentBuilder {
    blocks: Vec<Block>,
}

impl AttachmentBuilder {
    pub fn mrkdwn(&mut self, block_id: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.blocks.push(Block::Section { block_id: block_id.into(), text: TextObject::mrkdwn(text) });
        self
    }

    pub fn actions<F>(&mut self, block_id: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        if !builder.elements.is_empty() {
            self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.elements });
        }
        self
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Renders a fan-out notification. Grant-back buttons are styled primary.
pub fn outbound_message(message: &OutboundMessage) -> MessageTemplate {
    MessageBuilder::new(message.text.clone())
        .attachment(message.color, |attachment| {
            attachment.mrkdwn("grant.notice.text.v1", message.text.clone()).actions(
                "grant.notice.actions.v1",
                |actions| {
                    for action in &message.actions {
                        let mut button = ButtonElement::new(&action.action_id, &action.label)
                            .value(&action.value);
                        if action.action_id == GRANT_BACK_ACTION {
                            button = button.style(ButtonStyle::Primary);
                        }
                        actions.button(button);
                    }
                },
            );
        })
        .build()
}

pub fn help_message(command: &str, catalog: &TokenCatalog) -> MessageTemplate {
    let valid = catalog.emoji_list().join("` `");
    let entries = [
        format!("*`{command}`*\n_Open the `Token a Teammate` dialog_"),
        format!(
            "*`{command} [:token-emoji:] [@user] [reason] [<private(ly)>]`*\n\
             E.g. `{command} :token-data: @recipient description of reason`\n\
             `{command} :token-life: @recipient some personal reason privately`\n\
             _Type `:token-` and Slack will auto-complete your token_\n\
             Valid emoji are: `{valid}`\n\
             Note: private tokens are visible to you, the recipient and administrators, \
             but are not posted to announcement channels"
        ),
        format!("*`{command} me`*\n_What tokens you have sent and received (your eyes only)_"),
        format!("*`{command} report`*\n_Display a report of all *public* tokens (your eyes only)_"),
        format!("*`{command} help`*\n_You seem to have figured this one out already, good job!_"),
    ];

    entries
        .into_iter()
        .enumerate()
        .fold(
            MessageBuilder::new(format!("Available `{command}` commands")).ephemeral(),
            |builder, (index, text)| {
                builder.attachment(MessageColor::Good, |attachment| {
                    attachment.mrkdwn(format!("token.help.entry.{index}.v1"), text);
                })
            },
        )
        .build()
}

pub fn personal_summary_message(summary: &PersonalSummary) -> MessageTemplate {
    let mut builder = MessageBuilder::new("Your current tokens:").ephemeral();

    for (index, grant) in summary.given.iter().enumerate() {
        let text = format!(
            "You gave <{}> {} because {}",
            grant.recipient,
            emoji(&grant.token_id),
            grant.reason
        );
        builder = builder.attachment(MessageColor::Good, |attachment| {
            attachment.mrkdwn(format!("token.me.given.{index}.v1"), text);
        });
    }

    if !summary.still_to_give.is_empty() {
        let remaining = summary
            .still_to_give
            .iter()
            .map(|token| format!("{} (`{}`)", token.emoji(), token.emoji()))
            .collect::<Vec<_>>()
            .join(" ");
        builder = builder.attachment(MessageColor::Warning, |attachment| {
            attachment.mrkdwn(
                "token.me.remaining.v1",
                format!("This month, you still have to give: {remaining}"),
            );
        });
    }

    for (index, grant) in summary.received.iter().enumerate() {
        let text = format!(
            "<{}> gave you {} because {}",
            grant.giver,
            emoji(&grant.token_id),
            grant.reason
        );
        builder = builder.attachment(MessageColor::Good, |attachment| {
            attachment.mrkdwn(format!("token.me.received.{index}.v1"), text);
        });
    }

    builder.build()
}

/// Slack rejects a section whose text is longer than this.
pub const SECTION_TEXT_LIMIT: usize = 3000;
/// Slack rejects a message carrying more blocks than this.
pub const MAX_BLOCKS: usize = 50;

/// Grants arrive newest first. Lines are packed into as few sections as fit
/// the section limit; whatever does not fit in `MAX_BLOCKS` sections is
/// dropped from the tail, so the oldest grants go first.
pub fn public_report_message(report: &PublicReport) -> MessageTemplate {
    let lines = report.grants.iter().map(|grant| {
        format!(
            "<{}> gave <{}> {} because {}",
            grant.giver,
            grant.recipient,
            emoji(&grant.token_id),
            grant.reason
        )
    });
    let sections = pack_lines(lines, SECTION_TEXT_LIMIT, MAX_BLOCKS);

    MessageBuilder::new("Current public tokens:")
        .ephemeral()
        .attachment(MessageColor::Good, |attachment| {
            for (index, text) in sections.into_iter().enumerate() {
                attachment.mrkdwn(format!("token.report.lines.{index}.v1"), text);
            }
        })
        .build()
}

fn pack_lines(
    lines: impl IntoIterator<Item = String>,
    max_chars: usize,
    max_sections: usize,
) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in lines {
        let line = truncate_chars(line, max_chars);
        let line_chars = line.chars().count();
        let joined = if current.is_empty() { line_chars } else { current_chars + 1 + line_chars };

        if joined <= max_chars {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&line);
            current_chars = joined;
            continue;
        }

        if sections.len() + 1 == max_sections {
            break;
        }
        sections.push(std::mem::replace(&mut current, line));
        current_chars = line_chars;
    }

    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

fn truncate_chars(line: String, max_chars: usize) -> String {
    match line.char_indices().nth(max_chars) {
        Some((end, _)) => line[..end].to_owned(),
        None => line,
    }
}

/// Ephemeral reply for a command the user can fix: echoes what they typed
/// next to the reason it was refused.
pub fn grant_error_message(command: &str, text: &str, error: &GrantError) -> MessageTemplate {
    MessageBuilder::new(format!("Try *`{command} help`* for instructions"))
        .ephemeral()
        .attachment(MessageColor::Warning, |attachment| {
            attachment.mrkdwn("token.error.typed.v1", format!("You typed: `{command} {text}`"));
        })
        .attachment(MessageColor::Danger, |attachment| {
            attachment.mrkdwn("token.error.reason.v1", error.to_string());
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .ephemeral()
        .section("token.error.summary.v1", TextObject::mrkdwn(format!(":warning: {summary}")))
        .context("token.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use tokenbot_core::catalog::{TokenCatalog, TokenDefinition};
    use tokenbot_core::domain::grant::Grant;
    use tokenbot_core::errors::{GrantError, ValidationError};
    use tokenbot_core::notify::{MessageAction, OutboundMessage};
    use tokenbot_core::report::{PersonalSummary, PublicReport};

    use super::{
        error_message, grant_error_message, help_message, outbound_message,
        personal_summary_message, public_report_message, Block, ResponseType, MAX_BLOCKS,
        SECTION_TEXT_LIMIT,
    };

    fn grant(giver: &str, recipient: &str, token: &str, reason: &str) -> Grant {
        let at = Utc.with_ymd_and_hms(2016, 3, 14, 15, 0, 0).single().expect("valid utc");
        Grant::new(giver, recipient, token, reason, false, at)
    }

    #[test]
    fn outbound_message_serializes_attachment_with_buttons() {
        let grant = grant("@alice", "@bob", "token-data", "charts");
        let message = OutboundMessage::broadcast("@alice gave :token-data: to @bob because charts")
            .with_action(MessageAction::grant_back(&grant, "U1"))
            .with_action(MessageAction::join(&grant));

        let value = serde_json::to_value(outbound_message(&message)).expect("serialize");

        assert_eq!(value["text"], "@alice gave :token-data: to @bob because charts");
        assert!(value.get("response_type").is_none());
        assert_eq!(value["attachments"][0]["color"], "good");
        let buttons = &value["attachments"][0]["blocks"][1]["elements"];
        assert_eq!(buttons[0]["type"], "button");
        assert_eq!(buttons[0]["action_id"], "grant_back");
        assert_eq!(buttons[0]["style"], "primary");
        assert_eq!(buttons[0]["text"], json!({"type": "plain_text", "text": "Token @alice back"}));
        assert_eq!(buttons[1]["action_id"], "join");
        assert!(buttons[1].get("style").is_none());
    }

    #[test]
    fn direct_message_without_actions_has_no_actions_block() {
        let message = outbound_message(&OutboundMessage::direct("hello"));
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].blocks.len(), 1);
    }

    #[test]
    fn help_lists_every_catalog_emoji() {
        let catalog = TokenCatalog::from_definitions(vec![
            TokenDefinition::new("token-a", "A", "a.png"),
            TokenDefinition::new("token-b", "B", "b.png"),
        ]);
        let message = help_message("/token", &catalog);

        assert!(message.is_ephemeral());
        assert_eq!(message.attachments.len(), 5);
        assert!(message.texts()[1].contains("Valid emoji are: `:token-a:` `:token-b:`"));
        assert!(message.texts()[4].starts_with("*`/token help`*"));
    }

    #[test]
    fn personal_summary_orders_given_remaining_received() {
        let catalog = TokenCatalog::default();
        let summary = PersonalSummary {
            user: "@alice".to_owned(),
            given: vec![grant("@alice", "@bob", "token-data", "charts")],
            still_to_give: catalog.list_tokens()[..2].to_vec(),
            received: vec![grant("@carol", "@alice", "token-life", "vacation")],
        };

        let message = personal_summary_message(&summary);
        let colors: Vec<&str> =
            message.attachments.iter().map(|attachment| attachment.color.as_str()).collect();

        assert_eq!(message.fallback_text, "Your current tokens:");
        assert_eq!(colors, vec!["good", "warning", "good"]);
        assert_eq!(
            message.texts(),
            vec![
                "You gave <@bob> :token-data: because charts",
                "This month, you still have to give: :token-life: (`:token-life:`) \
                 :token-customer: (`:token-customer:`)",
                "<@carol> gave you :token-life: because vacation",
            ]
        );
    }

    #[test]
    fn personal_summary_omits_remaining_when_everything_was_given() {
        let summary = PersonalSummary {
            user: "@alice".to_owned(),
            given: Vec::new(),
            still_to_give: Vec::new(),
            received: Vec::new(),
        };
        assert!(personal_summary_message(&summary).attachments.is_empty());
    }

    #[test]
    fn public_report_joins_lines() {
        let report = PublicReport {
            since: Utc.with_ymd_and_hms(2016, 2, 1, 5, 0, 0).single().expect("valid utc"),
            grants: vec![
                grant("@alice", "@bob", "token-data", "charts"),
                grant("@dave", "@carol", "token-honesty", "feedback"),
            ],
        };

        let message = public_report_message(&report);
        assert_eq!(message.response_type, Some(ResponseType::Ephemeral));
        assert_eq!(
            message.texts(),
            vec![
                "<@alice> gave <@bob> :token-data: because charts\n\
                 <@dave> gave <@carol> :token-honesty: because feedback"
            ]
        );
    }

    #[test]
    fn busy_quarter_report_stays_within_slack_limits() {
        let reason = "kept the release train on time ".repeat(4);
        let grants: Vec<Grant> = (0..60)
            .map(|index| grant(&format!("@giver{index}"), "@bob", "token-data", &reason))
            .collect();
        let report = PublicReport {
            since: Utc.with_ymd_and_hms(2016, 2, 1, 5, 0, 0).single().expect("valid utc"),
            grants,
        };

        let message = public_report_message(&report);
        let sections = &message.attachments[0].blocks;
        let texts = message.texts();

        assert!(texts.len() > 1, "report should span several sections");
        assert!(texts.iter().all(|text| text.chars().count() <= SECTION_TEXT_LIMIT));
        assert!(message.blocks.len() + sections.len() <= MAX_BLOCKS);
        assert!(texts[0].starts_with("<@giver0> gave <@bob>"));
        assert_eq!(texts.join("\n").lines().count(), 60);

        let ids: HashSet<String> = sections
            .iter()
            .map(|block| match block {
                Block::Section { block_id, .. } => block_id.clone(),
                other => panic!("unexpected block {other:?}"),
            })
            .collect();
        assert_eq!(ids.len(), sections.len());
    }

    #[test]
    fn oversized_report_keeps_the_newest_grants() {
        let reason = "x".repeat(2900);
        let grants: Vec<Grant> = (0..80)
            .map(|index| grant(&format!("@giver{index}"), "@bob", "token-data", &reason))
            .collect();
        let report = PublicReport {
            since: Utc.with_ymd_and_hms(2016, 2, 1, 5, 0, 0).single().expect("valid utc"),
            grants,
        };

        let message = public_report_message(&report);
        let texts = message.texts();

        assert_eq!(message.attachments[0].blocks.len(), MAX_BLOCKS);
        assert!(texts.iter().all(|text| text.chars().count() <= SECTION_TEXT_LIMIT));
        assert!(texts[0].starts_with("<@giver0> "));
        assert!(texts[MAX_BLOCKS - 1].starts_with(&format!("<@giver{}> ", MAX_BLOCKS - 1)));
    }

    #[test]
    fn single_overlong_line_is_truncated() {
        let report = PublicReport {
            since: Utc.with_ymd_and_hms(2016, 2, 1, 5, 0, 0).single().expect("valid utc"),
            grants: vec![grant("@alice", "@bob", "token-data", &"é".repeat(4000))],
        };

        let texts = public_report_message(&report).texts().into_iter().map(str::to_owned).collect::<Vec<_>>();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].chars().count(), SECTION_TEXT_LIMIT);
    }

    #[test]
    fn personal_summary_block_ids_are_unique() {
        let summary = PersonalSummary {
            user: "@alice".to_owned(),
            given: vec![
                grant("@alice", "@bob", "token-data", "charts"),
                grant("@alice", "@carol", "token-life", "balance"),
            ],
            still_to_give: Vec::new(),
            received: vec![
                grant("@bob", "@alice", "token-data", "review"),
                grant("@carol", "@alice", "token-life", "support"),
            ],
        };

        let ids: Vec<String> = personal_summary_message(&summary)
            .attachments
            .iter()
            .flat_map(|attachment| attachment.blocks.iter())
            .map(|block| match block {
                Block::Section { block_id, .. } => block_id.clone(),
                other => panic!("unexpected block {other:?}"),
            })
            .collect();

        assert_eq!(
            ids,
            vec![
                "token.me.given.0.v1",
                "token.me.given.1.v1",
                "token.me.received.0.v1",
                "token.me.received.1.v1",
            ]
        );
    }

    #[test]
    fn grant_error_echoes_command_and_reason() {
        let error = GrantError::from(ValidationError::MissingReason);
        let message = grant_error_message("/token", ":token-data: @bob", &error);

        assert_eq!(message.fallback_text, "Try *`/token help`* for instructions");
        assert_eq!(message.attachments[0].color, "warning");
        assert_eq!(message.attachments[1].color, "danger");
        assert_eq!(message.texts()[0], "You typed: `/token :token-data: @bob`");
        assert_eq!(message.texts()[1], error.to_string());
    }

    #[test]
    fn error_message_carries_correlation_id() {
        let message = error_message("Something went wrong", "req-1");
        assert!(message.is_ephemeral());
        assert_eq!(message.texts(), vec![":warning: Something went wrong", "Correlation ID: req-1"]);
    }
}
