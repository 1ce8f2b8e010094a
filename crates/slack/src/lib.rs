//! Slack integration for tokenbot.
//!
//! - **Slash commands** (`commands`) - `/token`, `/token me`, `/token report`, `/token help`
//! - **Interactivity** (`events`, `dialog`) - the grant dialog and the "grant back" / "join" buttons
//! - **Messages** (`blocks`) - Block Kit rendering of notifications, reports and errors
//! - **Web API** (`client`, `directory`, `delivery`) - outbound calls and the cached user directory
//! - **Request checks** (`signature`) - verification token and signing secret
//!
//! # Architecture
//!
//! ```text
//! HTTP form → SlackEvent → EventDispatcher → Handlers → TokenCommandService → GrantService
//!                                                ↓
//!                                 MessageTemplate / DialogErrors ← Response
//! ```

pub mod blocks;
pub mod client;
pub mod commands;
pub mod delivery;
pub mod dialog;
pub mod directory;
pub mod events;
pub mod signature;

pub use client::{SlackApi, SlackApiError, SlackUser, SlackWebClient};
pub use commands::{CommandRouter, Invoker, SlashCommandPayload, TokenCommand, TokenCommandService};
pub use delivery::SlackChatDelivery;
pub use directory::UserDirectory;
pub use events::{
    token_dispatcher, EventContext, EventDispatcher, HandlerResult, InteractionService,
    InteractivePayload, SlackEvent,
};
pub use signature::{RequestVerifier, VerificationError};
