//! Best-effort notification fan-out for persisted grants.
//!
//! Every target is attempted independently. A failing target is logged and
//! recorded in the returned [`FanoutReport`]; it never fails the grant.

pub mod message;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::catalog::TokenCatalog;
use crate::domain::grant::{GrantContext, StoredGrant};
use crate::errors::DeliveryError;
use crate::queue::BackgroundQueue;

pub use message::{
    grant_announcement, MessageAction, MessageColor, OutboundMessage, SinkRecord, Visibility,
    GRANT_BACK_ACTION, JOIN_ACTION,
};

pub const CHANNEL_PREFIX: char = '#';

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryTarget {
    /// A user addressed by `@handle`.
    User(String),
    /// A channel addressed by `#name` or platform id.
    Channel(String),
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(handle) => write!(f, "user:{handle}"),
            Self::Channel(channel) => write!(f, "channel:{channel}"),
        }
    }
}

#[async_trait]
pub trait ChatDelivery: Send + Sync {
    async fn deliver(
        &self,
        target: &DeliveryTarget,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether private grants are forwarded to this sink.
    fn accepts_private(&self) -> bool {
        true
    }

    /// Detached sinks run on the background queue after the request returns.
    fn detached(&self) -> bool {
        false
    }

    async fn publish(&self, record: &SinkRecord) -> Result<(), DeliveryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutcomeTarget {
    Chat(DeliveryTarget),
    Sink(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Queued,
    Skipped,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub target: OutcomeTarget,
    pub status: DeliveryStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub deliveries: Vec<DeliveryOutcome>,
}

impl FanoutReport {
    fn record(&mut self, target: OutcomeTarget, status: DeliveryStatus) {
        self.deliveries.push(DeliveryOutcome { target, status });
    }

    pub fn chat_targets(&self) -> Vec<&DeliveryTarget> {
        self.deliveries
            .iter()
            .filter_map(|outcome| match &outcome.target {
                OutcomeTarget::Chat(target) => Some(target),
                OutcomeTarget::Sink(_) => None,
            })
            .collect()
    }

    pub fn status_of_sink(&self, name: &str) -> Option<&DeliveryStatus> {
        self.deliveries.iter().find_map(|outcome| match outcome.target {
            OutcomeTarget::Sink(sink) if sink == name => Some(&outcome.status),
            _ => None,
        })
    }

    pub fn failures(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|outcome| matches!(outcome.status, DeliveryStatus::Failed(_)))
            .count()
    }
}

pub struct NotificationFanout {
    chat: Arc<dyn ChatDelivery>,
    sinks: Vec<Arc<dyn ReportSink>>,
    catalog: Arc<TokenCatalog>,
    queue: Option<BackgroundQueue>,
    announcement_channel: String,
}

impl NotificationFanout {
    pub fn new(
        chat: Arc<dyn ChatDelivery>,
        catalog: Arc<TokenCatalog>,
        announcement_channel: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            sinks: Vec::new(),
            catalog,
            queue: None,
            announcement_channel: announcement_channel.into(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Without a queue, detached sinks are awaited inline like the others.
    pub fn with_queue(mut self, queue: BackgroundQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Originating channel plus the announcement channel, without duplicates.
    pub fn broadcast_channels(&self, context: &GrantContext) -> Vec<String> {
        let announcement = channel_name(&self.announcement_channel);
        let mut channels = vec![announcement];

        let origin = if context.channel_name.trim().is_empty() {
            context.channel_id.trim().to_owned()
        } else {
            channel_name(&context.channel_name)
        };
        if !origin.is_empty() && !channels.contains(&origin) {
            channels.push(origin);
        }
        channels
    }

    pub async fn notify(&self, stored: &StoredGrant, context: &GrantContext) -> FanoutReport {
        let grant = &stored.grant;
        let mut report = FanoutReport::default();
        let text = grant_announcement(grant);

        let giver_message = OutboundMessage::direct(text.clone());
        self.send(DeliveryTarget::User(grant.giver.clone()), &giver_message, &mut report).await;

        let recipient_message = OutboundMessage::direct(text.clone())
            .with_action(MessageAction::grant_back(grant, &context.giver_user_id));
        self.send(DeliveryTarget::User(grant.recipient.clone()), &recipient_message, &mut report)
            .await;

        if !grant.private {
            let broadcast = OutboundMessage::broadcast(text)
                .with_action(MessageAction::grant_back(grant, &context.giver_user_id))
                .with_action(MessageAction::join(grant));
            for channel in self.broadcast_channels(context) {
                self.send(DeliveryTarget::Channel(channel), &broadcast, &mut report).await;
            }
        }

        let record = SinkRecord::from_grant(grant, &self.catalog);
        for sink in &self.sinks {
            let status = self.publish(sink, &record, stored).await;
            report.record(OutcomeTarget::Sink(sink.name()), status);
        }

        report
    }

    async fn send(
        &self,
        target: DeliveryTarget,
        message: &OutboundMessage,
        report: &mut FanoutReport,
    ) {
        debug!(event_name = "fanout.chat.send", target = %target, text = %message.text);
        let status = match self.chat.deliver(&target, message).await {
            Ok(()) => DeliveryStatus::Delivered,
            Err(error) => {
                warn!(
                    event_name = "fanout.chat.failed",
                    target = %target,
                    error = %error,
                    "chat delivery failed"
                );
                DeliveryStatus::Failed(error.to_string())
            }
        };
        report.record(OutcomeTarget::Chat(target), status);
    }

    async fn publish(
        &self,
        sink: &Arc<dyn ReportSink>,
        record: &SinkRecord,
        stored: &StoredGrant,
    ) -> DeliveryStatus {
        if record.is_private && !sink.accepts_private() {
            debug!(
                event_name = "fanout.sink.skipped",
                sink = sink.name(),
                grant_id = %stored.id,
                "private grant not forwarded"
            );
            return DeliveryStatus::Skipped;
        }

        if sink.detached() {
            if let Some(queue) = &self.queue {
                let job_sink = Arc::clone(sink);
                let job_record = record.clone();
                let accepted = queue.submit(sink.name(), async move {
                    job_sink.publish(&job_record).await
                });
                return if accepted {
                    DeliveryStatus::Queued
                } else {
                    DeliveryStatus::Failed("background queue closed".to_owned())
                };
            }
        }

        match sink.publish(record).await {
            Ok(()) => DeliveryStatus::Delivered,
            Err(error) => {
                warn!(
                    event_name = "fanout.sink.failed",
                    sink = sink.name(),
                    grant_id = %stored.id,
                    error = %error,
                    "report sink failed"
                );
                DeliveryStatus::Failed(error.to_string())
            }
        }
    }
}

fn channel_name(channel: &str) -> String {
    let trimmed = channel.trim().trim_start_matches(CHANNEL_PREFIX);
    format!("{CHANNEL_PREFIX}{trimmed}")
}
