use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use tokenbot_core::errors::DeliveryError;
use tokenbot_core::notify::{ChatDelivery, DeliveryTarget, OutboundMessage};

use crate::blocks::outbound_message;
use crate::client::SlackApi;
use crate::directory::UserDirectory;

/// Posts fan-out messages through the Web API. Users are addressed by handle
/// and resolved to their id, which `chat.postMessage` treats as the bot DM.
pub struct SlackChatDelivery {
    api: Arc<dyn SlackApi>,
    directory: UserDirectory,
}

impl SlackChatDelivery {
    pub fn new(api: Arc<dyn SlackApi>, directory: UserDirectory) -> Self {
        Self { api, directory }
    }

    async fn channel_for(&self, target: &DeliveryTarget) -> Result<String, DeliveryError> {
        match target {
            DeliveryTarget::Channel(channel) => Ok(channel.clone()),
            DeliveryTarget::User(handle) => self
                .directory
                .user_id_for(handle)
                .await?
                .ok_or_else(|| DeliveryError::Api(format!("no slack user named {handle}"))),
        }
    }
}

#[async_trait]
impl ChatDelivery for SlackChatDelivery {
    async fn deliver(
        &self,
        target: &DeliveryTarget,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        let channel = self.channel_for(target).await?;
        let template = outbound_message(message);
        debug!(
            event_name = "slack.delivery.post",
            target = %target,
            channel = %channel,
            actions = message.actions.len(),
            "posting grant notification"
        );
        self.api.post_message(&channel, &template).await.map_err(DeliveryError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokenbot_core::errors::DeliveryError;
    use tokenbot_core::notify::{ChatDelivery, DeliveryTarget, OutboundMessage};

    use super::SlackChatDelivery;
    use crate::client::testing::{ApiCall, RecordingSlackApi};
    use crate::directory::UserDirectory;

    fn delivery(api: Arc<RecordingSlackApi>) -> SlackChatDelivery {
        let directory = UserDirectory::new(api.clone(), Duration::from_secs(600));
        SlackChatDelivery::new(api, directory)
    }

    #[tokio::test]
    async fn users_are_resolved_and_channels_posted_as_is() {
        let api = Arc::new(RecordingSlackApi::with_users(&[("U2", "bob")]));
        let delivery = delivery(api.clone());
        let message = OutboundMessage::direct("hello");

        delivery.deliver(&DeliveryTarget::User("@bob".to_owned()), &message).await.expect("dm");
        delivery
            .deliver(&DeliveryTarget::Channel("#general".to_owned()), &message)
            .await
            .expect("channel");

        let channels: Vec<String> = api
            .calls()
            .into_iter()
            .map(|call| match call {
                ApiCall::PostMessage { channel, message } => {
                    assert_eq!(message.fallback_text, "hello");
                    channel
                }
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(channels, vec!["U2", "#general"]);
    }

    #[tokio::test]
    async fn unknown_users_and_api_failures_surface_as_delivery_errors() {
        let api = Arc::new(RecordingSlackApi {
            failing_channels: vec!["#closed".to_owned()],
            ..RecordingSlackApi::with_users(&[])
        });
        let delivery = delivery(api.clone());
        let message = OutboundMessage::broadcast("hello");

        let unknown = delivery.deliver(&DeliveryTarget::User("@ghost".to_owned()), &message).await;
        assert!(matches!(unknown, Err(DeliveryError::Api(detail)) if detail.contains("@ghost")));

        let closed = delivery.deliver(&DeliveryTarget::Channel("#closed".to_owned()), &message).await;
        assert_eq!(closed, Err(DeliveryError::Api("channel_not_found".to_owned())));
        assert!(api.calls().is_empty());
    }
}
