use async_trait::async_trait;

use crate::{
    domain::{ChatId, TopicId},
    messaging::types::{ChatInfo, DeliveryReceipt, Payload},
    Result,
};

/// Outbound delivery port.
///
/// Telegram is the first implementation; the shape is messenger-neutral so
/// future adapters can fit behind the same interface.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    /// Deliver `payload` to `chat_id`, addressed to `topic_id` when the
    /// routing decision applied one.
    async fn deliver(
        &self,
        chat_id: ChatId,
        topic_id: Option<TopicId>,
        payload: &Payload,
    ) -> Result<DeliveryReceipt>;
}

/// Capability-detection port used once per chat at registration time.
#[async_trait]
pub trait ChatProbe: Send + Sync {
    /// Fetch chat metadata (kind, title, forum flag).
    async fn chat_info(&self, chat_id: ChatId) -> Result<ChatInfo>;

    /// Attempt a topic-scoped operation against `topic_id` and report
    /// whether the messenger accepted it. `Ok(false)` means the chat does
    /// not support topic addressing; `Err` means the probe itself failed
    /// (network etc.) and registration should be retried.
    async fn probe_topic(&self, chat_id: ChatId, topic_id: TopicId) -> Result<bool>;
}
