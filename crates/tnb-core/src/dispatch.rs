//! Send pipeline: registry lookup, routing decision, delivery.
//!
//! The dispatcher is the only caller of the resolver; the decision record
//! it produces is logged for auditing before the message leaves.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    domain::ChatId,
    messaging::{
        port::DeliveryPort,
        types::{DeliveryReceipt, Payload},
    },
    registry::ChatRegistry,
    routing::{resolve, SendRequest},
    Result,
};

pub struct Dispatcher {
    registry: Arc<ChatRegistry>,
    delivery: Arc<dyn DeliveryPort>,
}

/// Outcome of a bulk fan-out. Per-chat failures do not abort the batch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BulkOutcome {
    pub sent: Vec<i64>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkFailure {
    pub chat_id: i64,
    pub error: String,
}

impl Dispatcher {
    pub fn new(registry: Arc<ChatRegistry>, delivery: Arc<dyn DeliveryPort>) -> Self {
        Self { registry, delivery }
    }

    /// Send one message, routing it to a topic when the chat supports it.
    pub async fn send(&self, request: SendRequest) -> Result<DeliveryReceipt> {
        let record = self.registry.lookup(request.chat_id).await?;
        let decision = resolve(&record, &request)?;

        info!(
            chat_id = request.chat_id.0,
            reason = decision.reason.code(),
            topic_used = decision.topic_used,
            effective_topic = decision.effective_topic_id.map(|t| t.0),
            "routing decision"
        );

        self.delivery
            .deliver(request.chat_id, decision.effective_topic_id, &request.payload)
            .await
    }

    /// Deliver the same payload to many chats, collecting per-chat outcomes.
    ///
    /// No topic addressing here: bulk notifications go to the bare chat.
    pub async fn send_to_all(&self, chat_ids: &[ChatId], payload: &Payload) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for &chat_id in chat_ids {
            let request = SendRequest {
                chat_id,
                topic_id: None,
                payload: payload.clone(),
            };
            match self.send(request).await {
                Ok(_) => outcome.sent.push(chat_id.0),
                Err(e) => {
                    warn!(chat_id = chat_id.0, error = %e, "bulk delivery failed");
                    outcome.failed.push(BulkFailure {
                        chat_id: chat_id.0,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }
}
