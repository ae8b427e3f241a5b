use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, TopicId},
    messaging::{
        port::DeliveryPort,
        types::{DeliveryReceipt, Payload},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// DeliveryPort decorator that rate-limits outbound calls.
///
/// Best-effort defense against Telegram 429 errors on bulk notification
/// fan-outs. It does not guarantee zero 429s, but it should drastically
/// reduce them; the adapter still retries a RetryAfter once.
pub struct ThrottledDelivery {
    inner: Arc<dyn DeliveryPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledDelivery {
    pub fn new(inner: Arc<dyn DeliveryPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = if global_wait > chat_wait {
            global_wait
        } else {
            chat_wait
        };
        if wait > Duration::from_millis(0) {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl DeliveryPort for ThrottledDelivery {
    async fn deliver(
        &self,
        chat_id: ChatId,
        topic_id: Option<TopicId>,
        payload: &Payload,
    ) -> Result<DeliveryReceipt> {
        self.throttle_chat(chat_id.0).await;
        self.inner.deliver(chat_id, topic_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, MessageRef};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Default)]
    struct CountingDelivery {
        next_id: AtomicI32,
    }

    #[async_trait::async_trait]
    impl DeliveryPort for CountingDelivery {
        async fn deliver(
            &self,
            chat_id: ChatId,
            topic_id: Option<TopicId>,
            _payload: &Payload,
        ) -> Result<DeliveryReceipt> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(DeliveryReceipt {
                message: MessageRef {
                    chat_id,
                    message_id: MessageId(id),
                },
                topic_id,
            })
        }
    }

    #[tokio::test]
    async fn passes_through_and_preserves_receipt() {
        let cfg = ThrottleConfig {
            global_min_interval: Duration::from_millis(0),
            per_chat_min_interval: Duration::from_millis(0),
        };
        let throttled = ThrottledDelivery::new(Arc::new(CountingDelivery::default()), cfg);

        let r1 = throttled
            .deliver(ChatId(1), Some(TopicId(5)), &Payload::text("a"))
            .await
            .unwrap();
        let r2 = throttled
            .deliver(ChatId(1), None, &Payload::text("b"))
            .await
            .unwrap();

        assert_eq!(r1.topic_id, Some(TopicId(5)));
        assert_eq!(r2.topic_id, None);
        assert_eq!(r1.message.message_id, MessageId(1));
        assert_eq!(r2.message.message_id, MessageId(2));
    }
}
