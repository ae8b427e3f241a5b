//! In-memory chat registry: the registration collaborator.
//!
//! Topic capability is detected once, here, and cached in the immutable
//! [`ChatRecord`]; the send path never re-detects it. Persistence across
//! restarts is deliberately out of scope, so a restart means re-registering.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    domain::{ChatId, TopicId},
    errors::Error,
    messaging::port::ChatProbe,
    routing::{ChatKind, ChatRecord},
    Result,
};

pub struct ChatRegistry {
    probe: Arc<dyn ChatProbe>,
    records: Mutex<HashMap<i64, Arc<ChatRecord>>>,
}

impl ChatRegistry {
    pub fn new(probe: Arc<dyn ChatProbe>) -> Self {
        Self {
            probe,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or re-register) a chat, detecting topic capability.
    ///
    /// Detection:
    /// - channels never support topics, so no probe is performed;
    /// - with a `topic_id` supplied, a topic-scoped operation is attempted
    ///   and its observed outcome becomes `topics_enabled`;
    /// - without one, the forum flag from the metadata fetch is used.
    ///
    /// An existing record for the chat is replaced wholesale.
    pub async fn register(
        &self,
        chat_id: ChatId,
        topic_id: Option<TopicId>,
    ) -> Result<Arc<ChatRecord>> {
        let chat = self.probe.chat_info(chat_id).await?;

        let topics_enabled = if chat.kind == ChatKind::Channel {
            false
        } else {
            match topic_id {
                Some(topic) => self.probe.probe_topic(chat_id, topic).await?,
                None => chat.is_forum,
            }
        };

        let record = Arc::new(ChatRecord {
            chat_id,
            kind: chat.kind,
            topics_enabled,
            title: chat.title,
            registered_at: Utc::now(),
        });

        info!(
            chat_id = chat_id.0,
            kind = ?record.kind,
            topics_enabled,
            title = %record.title,
            "registered chat"
        );

        let mut map = self.records.lock().await;
        map.insert(chat_id.0, record.clone());
        Ok(record)
    }

    /// Look up the registered record for a chat.
    ///
    /// The returned snapshot stays valid for the duration of one send even
    /// if the chat is re-registered concurrently.
    pub async fn lookup(&self, chat_id: ChatId) -> Result<Arc<ChatRecord>> {
        let map = self.records.lock().await;
        map.get(&chat_id.0)
            .cloned()
            .ok_or(Error::UnknownChat(chat_id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::types::ChatInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeProbe {
        kind: ChatKind,
        is_forum: bool,
        probe_result: AtomicBool,
        probe_calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(kind: ChatKind, is_forum: bool, probe_result: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                is_forum,
                probe_result: AtomicBool::new(probe_result),
                probe_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatProbe for FakeProbe {
        async fn chat_info(&self, _chat_id: ChatId) -> Result<ChatInfo> {
            Ok(ChatInfo {
                kind: self.kind,
                title: "fake".to_string(),
                is_forum: self.is_forum,
            })
        }

        async fn probe_topic(&self, _chat_id: ChatId, _topic_id: TopicId) -> Result<bool> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.probe_result.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn channel_is_never_probed() {
        let probe = FakeProbe::new(ChatKind::Channel, false, true);
        let registry = ChatRegistry::new(probe.clone());

        let record = registry
            .register(ChatId(-100), Some(TopicId(5)))
            .await
            .unwrap();

        assert_eq!(record.kind, ChatKind::Channel);
        assert!(!record.topics_enabled);
        assert_eq!(probe.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_outcome_becomes_topics_enabled() {
        let probe = FakeProbe::new(ChatKind::Supergroup, false, true);
        let registry = ChatRegistry::new(probe.clone());

        let record = registry
            .register(ChatId(-100), Some(TopicId(5)))
            .await
            .unwrap();

        assert!(record.topics_enabled);
        assert_eq!(probe.probe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forum_flag_used_when_no_topic_to_probe() {
        let probe = FakeProbe::new(ChatKind::Supergroup, true, false);
        let registry = ChatRegistry::new(probe.clone());

        let record = registry.register(ChatId(-100), None).await.unwrap();

        assert!(record.topics_enabled);
        assert_eq!(probe.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reregistration_replaces_record() {
        let probe = FakeProbe::new(ChatKind::Group, false, true);
        let registry = ChatRegistry::new(probe.clone());

        let first = registry
            .register(ChatId(-1), Some(TopicId(1)))
            .await
            .unwrap();
        assert!(first.topics_enabled);

        probe.probe_result.store(false, Ordering::SeqCst);
        let second = registry
            .register(ChatId(-1), Some(TopicId(1)))
            .await
            .unwrap();
        assert!(!second.topics_enabled);

        let looked_up = registry.lookup(ChatId(-1)).await.unwrap();
        assert!(!looked_up.topics_enabled);
        // The first snapshot is untouched by the replacement.
        assert!(first.topics_enabled);
    }

    #[tokio::test]
    async fn lookup_of_unregistered_chat_fails() {
        let probe = FakeProbe::new(ChatKind::Group, false, false);
        let registry = ChatRegistry::new(probe);

        let err = registry.lookup(ChatId(42)).await.unwrap_err();
        assert!(matches!(err, Error::UnknownChat(42)));
    }
}
