//! Topic routing: decide, per outbound message, whether a send addresses a
//! forum topic or the bare chat.
//!
//! The decision consumes a previously registered [`ChatRecord`]; capability
//! detection happens once at registration time (see [`crate::registry`]),
//! never here.

use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, TopicId},
    errors::Error,
    messaging::types::Payload,
    Result,
};

/// Kind of chat as reported by the messenger at registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    /// Broadcast-only chat; no topic/thread subdivision exists.
    Channel,
    Group,
    Supergroup,
}

/// Immutable per-chat metadata captured at registration.
///
/// Re-registration replaces the whole record; nothing mutates it in place.
#[derive(Clone, Debug)]
pub struct ChatRecord {
    pub chat_id: ChatId,
    pub kind: ChatKind,
    pub topics_enabled: bool,
    pub title: String,
    pub registered_at: DateTime<Utc>,
}

/// One outbound message. Consumed once by the resolver; not persisted.
#[derive(Clone, Debug)]
pub struct SendRequest {
    pub chat_id: ChatId,
    pub topic_id: Option<TopicId>,
    pub payload: Payload,
}

/// Why the resolver did (or did not) apply a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingReason {
    NotApplicableChannel,
    TopicsDisabled,
    TopicApplied,
    NoTopicRequested,
}

impl RoutingReason {
    /// Stable code for log lines and audit records.
    pub fn code(self) -> &'static str {
        match self {
            RoutingReason::NotApplicableChannel => "not_applicable_channel",
            RoutingReason::TopicsDisabled => "topics_disabled",
            RoutingReason::TopicApplied => "topic_applied",
            RoutingReason::NoTopicRequested => "no_topic_requested",
        }
    }
}

/// Outcome of one routing decision.
///
/// Invariant: `effective_topic_id.is_some() == topic_used`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    pub effective_topic_id: Option<TopicId>,
    pub topic_used: bool,
    pub reason: RoutingReason,
}

impl RoutingDecision {
    fn skip(reason: RoutingReason) -> Self {
        Self {
            effective_topic_id: None,
            topic_used: false,
            reason,
        }
    }
}

/// Decide the effective destination for `request` within `chat`.
///
/// Pure and total apart from the precondition check: the caller must have
/// looked up the record matching the request's chat id.
pub fn resolve(chat: &ChatRecord, request: &SendRequest) -> Result<RoutingDecision> {
    if chat.chat_id != request.chat_id {
        return Err(Error::InvalidArgument(format!(
            "chat record {} does not match request chat {}",
            chat.chat_id.0, request.chat_id.0
        )));
    }

    if chat.kind == ChatKind::Channel {
        // Channels have no threads; a supplied topic id is meaningless.
        return Ok(RoutingDecision::skip(RoutingReason::NotApplicableChannel));
    }

    let Some(topic_id) = request.topic_id else {
        return Ok(RoutingDecision::skip(RoutingReason::NoTopicRequested));
    };

    if !chat.topics_enabled {
        // Topic id is discarded, not an error: the message still goes out.
        return Ok(RoutingDecision::skip(RoutingReason::TopicsDisabled));
    }

    Ok(RoutingDecision {
        effective_topic_id: Some(topic_id),
        topic_used: true,
        reason: RoutingReason::TopicApplied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ChatKind, topics_enabled: bool) -> ChatRecord {
        ChatRecord {
            chat_id: ChatId(-100),
            kind,
            topics_enabled,
            title: "test chat".to_string(),
            registered_at: Utc::now(),
        }
    }

    fn request(topic_id: Option<i32>) -> SendRequest {
        SendRequest {
            chat_id: ChatId(-100),
            topic_id: topic_id.map(TopicId),
            payload: Payload::text("hi"),
        }
    }

    #[test]
    fn channel_ignores_supplied_topic() {
        let d = resolve(&record(ChatKind::Channel, false), &request(Some(999))).unwrap();
        assert!(!d.topic_used);
        assert_eq!(d.effective_topic_id, None);
        assert_eq!(d.reason, RoutingReason::NotApplicableChannel);
    }

    #[test]
    fn channel_with_topics_flag_still_not_applicable() {
        // A record claiming topics_enabled on a channel never routes to a topic.
        let d = resolve(&record(ChatKind::Channel, true), &request(Some(7))).unwrap();
        assert!(!d.topic_used);
        assert_eq!(d.reason, RoutingReason::NotApplicableChannel);
    }

    #[test]
    fn supergroup_with_topics_applies_topic() {
        let d = resolve(&record(ChatKind::Supergroup, true), &request(Some(12345))).unwrap();
        assert!(d.topic_used);
        assert_eq!(d.effective_topic_id, Some(TopicId(12345)));
        assert_eq!(d.reason, RoutingReason::TopicApplied);
    }

    #[test]
    fn group_without_topics_discards_topic() {
        let d = resolve(&record(ChatKind::Group, false), &request(Some(12345))).unwrap();
        assert!(!d.topic_used);
        assert_eq!(d.effective_topic_id, None);
        assert_eq!(d.reason, RoutingReason::TopicsDisabled);
    }

    #[test]
    fn supergroup_without_requested_topic() {
        let d = resolve(&record(ChatKind::Supergroup, true), &request(None)).unwrap();
        assert!(!d.topic_used);
        assert_eq!(d.reason, RoutingReason::NoTopicRequested);
    }

    #[test]
    fn absent_topic_never_routes_to_topic() {
        for kind in [ChatKind::Channel, ChatKind::Group, ChatKind::Supergroup] {
            for enabled in [false, true] {
                let d = resolve(&record(kind, enabled), &request(None)).unwrap();
                assert!(!d.topic_used, "{kind:?} enabled={enabled}");
                assert_eq!(d.effective_topic_id, None);
            }
        }
    }

    #[test]
    fn effective_topic_set_iff_topic_used() {
        for kind in [ChatKind::Channel, ChatKind::Group, ChatKind::Supergroup] {
            for enabled in [false, true] {
                for topic in [None, Some(42)] {
                    let d = resolve(&record(kind, enabled), &request(topic)).unwrap();
                    assert_eq!(d.effective_topic_id.is_some(), d.topic_used);
                }
            }
        }
    }

    #[test]
    fn mismatched_chat_id_is_invalid_argument() {
        let chat = record(ChatKind::Group, true);
        let mut req = request(Some(1));
        req.chat_id = ChatId(-200);
        let err = resolve(&chat, &req).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
