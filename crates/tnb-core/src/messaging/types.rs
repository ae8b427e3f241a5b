use crate::{
    domain::{MessageRef, TopicId},
    routing::ChatKind,
};

/// Outbound notification body.
///
/// Opaque to the routing resolver; only the delivery adapter interprets it.
#[derive(Clone, Debug)]
pub struct Payload {
    pub text: String,
    /// Render as HTML (the default for the original notifier).
    pub html: bool,
    pub keyboard: Option<InlineKeyboard>,
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: false,
            keyboard: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Inline keyboard (buttons) attached to a notification.
#[derive(Clone, Debug)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(pairs: &[(String, String)], max_label_len: usize) -> Self {
        let mut buttons = Vec::new();
        for (label, callback_data) in pairs {
            let label = if label.len() > max_label_len {
                format!("{}...", label.chars().take(max_label_len).collect::<String>())
            } else {
                label.clone()
            };
            buttons.push(InlineButton {
                label,
                callback_data: callback_data.clone(),
            });
        }
        Self { buttons }
    }
}

/// Chat metadata as observed by the messenger at registration time.
#[derive(Clone, Debug)]
pub struct ChatInfo {
    pub kind: ChatKind,
    pub title: String,
    /// Whether the messenger reports the chat as a forum (topics on).
    /// Used as the detection fallback when no topic is available to probe.
    pub is_forum: bool,
}

/// Result of one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message: MessageRef,
    /// Topic the message was actually addressed to, if any.
    pub topic_id: Option<TopicId>,
}
