//! Telegram adapter (teloxide).
//!
//! This crate implements the `tnb-core` delivery and capability-probe ports
//! over the Telegram Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};

use tokio::time::sleep;

pub mod router;

use tnb_core::{
    domain::{ChatId, MessageId, MessageRef, TopicId},
    errors::Error,
    messaging::{
        port::{ChatProbe, DeliveryPort},
        types::{ChatInfo, DeliveryReceipt, InlineKeyboard, Payload},
    },
    routing::ChatKind,
    Result,
};

#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
    message_limit: usize,
}

impl TelegramGateway {
    pub fn new(bot: Bot, message_limit: usize) -> Self {
        Self { bot, message_limit }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    fn markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .iter()
            .map(|b| {
                vec![InlineKeyboardButton::callback(
                    b.label.clone(),
                    b.callback_data.clone(),
                )]
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }
}

/// Truncate to at most `limit` characters, preserving char boundaries.
fn clip_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect()
}

#[async_trait]
impl DeliveryPort for TelegramGateway {
    async fn deliver(
        &self,
        chat_id: ChatId,
        topic_id: Option<TopicId>,
        payload: &Payload,
    ) -> Result<DeliveryReceipt> {
        let text = clip_text(&payload.text, self.message_limit);

        let msg = self
            .with_retry(|| {
                let mut req = self.bot.send_message(Self::tg_chat(chat_id), text.clone());
                if let Some(topic) = topic_id {
                    req = req.message_thread_id(topic.0);
                }
                if payload.html {
                    req = req.parse_mode(ParseMode::Html);
                }
                if let Some(keyboard) = &payload.keyboard {
                    req = req.reply_markup(Self::markup(keyboard));
                }
                req
            })
            .await?;

        Ok(DeliveryReceipt {
            message: MessageRef {
                chat_id,
                message_id: MessageId(msg.id.0),
            },
            topic_id,
        })
    }
}

#[async_trait]
impl ChatProbe for TelegramGateway {
    async fn chat_info(&self, chat_id: ChatId) -> Result<ChatInfo> {
        let chat = self
            .with_retry(|| self.bot.get_chat(Self::tg_chat(chat_id)))
            .await?;

        use teloxide::types::{ChatKind as TgChatKind, PublicChatKind};

        let (kind, is_forum) = match &chat.kind {
            TgChatKind::Public(public) => match &public.kind {
                PublicChatKind::Channel(_) => (ChatKind::Channel, false),
                PublicChatKind::Group(_) => (ChatKind::Group, false),
                PublicChatKind::Supergroup(sg) => (ChatKind::Supergroup, sg.is_forum),
            },
            // Private user chats behave like topic-less groups for routing.
            TgChatKind::Private(_) => (ChatKind::Group, false),
        };

        let title = chat
            .title()
            .map(str::to_string)
            .or_else(|| match &chat.kind {
                TgChatKind::Private(p) => p.first_name.clone(),
                _ => None,
            })
            .unwrap_or_default();

        Ok(ChatInfo {
            kind,
            title,
            is_forum,
        })
    }

    async fn probe_topic(&self, chat_id: ChatId, topic_id: TopicId) -> Result<bool> {
        // A typing action scoped to the thread: invisible to members, but the
        // API rejects it when the chat has no such topic (or no topics at all).
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let res = self
                .bot
                .send_chat_action(Self::tg_chat(chat_id), teloxide::types::ChatAction::Typing)
                .message_thread_id(topic_id.0)
                .await;

            return match res {
                Ok(_) => Ok(true),
                Err(teloxide::RequestError::Api(_)) => Ok(false),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                    continue;
                }
                Err(other) => Err(Self::map_err(other)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_text_leaves_short_text_alone() {
        assert_eq!(clip_text("hello", 4096), "hello");
    }

    #[test]
    fn clip_text_respects_char_boundaries() {
        let s = "héllo wörld";
        let clipped = clip_text(s, 7);
        assert_eq!(clipped, "héllo w");
    }
}
