//! Long-polling command router: in-band registration and status.
//!
//! The notifier itself is outbound-only; the only inbound traffic we care
//! about is chats registering themselves (`/register`) and checking what
//! the registry knows about them (`/status`).

use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use tnb_core::{
    config::Config,
    dispatch::Dispatcher as NotifyDispatcher,
    domain::{ChatId, TopicId},
    messaging::types::Payload,
    registry::ChatRegistry,
    routing::SendRequest,
};

use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub registry: Arc<ChatRegistry>,
    pub notify: Arc<NotifyDispatcher>,
    pub chat_locks: Arc<ChatLocks>,
}

#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    registry: Arc<ChatRegistry>,
    notify: Arc<NotifyDispatcher>,
    bot: Bot,
) -> anyhow::Result<()> {
    if let Ok(me) = bot.get_me().await {
        info!("tnb started: @{}", me.username());
    }

    let state = Arc::new(AppState {
        cfg,
        registry,
        notify,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

const HELP_TEXT: &str = "Commands:\n\
    /register [topic_id] - register this chat (detects topic support)\n\
    /status - show the registered record for this chat\n\
    /test [text] - send a test notification through the routing pipeline\n\
    /help - this message";

async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Own the text up front; the handlers below take `msg` by value.
    let Some(text) = msg.text().map(str::to_string) else {
        // Outbound-only bot: nothing to do with media or plain chatter.
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let (command, arg) = parse_command(&text);
    match command {
        "/register" => handle_register(bot, msg, state, arg).await,
        "/status" => handle_status(bot, msg, state).await,
        "/test" => handle_test(bot, msg, state, test_body(&text).to_string()).await,
        _ => reply(&bot, &msg, HELP_TEXT).await,
    }
}

/// Split a command message into the bare command (bot mention stripped) and
/// its first argument: `/register@NotifyBot 42` -> `("/register", Some("42"))`.
fn parse_command(text: &str) -> (&str, Option<&str>) {
    let mut parts = text.split_whitespace();
    let command = parts
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default();
    (command, parts.next())
}

fn parse_topic_id(raw: &str) -> Option<TopicId> {
    raw.parse::<i32>().ok().map(TopicId)
}

/// Everything after the command word, or the default test body.
fn test_body(text: &str) -> &str {
    text.split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("Test notification")
}

async fn handle_register(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    arg: Option<&str>,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let _guard = state.chat_locks.lock_chat(chat_id.0).await;

    // Prefer an explicit topic id; otherwise probe the topic the command
    // itself arrived in, if any.
    let topic_id = match arg {
        Some(raw) => match parse_topic_id(raw) {
            Some(topic) => Some(topic),
            None => {
                return reply(&bot, &msg, "Topic id must be a number, e.g. /register 42").await;
            }
        },
        None => msg.thread_id.map(TopicId),
    };

    match state.registry.register(chat_id, topic_id).await {
        Ok(record) => {
            let topics = if record.topics_enabled {
                "topics enabled"
            } else {
                "topics unavailable"
            };
            reply(
                &bot,
                &msg,
                &format!("Registered {:?} \"{}\" ({topics}).", record.kind, record.title),
            )
            .await
        }
        Err(e) => reply(&bot, &msg, &format!("Registration failed: {e}")).await,
    }
}

async fn handle_status(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    match state.registry.lookup(chat_id).await {
        Ok(record) => {
            let text = format!(
                "Chat {}: {:?} \"{}\"\nTopics enabled: {}\nRegistered at: {}",
                record.chat_id.0,
                record.kind,
                record.title,
                record.topics_enabled,
                record.registered_at.to_rfc3339(),
            );
            reply(&bot, &msg, &text).await
        }
        Err(_) => reply(&bot, &msg, "This chat is not registered. Send /register first.").await,
    }
}

async fn handle_test(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    body: String,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let payload = if state.cfg.default_parse_html {
        Payload::html(body)
    } else {
        Payload::text(body)
    };

    let request = SendRequest {
        chat_id,
        topic_id: msg.thread_id.map(TopicId),
        payload,
    };

    if let Err(e) = state.notify.send(request).await {
        return reply(&bot, &msg, &format!("Test send failed: {e}")).await;
    }
    Ok(())
}

async fn reply(bot: &Bot, msg: &Message, text: &str) -> ResponseResult<()> {
    let mut req = bot.send_message(msg.chat.id, text);
    if let Some(thread) = msg.thread_id {
        req = req.message_thread_id(thread);
    }
    req.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_mention_is_stripped() {
        assert_eq!(
            parse_command("/register@NotifyBot 42"),
            ("/register", Some("42"))
        );
    }

    #[test]
    fn command_without_argument() {
        assert_eq!(parse_command("/status"), ("/status", None));
    }

    #[test]
    fn only_first_argument_is_taken() {
        assert_eq!(parse_command("/register 1 2"), ("/register", Some("1")));
    }

    #[test]
    fn topic_id_must_be_numeric() {
        assert_eq!(parse_topic_id("42"), Some(TopicId(42)));
        assert_eq!(parse_topic_id("general"), None);
        assert_eq!(parse_topic_id(""), None);
    }

    #[test]
    fn test_body_strips_the_command_word() {
        assert_eq!(test_body("/test hello world"), "hello world");
        assert_eq!(test_body("/test@NotifyBot ping"), "ping");
    }

    #[test]
    fn test_body_defaults_when_empty() {
        assert_eq!(test_body("/test"), "Test notification");
        assert_eq!(test_body("/test   "), "Test notification");
    }
}
