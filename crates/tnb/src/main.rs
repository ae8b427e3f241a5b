use std::sync::Arc;

use teloxide::Bot;
use tracing::{info, warn};

use tnb_core::{
    config::Config,
    dispatch::Dispatcher,
    domain::{ChatId, TopicId},
    errors::Error,
    messaging::{
        port::{ChatProbe, DeliveryPort},
        throttled::{ThrottleConfig, ThrottledDelivery},
        types::{InlineKeyboard, Payload},
    },
    registry::ChatRegistry,
    routing::SendRequest,
};
use tnb_telegram::TelegramGateway;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tnb_core::logging::init("tnb")?;

    let cfg = Arc::new(Config::load()?);
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let gateway = Arc::new(TelegramGateway::new(
        bot.clone(),
        cfg.telegram_message_limit,
    ));

    let raw_delivery: Arc<dyn DeliveryPort> = gateway.clone();
    let delivery: Arc<dyn DeliveryPort> = Arc::new(ThrottledDelivery::new(
        raw_delivery,
        ThrottleConfig {
            global_min_interval: cfg.global_min_interval,
            per_chat_min_interval: cfg.per_chat_min_interval,
        },
    ));

    let probe: Arc<dyn ChatProbe> = gateway.clone();
    let registry = Arc::new(ChatRegistry::new(probe));
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), delivery));

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => {
            tnb_telegram::router::run_polling(cfg, registry, dispatcher, bot)
                .await
                .map_err(|e| Error::External(format!("telegram bot failed: {e}")))?;
            Ok(())
        }
        Some("send") => send_once(&cfg, &registry, &dispatcher, &args[1..]).await,
        Some("send-all") => send_all_once(&cfg, &registry, &dispatcher, &args[1..]).await,
        Some(other) => Err(Error::Config(format!(
            "unknown command: {other} (run without arguments for polling, or `tnb send` / `tnb send-all`)"
        ))),
    }
}

/// One-shot mode: `tnb send <chat_id> [--topic N] [--button label=data]... <text>`.
///
/// Registers the chat first (the registry is in-memory, so a fresh process
/// knows nothing), then routes and delivers.
async fn send_once(
    cfg: &Config,
    registry: &ChatRegistry,
    dispatcher: &Dispatcher,
    args: &[String],
) -> Result<(), Error> {
    const USAGE: &str = "usage: tnb send <chat_id> [--topic N] [--button label=data]... <text>";

    let mut iter = args.iter();
    let chat_id = iter
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .map(ChatId)
        .ok_or_else(|| Error::Config(USAGE.to_string()))?;

    let mut topic_id: Option<TopicId> = None;
    let mut buttons: Vec<(String, String)> = Vec::new();
    let mut words: Vec<&str> = Vec::new();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--topic" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| Error::Config("--topic requires a value".to_string()))?;
                let v = raw
                    .parse::<i32>()
                    .map_err(|_| Error::Config(format!("invalid topic id: {raw}")))?;
                topic_id = Some(TopicId(v));
            }
            "--button" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| Error::Config("--button requires label=data".to_string()))?;
                let (label, data) = raw
                    .split_once('=')
                    .ok_or_else(|| Error::Config(format!("invalid button spec: {raw}")))?;
                buttons.push((label.to_string(), data.to_string()));
            }
            word => words.push(word),
        }
    }

    if words.is_empty() {
        return Err(Error::Config(USAGE.to_string()));
    }
    let text = words.join(" ");

    let mut payload = if cfg.default_parse_html {
        Payload::html(text)
    } else {
        Payload::text(text)
    };
    if !buttons.is_empty() {
        payload = payload.with_keyboard(InlineKeyboard::one_per_row(
            &buttons,
            cfg.button_label_max_length,
        ));
    }

    let record = registry.register(chat_id, topic_id).await?;
    info!(
        chat_id = chat_id.0,
        kind = ?record.kind,
        topics_enabled = record.topics_enabled,
        "chat registered for one-shot send"
    );

    let receipt = dispatcher
        .send(SendRequest {
            chat_id,
            topic_id,
            payload,
        })
        .await?;

    info!(
        message_id = receipt.message.message_id.0,
        topic = receipt.topic_id.map(|t| t.0),
        "delivered"
    );
    Ok(())
}

/// Bulk one-shot mode: `tnb send-all <chat_id,chat_id,...> <text>`.
///
/// Registers each chat, fans the payload out, and prints the sent/failed
/// report as JSON.
async fn send_all_once(
    cfg: &Config,
    registry: &ChatRegistry,
    dispatcher: &Dispatcher,
    args: &[String],
) -> Result<(), Error> {
    const USAGE: &str = "usage: tnb send-all <chat_id,chat_id,...> <text>";

    let mut iter = args.iter();
    let raw_ids = iter.next().ok_or_else(|| Error::Config(USAGE.to_string()))?;
    let chat_ids = raw_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map(ChatId)
                .map_err(|_| Error::Config(format!("invalid chat id: {s}")))
        })
        .collect::<Result<Vec<ChatId>, Error>>()?;
    if chat_ids.is_empty() {
        return Err(Error::Config(USAGE.to_string()));
    }

    let words: Vec<&str> = iter.map(String::as_str).collect();
    if words.is_empty() {
        return Err(Error::Config(USAGE.to_string()));
    }
    let text = words.join(" ");

    let payload = if cfg.default_parse_html {
        Payload::html(text)
    } else {
        Payload::text(text)
    };

    for &chat_id in &chat_ids {
        // A failed registration surfaces as UnknownChat in the outcome below.
        if let Err(e) = registry.register(chat_id, None).await {
            warn!(chat_id = chat_id.0, error = %e, "registration failed");
        }
    }

    let outcome = dispatcher.send_to_all(&chat_ids, &payload).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
