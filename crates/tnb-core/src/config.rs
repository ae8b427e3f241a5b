use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration for the notifier.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,

    // Telegram limits
    pub telegram_message_limit: usize,
    pub button_label_max_length: usize,

    // Outbound throttling
    pub global_min_interval: Duration,
    pub per_chat_min_interval: Duration,

    // Behavior flags
    pub default_parse_html: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let telegram_message_limit = env_usize("TELEGRAM_MESSAGE_LIMIT").unwrap_or(4096);
        let button_label_max_length = env_usize("BUTTON_LABEL_MAX_LENGTH").unwrap_or(30);

        let global_min_interval =
            Duration::from_millis(env_u64("GLOBAL_MIN_INTERVAL_MS").unwrap_or(40));
        let per_chat_min_interval =
            Duration::from_millis(env_u64("PER_CHAT_MIN_INTERVAL_MS").unwrap_or(1050));

        // The original notifier sent everything as HTML unless told otherwise.
        let default_parse_html = env_bool("DEFAULT_PARSE_HTML").unwrap_or(true);

        Ok(Self {
            telegram_bot_token,
            telegram_message_limit,
            button_label_max_length,
            global_min_interval,
            per_chat_min_interval,
            default_parse_html,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}
