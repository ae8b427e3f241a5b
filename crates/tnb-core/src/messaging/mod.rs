//! Messenger-facing abstractions (Telegram today; other messengers later).

pub mod port;
pub mod throttled;
pub mod types;
