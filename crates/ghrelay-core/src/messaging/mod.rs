//! Outbound messaging abstractions (Telegram today; other channels later).

pub mod port;
pub mod types;
