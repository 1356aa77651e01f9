use std::time::Duration;

use chrono::{DateTime, Utc};

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the poller can
/// tell a throttled send or a rate-limited feed apart from a plain failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("source rate limit exceeded (resets at {})", fmt_reset(.reset_at))]
    SourceRateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("throttled by channel (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    #[error("format error: {0}")]
    Format(String),
}

fn fmt_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    reset_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

pub type Result<T> = std::result::Result<T, Error>;
