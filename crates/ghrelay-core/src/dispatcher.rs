//! Rate-limited delivery of formatted messages to the destination chat.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    domain::{ChatId, MessageRef},
    formatting::truncate_message,
    messaging::port::MessagingPort,
    rate_limit::RateLimiter,
    Error,
};

pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Result of one delivery attempt.
#[derive(Debug)]
pub enum Delivery {
    Delivered(MessageRef),
    /// The channel pushed back; the dispatcher already waited `retry_after`.
    Throttled { retry_after: Duration },
    Failed(Error),
}

pub struct Dispatcher {
    messenger: Arc<dyn MessagingPort>,
    limiter: Arc<RateLimiter>,
    chat_id: ChatId,
    default_retry_after: Duration,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        limiter: Arc<RateLimiter>,
        chat_id: ChatId,
    ) -> Self {
        Self {
            messenger,
            limiter,
            chat_id,
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }

    pub fn with_default_retry_after(mut self, d: Duration) -> Self {
        self.default_retry_after = d;
        self
    }

    /// Send one message. Never retries: a throttled attempt sleeps for the
    /// signaled delay and reports `Throttled` so the caller decides what next.
    pub async fn deliver(&self, html: &str) -> Delivery {
        self.limiter.acquire().await;

        let max_len = self.messenger.capabilities().max_message_len;
        let body = truncate_message(html, max_len);

        match self.messenger.send_html(self.chat_id, &body).await {
            Ok(msg) => {
                debug!(message_id = msg.message_id.0, "delivered message");
                Delivery::Delivered(msg)
            }
            Err(Error::Throttled { retry_after }) => {
                let wait = retry_after.unwrap_or(self.default_retry_after);
                warn!(
                    retry_after_secs = wait.as_secs(),
                    signaled = retry_after.is_some(),
                    "channel throttled delivery, backing off"
                );
                sleep(wait).await;
                Delivery::Throttled { retry_after: wait }
            }
            Err(e) => Delivery::Failed(e),
        }
    }
}
