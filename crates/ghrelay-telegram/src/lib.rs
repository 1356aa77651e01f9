//! Telegram adapter (teloxide).
//!
//! This crate implements the `ghrelay-core` MessagingPort over Telegram Bot API.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, RequestError};

use ghrelay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{is_too_many_requests, parse_retry_after, MessagingCapabilities},
    },
    Result,
};

/// Telegram's hard limit for one text message.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }

    /// Log the bot identity; a bad token fails here rather than on first send.
    pub async fn verify(&self) -> Result<String> {
        let me = self.bot.get_me().await.map_err(map_err)?;
        Ok(me.username().to_string())
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }
}

/// Throttling becomes `Error::Throttled`; everything else is `External`.
///
/// `RetryAfter` renders as "Retry after <n>..." so the delay is read back from
/// the text, which also covers API errors that only carry the phrase.
fn map_err(e: RequestError) -> Error {
    let text = e.to_string();
    match e {
        RequestError::RetryAfter(_) => Error::Throttled {
            retry_after: parse_retry_after(&text),
        },
        _ if is_too_many_requests(&text) => Error::Throttled {
            retry_after: parse_retry_after(&text),
        },
        _ => Error::External(format!("telegram error: {text}")),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: TELEGRAM_MESSAGE_LIMIT,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .bot
            .send_message(Self::tg_chat(chat_id), html.to_string())
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .await
            .map_err(map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}
