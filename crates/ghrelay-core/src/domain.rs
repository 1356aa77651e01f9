use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// One entry of the activity feed (a GitHub event).
///
/// Immutable once fetched. `payload` is kept as raw JSON because its shape
/// depends on `kind`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub actor: Actor,
    pub repo: Repo,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Actor {
    pub login: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Repo {
    pub name: String,
}
