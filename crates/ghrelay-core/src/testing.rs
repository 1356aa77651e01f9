//! Fakes and fixtures shared by the unit tests.

use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use crate::{
    domain::{ActivityRecord, Actor, ChatId, MessageId, MessageRef, Repo},
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    source::ActivitySource,
    Error, Result,
};

/// 2026-01-01T00:00:00Z plus `secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn record(id: &str, secs: i64) -> ActivityRecord {
    event(id, "WatchEvent", secs, json!({ "action": "started" }))
}

pub fn event(id: &str, kind: &str, secs: i64, payload: serde_json::Value) -> ActivityRecord {
    ActivityRecord {
        id: id.to_string(),
        kind: kind.to_string(),
        created_at: ts(secs),
        actor: Actor {
            login: "octocat".to_string(),
        },
        repo: Repo {
            name: "octocat/hello-world".to_string(),
        },
        payload,
    }
}

/// Feed fake: serves pages out of a fixed newest-first record list.
#[derive(Default)]
pub struct FakeSource {
    records: Mutex<Vec<ActivityRecord>>,
    requested: Mutex<Vec<u32>>,
    fail_pages: Mutex<HashSet<u32>>,
}

impl FakeSource {
    pub fn new(records: Vec<ActivityRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// `n` records with timestamps `newest, newest - 1, ...` (GitHub order).
    pub fn with_descending(n: usize, newest: i64) -> Self {
        let records = (0..n as i64)
            .map(|i| record(&format!("ev{}", newest - i), newest - i))
            .collect();
        Self::new(records)
    }

    pub fn set_records(&self, records: Vec<ActivityRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn fail_on_page(&self, page: u32) {
        self.fail_pages.lock().unwrap().insert(page);
    }

    pub fn clear_failures(&self) {
        self.fail_pages.lock().unwrap().clear();
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<ActivityRecord>> {
        self.requested.lock().unwrap().push(page);
        if self.fail_pages.lock().unwrap().contains(&page) {
            return Err(Error::External(format!("page {page} unavailable")));
        }

        let records = self.records.lock().unwrap();
        let start = (page as usize - 1) * per_page as usize;
        Ok(records
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect())
    }
}

/// Scripted send outcome for `FakeMessenger`.
pub enum SendScript {
    Ok,
    Throttle(Option<Duration>),
    Fail(&'static str),
}

/// Messenger fake: records sends and replays scripted outcomes (default: ok).
#[derive(Default)]
pub struct FakeMessenger {
    script: Mutex<VecDeque<SendScript>>,
    attempts: Mutex<Vec<(String, tokio::time::Instant)>>,
    sent: Mutex<Vec<String>>,
    max_len: Option<usize>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = SendScript>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Messages that were accepted.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Every send attempt with the (tokio) time it happened.
    pub fn attempts(&self) -> Vec<(String, tokio::time::Instant)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: self.max_len.unwrap_or(4096),
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.attempts
            .lock()
            .unwrap()
            .push((html.to_string(), tokio::time::Instant::now()));

        let next = self.script.lock().unwrap().pop_front();
        match next.unwrap_or(SendScript::Ok) {
            SendScript::Ok => {
                let mut sent = self.sent.lock().unwrap();
                sent.push(html.to_string());
                Ok(MessageRef {
                    chat_id,
                    message_id: MessageId(sent.len() as i32),
                })
            }
            SendScript::Throttle(retry_after) => Err(Error::Throttled { retry_after }),
            SendScript::Fail(msg) => Err(Error::External(msg.to_string())),
        }
    }
}
