//! High-watermark cursor and batch selection.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::domain::ActivityRecord;

/// `created_at` of the most recently delivered record.
///
/// Starts unset (no lower bound), lives in memory only and never moves
/// backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor(Option<DateTime<Utc>>);

impl Cursor {
    pub fn unset() -> Self {
        Self(None)
    }

    pub fn at(ts: DateTime<Utc>) -> Self {
        Self(Some(ts))
    }

    pub fn value(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    pub fn is_newer(&self, ts: DateTime<Utc>) -> bool {
        match self.0 {
            None => true,
            Some(cur) => ts > cur,
        }
    }

    /// The only mutation point. Returns whether the cursor moved.
    pub fn advance(&mut self, ts: DateTime<Utc>) -> bool {
        if self.is_newer(ts) {
            self.0 = Some(ts);
            true
        } else {
            false
        }
    }
}

/// Records strictly newer than `cursor`, oldest first.
///
/// The sort is stable, so records sharing a timestamp keep batch order.
/// Repeated ids within the batch are dropped (first occurrence wins).
pub fn select_new(batch: &[ActivityRecord], cursor: Cursor) -> Vec<ActivityRecord> {
    let mut seen = HashSet::new();
    let mut out: Vec<ActivityRecord> = batch
        .iter()
        .filter(|r| cursor.is_newer(r.created_at))
        .filter(|r| seen.insert(r.id.as_str()))
        .cloned()
        .collect();
    out.sort_by_key(|r| r.created_at);
    out
}
