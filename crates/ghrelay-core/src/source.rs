//! Activity feed port and the paginated incremental fetch built on it.

use async_trait::async_trait;
use tracing::debug;

use crate::{cursor::Cursor, domain::ActivityRecord, Result};

/// One page of the external activity feed per call.
///
/// Pages are 1-based. The feed makes no ordering promise within or across pages.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<ActivityRecord>>;
}

/// Bounds for one incremental fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchLimits {
    pub per_page: u32,
    pub max_records: usize,
    pub max_pages: u32,
}

impl FetchLimits {
    pub fn new(per_page: u32, max_records: usize) -> Self {
        let per_page = per_page.max(1);
        let max_records = max_records.max(1);
        let max_pages = max_records.div_ceil(per_page as usize).max(1) as u32;
        Self {
            per_page,
            max_records,
            max_pages,
        }
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::new(100, 300)
    }
}

/// Walk the feed from page 1 until it runs out, the cap is hit, or a page
/// ends at or behind `cursor`.
///
/// Any page error aborts the whole fetch: a partial batch is never returned.
pub async fn fetch_new_records(
    source: &dyn ActivitySource,
    cursor: Cursor,
    limits: FetchLimits,
) -> Result<Vec<ActivityRecord>> {
    let mut records = Vec::new();

    for page in 1..=limits.max_pages {
        let batch = source.fetch_page(page, limits.per_page).await?;
        let fetched = batch.len();
        debug!(page, fetched, "fetched activity page");

        if batch.is_empty() {
            break;
        }

        let caught_up = batch
            .last()
            .map(|r| !cursor.is_newer(r.created_at))
            .unwrap_or(false);

        records.extend(batch);

        if records.len() >= limits.max_records {
            records.truncate(limits.max_records);
            break;
        }
        if caught_up || fetched < limits.per_page as usize {
            break;
        }
    }

    Ok(records)
}
