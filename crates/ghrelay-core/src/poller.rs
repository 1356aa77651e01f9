//! Poll → filter → format → deliver cycles on a fixed schedule.
//!
//! - One cycle at startup, then one per `poll_interval`
//! - A cycle never overlaps another one (ticks that land mid-cycle are skipped)
//! - The cursor advances per delivered record, never in bulk
//! - Errors end the current cycle only; the schedule keeps going

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cursor::{select_new, Cursor},
    dispatcher::{Delivery, Dispatcher},
    formatting::format_event,
    source::{fetch_new_records, ActivitySource, FetchLimits},
    Error, Result,
};

#[derive(Clone, Copy, Debug)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub limits: FetchLimits,
    /// Attempts per record while the channel keeps throttling. After that the
    /// cycle stops and the record waits for the next one.
    pub max_throttle_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            limits: FetchLimits::default(),
            max_throttle_retries: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
}

/// What one cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub selected: usize,
    pub delivered: usize,
    /// Records passed over on purpose (no message / unformattable).
    pub skipped: usize,
    pub failed: usize,
    pub throttled: usize,
    /// The cycle stopped early because the channel kept throttling.
    pub halted: bool,
    pub cursor: Cursor,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The fetch failed; nothing was delivered.
    Aborted(Error),
    /// Another cycle was running.
    Skipped,
}

pub struct Poller {
    source: Arc<dyn ActivitySource>,
    dispatcher: Dispatcher,
    cfg: PollerConfig,
    // Held for the whole cycle: the lock doubles as the Running state and
    // makes the cycle the cursor's only writer.
    cursor: Mutex<Cursor>,
}

impl Poller {
    pub fn new(source: Arc<dyn ActivitySource>, dispatcher: Dispatcher, cfg: PollerConfig) -> Self {
        Self {
            source,
            dispatcher,
            cfg,
            cursor: Mutex::new(Cursor::unset()),
        }
    }

    pub fn state(&self) -> PollerState {
        match self.cursor.try_lock() {
            Ok(_) => PollerState::Idle,
            Err(_) => PollerState::Running,
        }
    }

    /// Current cursor; waits for a running cycle to finish.
    pub async fn cursor(&self) -> Cursor {
        *self.cursor.lock().await
    }

    /// Run one cycle unless one is already in progress.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(mut cursor) = self.cursor.try_lock() else {
            debug!("poll cycle already running, skipping");
            return CycleOutcome::Skipped;
        };

        match self.cycle(&mut cursor).await {
            Ok(report) => {
                info!(
                    fetched = report.fetched,
                    new = report.selected,
                    delivered = report.delivered,
                    skipped = report.skipped,
                    failed = report.failed,
                    throttled = report.throttled,
                    halted = report.halted,
                    cursor = ?report.cursor.value(),
                    "poll cycle finished"
                );
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                match &e {
                    Error::SourceRateLimited { reset_at } => warn!(
                        reset_at = ?reset_at,
                        "activity feed rate limit exceeded, waiting for the next tick"
                    ),
                    other => error!(error = %other, "poll cycle aborted"),
                }
                CycleOutcome::Aborted(e)
            }
        }
    }

    /// Run cycles until `cancel` fires: one right away, then one per interval.
    ///
    /// Cancellation is observed between cycles; a cycle in flight is awaited.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.cfg.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<CycleOutcome>> = None;

        info!(
            interval_secs = self.cfg.poll_interval.as_secs(),
            "poller started"
        );

        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = tick.tick() => {
                if let Some(handle) = in_flight.take() {
                  if !handle.is_finished() {
                    info!("previous poll cycle still running, skipping tick");
                    in_flight = Some(handle);
                    continue;
                  }
                  reap(handle).await;
                }

                let poller = self.clone();
                in_flight = Some(tokio::spawn(async move { poller.run_cycle().await }));
              }
            }
        }

        if let Some(handle) = in_flight {
            info!("waiting for the running poll cycle to finish");
            reap(handle).await;
        }
        info!("poller stopped");
    }

    async fn cycle(&self, cursor: &mut Cursor) -> Result<CycleReport> {
        let batch = fetch_new_records(self.source.as_ref(), *cursor, self.cfg.limits).await?;
        let fresh = select_new(&batch, *cursor);

        let mut report = CycleReport {
            fetched: batch.len(),
            selected: fresh.len(),
            ..CycleReport::default()
        };

        'records: for record in &fresh {
            let html = match format_event(record) {
                Ok(Some(html)) => html,
                Ok(None) => {
                    debug!(id = %record.id, kind = %record.kind, "no message for event");
                    report.skipped += 1;
                    cursor.advance(record.created_at);
                    continue;
                }
                Err(e) => {
                    warn!(id = %record.id, kind = %record.kind, error = %e, "skipping unformattable event");
                    report.skipped += 1;
                    cursor.advance(record.created_at);
                    continue;
                }
            };

            let mut attempts = 0u32;
            loop {
                attempts += 1;
                match self.dispatcher.deliver(&html).await {
                    Delivery::Delivered(_) => {
                        cursor.advance(record.created_at);
                        report.delivered += 1;
                        break;
                    }
                    Delivery::Throttled { retry_after } => {
                        report.throttled += 1;
                        if attempts >= self.cfg.max_throttle_retries {
                            warn!(
                                id = %record.id,
                                attempts,
                                retry_after_secs = retry_after.as_secs(),
                                "still throttled, leaving remaining events for the next cycle"
                            );
                            report.halted = true;
                            break 'records;
                        }
                    }
                    Delivery::Failed(e) => {
                        error!(id = %record.id, kind = %record.kind, error = %e, "failed to deliver event");
                        report.failed += 1;
                        break;
                    }
                }
            }
        }

        report.cursor = *cursor;
        Ok(report)
    }
}

async fn reap(handle: JoinHandle<CycleOutcome>) {
    if let Err(e) = handle.await {
        error!(error = %e, "poll cycle task crashed");
    }
}
