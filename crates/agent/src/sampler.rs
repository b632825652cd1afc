//! Periodic acquisition as a lazy stream.
//!
//! [`Sampler::poll`] yields one item per tick: the collaborator's snapshot,
//! or the error it failed with. Ticking continues after errors. A fetch is
//! always awaited before the next tick is considered, and missed ticks are
//! skipped rather than queued, so at most one fetch is ever in flight.
//!
//! The cadence comes from a `watch` channel. A new value cancels the current
//! timer and restarts it with an immediate tick; nothing downstream of the
//! stream is reset.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use gpuwatch_core::hardware::snapshot::Snapshot;

use crate::source::{AcquisitionError, SnapshotSource};

/// Floor applied to the period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// One sampling cycle's outcome.
pub type Cycle = Result<Snapshot, AcquisitionError>;

pub struct Sampler {
    source: Arc<dyn SnapshotSource>,
    interval_rx: watch::Receiver<Duration>,
    cancel: CancellationToken,
}

impl Sampler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        interval_rx: watch::Receiver<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            interval_rx,
            cancel,
        }
    }

    /// Start ticking. The stream ends when the token is cancelled or the
    /// interval sender is dropped.
    pub fn poll(self) -> impl Stream<Item = Cycle> + Send {
        let mut interval_rx = self.interval_rx;
        let period = *interval_rx.borrow_and_update();

        let ticking = Ticking {
            source: self.source,
            ticker: ticker(period),
            period,
            interval_rx,
            cancel: self.cancel,
        };

        stream::unfold(ticking, |mut ticking| async move {
            let cycle = ticking.next_cycle().await?;
            Some((cycle, ticking))
        })
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// The first scheduled deadline strictly after `now`.
fn next_deadline_after(scheduled: Instant, period: Duration, now: Instant) -> Instant {
    let period = period.max(MIN_PERIOD);
    let behind = now.saturating_duration_since(scheduled).as_nanos();
    let steps = behind / period.as_nanos() + 1;
    scheduled + Duration::from_nanos((steps * period.as_nanos()) as u64)
}

/// What woke the sampler while it waited for a tick.
enum Wake {
    Cancelled,
    Reconfigured(Option<Duration>),
    Tick(Instant),
}

struct Ticking {
    source: Arc<dyn SnapshotSource>,
    ticker: Interval,
    period: Duration,
    interval_rx: watch::Receiver<Duration>,
    cancel: CancellationToken,
}

impl Ticking {
    /// Wait for the next tick and run one fetch. `None` ends the stream.
    async fn next_cycle(&mut self) -> Option<Cycle> {
        let scheduled = loop {
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                changed = self.interval_rx.changed() => {
                    Wake::Reconfigured(changed.ok().map(|_| *self.interval_rx.borrow_and_update()))
                }
                scheduled = self.ticker.tick() => Wake::Tick(scheduled),
            };

            match wake {
                Wake::Cancelled => return None,
                Wake::Reconfigured(None) => {
                    tracing::debug!("Interval sender dropped, sampler stopping");
                    return None;
                }
                Wake::Reconfigured(Some(period)) => {
                    tracing::info!(
                        old_ms = self.period.as_millis() as u64,
                        new_ms = period.as_millis() as u64,
                        "Polling interval changed, restarting timer",
                    );
                    self.period = period;
                    self.ticker = ticker(period);
                }
                Wake::Tick(scheduled) => break scheduled,
            }
        };

        let started = Instant::now();
        let cycle = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            cycle = self.source.fetch() => cycle,
        };

        // Ticks that came due during the fetch are dropped, not fired late.
        let now = Instant::now();
        let period = self.ticker.period();
        if now > scheduled + period {
            self.ticker
                .reset_at(next_deadline_after(scheduled, period, now));
            tracing::debug!(
                took_ms = started.elapsed().as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "Fetch overran the polling interval; missed ticks skipped",
            );
        }

        Some(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_deadline_follows_the_schedule() {
        let origin = Instant::now();
        let period = Duration::from_millis(100);
        let at = |ms| origin + Duration::from_millis(ms);

        assert_eq!(next_deadline_after(origin, period, at(350)), at(400));
        assert_eq!(next_deadline_after(origin, period, at(100)), at(200));
        assert_eq!(next_deadline_after(origin, period, at(30)), at(100));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_floored_instead_of_panicking() {
        let mut t = ticker(Duration::ZERO);
        t.tick().await;
        assert_eq!(t.period(), MIN_PERIOD);
    }
}
