use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::TimeZone;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{tracker::TimeTracker, utils::clock::Clock};

use super::{lock, SyncCoordinator};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(100);

/// Runs one tracker tick, hands any day splits to the coordinator and publishes the elapsed
/// time. The tracker lock is released before anything is dispatched.
pub(crate) fn tick_and_dispatch<Tz: TimeZone>(
    tracker: &Mutex<TimeTracker<Tz>>,
    coordinator: &SyncCoordinator,
    elapsed: &watch::Sender<chrono::Duration>,
) -> chrono::Duration {
    let tick = lock(tracker).tick();
    for split in tick.splits {
        coordinator.record_async(split);
    }
    elapsed.send_replace(tick.elapsed);
    tick.elapsed
}

/// Periodic driver that ticks the tracker while it is running. Exactly one exists per run, it
/// is cancelled by the stop that ends the run.
pub struct TickDriver<Tz: TimeZone> {
    pub(crate) tracker: Arc<Mutex<TimeTracker<Tz>>>,
    pub(crate) coordinator: Arc<SyncCoordinator>,
    pub(crate) elapsed: Arc<watch::Sender<chrono::Duration>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) period: Duration,
    pub(crate) shutdown: CancellationToken,
}

impl<Tz: TimeZone> TickDriver<Tz> {
    /// Executes the tick loop until cancelled.
    pub async fn run(self) {
        debug!("Tick driver started");
        let mut tick_point = self.clock.instant();
        loop {
            tick_point += self.period;
            // After a suspend don't replay every missed tick, one catches up on all days.
            let now = self.clock.instant();
            if tick_point < now {
                tick_point = now;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Tick driver stopped");
                    return
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }

            let elapsed = tick_and_dispatch(&self.tracker, &self.coordinator, &self.elapsed);
            trace!("Elapsed {}s", elapsed.num_seconds());
        }
    }
}
