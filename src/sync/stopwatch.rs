use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    config::{ConfigError, TrackerConfig},
    graph::{GraphApi, HttpGraphClient},
    tracker::{RunState, SplitRecord, TimeTracker, TrackerError},
    utils::clock::{Clock, DefaultClock},
};

use super::{
    lock,
    ticker::{tick_and_dispatch, TickDriver, DEFAULT_TICK_PERIOD},
    SyncCoordinator, SyncStatus,
};

/// Entry point for a user interface. Owns the tracker, drives it while running and forwards
/// everything it emits to the graph. All state transitions go through `&mut self`, so the
/// owner is the single foreground control flow.
pub struct Stopwatch<Tz: TimeZone> {
    tracker: Arc<Mutex<TimeTracker<Tz>>>,
    coordinator: Arc<SyncCoordinator>,
    clock: Arc<dyn Clock>,
    time_zone: Tz,
    elapsed: Arc<watch::Sender<Duration>>,
    tick_period: std::time::Duration,
    driver: Option<(CancellationToken, JoinHandle<()>)>,
}

impl<Tz> Stopwatch<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Builds a stopwatch talking to the configured graph over HTTP.
    pub fn new(config: &TrackerConfig, time_zone: Tz) -> Result<Self, ConfigError> {
        let client = HttpGraphClient::new(config)?;
        Ok(Self::with_parts(
            Arc::new(client),
            Arc::new(DefaultClock),
            time_zone,
            &config.graph_name,
            &config.username,
        ))
    }

    pub fn with_parts(
        api: Arc<dyn GraphApi>,
        clock: Arc<dyn Clock>,
        time_zone: Tz,
        graph_name: &str,
        username: &str,
    ) -> Self {
        let tracker = TimeTracker::new(clock.clone(), time_zone.clone());
        let coordinator = SyncCoordinator::new(api, clock.clone(), graph_name, username);
        let (elapsed, _) = watch::channel(Duration::zero());

        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            coordinator: Arc::new(coordinator),
            clock,
            time_zone,
            elapsed: Arc::new(elapsed),
            tick_period: DEFAULT_TICK_PERIOD,
            driver: None,
        }
    }

    /// Replaces how often the driver ticks while running.
    pub fn with_tick_period(mut self, tick_period: std::time::Duration) -> Self {
        self.tick_period = tick_period;
        self
    }

    /// Seeds the tracker with the total already recorded today and returns it.
    pub async fn initialize(&mut self) -> Result<Duration, TrackerError> {
        let seed = self.coordinator.initialize(&self.time_zone).await;
        lock(&self.tracker).seed(seed.base_time, seed.stop_time)?;
        Ok(self.tick())
    }

    pub fn start(&mut self) -> Result<(), TrackerError> {
        lock(&self.tracker).start()?;
        self.spawn_driver();
        Ok(())
    }

    /// Stops the run, waits for the tick driver to finish and queues the emitted records.
    pub async fn stop(&mut self) -> Result<Vec<SplitRecord>, TrackerError> {
        let splits = lock(&self.tracker).stop()?;
        self.stop_driver().await;

        for split in &splits {
            self.coordinator.record_async(*split);
        }
        let elapsed = lock(&self.tracker).elapsed();
        self.elapsed.send_replace(elapsed);
        Ok(splits)
    }

    /// Starts when idle, stops when running. Returns the state after the switch.
    pub async fn toggle(&mut self) -> Result<RunState, TrackerError> {
        match self.run_state() {
            RunState::Idle => self.start()?,
            RunState::Running => {
                self.stop().await?;
            }
        }
        Ok(self.run_state())
    }

    /// Ticks immediately instead of waiting for the driver.
    pub fn tick(&self) -> Duration {
        tick_and_dispatch(&self.tracker, &self.coordinator, &self.elapsed)
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.tracker).run_state()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.tracker).is_running()
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.tracker).elapsed()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<Duration> {
        self.elapsed.subscribe()
    }

    pub fn subscribe_sync(&self) -> watch::Receiver<SyncStatus> {
        self.coordinator.subscribe()
    }

    pub fn graph_name(&self) -> &str {
        self.coordinator.graph_name()
    }

    /// Stops a running timer and waits until every record was attempted.
    pub async fn shutdown(mut self) -> Vec<SplitRecord> {
        let splits = if self.run_state() == RunState::Running {
            self.stop().await.unwrap_or_default()
        } else {
            vec![]
        };
        self.coordinator.shutdown().await;
        splits
    }

    fn spawn_driver(&mut self) {
        if let Some((token, _)) = self.driver.take() {
            error!("Tick driver was still present when starting");
            token.cancel();
        }

        let shutdown = CancellationToken::new();
        let driver = TickDriver {
            tracker: self.tracker.clone(),
            coordinator: self.coordinator.clone(),
            elapsed: self.elapsed.clone(),
            clock: self.clock.clone(),
            period: self.tick_period,
            shutdown: shutdown.clone(),
        };
        self.driver = Some((shutdown, tokio::spawn(driver.run())));
    }

    async fn stop_driver(&mut self) {
        if let Some((token, handle)) = self.driver.take() {
            token.cancel();
            if let Err(e) = handle.await {
                error!("Tick driver failed {e:?}");
            }
        }
    }
}

impl<Tz: TimeZone> Drop for Stopwatch<Tz> {
    fn drop(&mut self) {
        if let Some((token, _)) = &self.driver {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod stopwatch_tests {
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use mockall::Sequence;

    use crate::{
        graph::{MockGraphApi, SyncError},
        tracker::{RunState, SplitRecord, TrackerError},
        utils::{clock::test_clock::ManualClock, logging::TEST_LOGGING},
    };

    use super::Stopwatch;

    const DAY_1: NaiveDate = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    const DAY_2: NaiveDate = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        NaiveDateTime::new(date, NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn stopwatch(api: MockGraphApi, clock: &ManualClock) -> Stopwatch<Utc> {
        *TEST_LOGGING;
        Stopwatch::with_parts(Arc::new(api), Arc::new(clock.clone()), Utc, "work", "alice")
    }

    /// Collects posts so tests can check what reached the graph and in which order.
    fn record_posts(api: &mut MockGraphApi) -> Arc<Mutex<Vec<(NaiveDate, f64)>>> {
        let posted = Arc::new(Mutex::new(vec![]));
        let sink = posted.clone();
        api.expect_post_value().returning(move |graph, date, value| {
            assert_eq!(graph, "work");
            sink.lock().unwrap().push((date, value));
            Ok(())
        });
        posted
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_continues_today() {
        let clock = ManualClock::at(at(DAY_1, 10, 0));
        let mut api = MockGraphApi::new();
        api.expect_fetch_value()
            .withf(|graph, user, date| graph == "work" && user == "alice" && *date == DAY_1)
            .times(1)
            .returning(|_, _, _| Ok(3600.0));
        let posted = record_posts(&mut api);
        let mut stopwatch = stopwatch(api, &clock);

        assert_eq!(stopwatch.initialize().await.unwrap(), Duration::hours(1));
        assert_eq!(*stopwatch.subscribe_elapsed().borrow(), Duration::hours(1));

        stopwatch.start().unwrap();
        clock.set_naive(at(DAY_1, 10, 30));
        let splits = stopwatch.stop().await.unwrap();
        assert_eq!(splits, vec![SplitRecord {
            date: DAY_1,
            duration_millis: 90 * 60 * 1000,
        }]);

        assert!(stopwatch.shutdown().await.is_empty());
        // The post carries the whole day total, never the 30 minute delta.
        assert_eq!(*posted.lock().unwrap(), vec![(DAY_1, 5400.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_splits_at_midnight() {
        let clock = ManualClock::at(at(DAY_1, 23, 55));
        let mut api = MockGraphApi::new();
        api.expect_fetch_value().returning(|_, _, _| Ok(0.0));
        let posted = record_posts(&mut api);
        let mut stopwatch = stopwatch(api, &clock);

        stopwatch.initialize().await.unwrap();
        stopwatch.start().unwrap();
        let elapsed = stopwatch.subscribe_elapsed();

        clock.set_naive(at(DAY_2, 0, 5));
        tokio::time::sleep(std::time::Duration::from_millis(350)).await;
        assert_eq!(*elapsed.borrow(), Duration::minutes(5));

        clock.set_naive(at(DAY_2, 0, 10));
        assert_eq!(stopwatch.stop().await.unwrap(), vec![SplitRecord {
            date: DAY_2,
            duration_millis: 600_000,
        }]);

        stopwatch.shutdown().await;
        assert_eq!(*posted.lock().unwrap(), vec![(DAY_1, 300.0), (DAY_2, 600.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_driver() {
        let clock = ManualClock::at(at(DAY_1, 9, 0));
        let mut api = MockGraphApi::new();
        api.expect_fetch_value().returning(|_, _, _| Ok(0.0));
        record_posts(&mut api);
        let mut stopwatch = stopwatch(api, &clock);
        stopwatch.initialize().await.unwrap();

        assert_eq!(stopwatch.toggle().await.unwrap(), RunState::Running);
        assert!(stopwatch.is_running());
        clock.set_naive(at(DAY_1, 9, 1));
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(stopwatch.toggle().await.unwrap(), RunState::Idle);

        let mut elapsed = stopwatch.subscribe_elapsed();
        elapsed.mark_unchanged();
        clock.set_naive(at(DAY_1, 9, 5));
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert!(!elapsed.has_changed().unwrap());
        assert_eq!(stopwatch.elapsed(), Duration::minutes(1));

        stopwatch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_follows_tick_period() {
        let clock = ManualClock::at(at(DAY_1, 9, 0));
        let mut api = MockGraphApi::new();
        api.expect_fetch_value().returning(|_, _, _| Ok(0.0));
        record_posts(&mut api);
        let mut stopwatch =
            stopwatch(api, &clock).with_tick_period(std::time::Duration::from_secs(10));
        stopwatch.initialize().await.unwrap();

        let mut elapsed = stopwatch.subscribe_elapsed();
        elapsed.mark_unchanged();
        stopwatch.start().unwrap();
        clock.set_naive(at(DAY_1, 9, 1));

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert!(!elapsed.has_changed().unwrap());

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;
        assert!(elapsed.has_changed().unwrap());
        assert_eq!(*elapsed.borrow_and_update(), Duration::minutes(1));

        stopwatch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_transitions_are_reported() {
        let clock = ManualClock::at(at(DAY_1, 9, 0));
        let mut api = MockGraphApi::new();
        api.expect_fetch_value().returning(|_, _, _| Ok(0.0));
        record_posts(&mut api);
        let mut stopwatch = stopwatch(api, &clock);
        stopwatch.initialize().await.unwrap();

        assert!(matches!(
            stopwatch.stop().await,
            Err(TrackerError::InvalidStateTransition {
                state: RunState::Idle,
                ..
            })
        ));
        stopwatch.start().unwrap();
        assert!(matches!(
            stopwatch.start(),
            Err(TrackerError::InvalidStateTransition {
                state: RunState::Running,
                ..
            })
        ));
        assert!(stopwatch.initialize().await.is_err());

        clock.set_naive(at(DAY_1, 9, 30));
        let splits = stopwatch.shutdown().await;
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].duration_millis, 30 * 60 * 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_failures_do_not_block_timing() {
        let clock = ManualClock::at(at(DAY_1, 9, 0));
        let mut api = MockGraphApi::new();
        let mut sequence = Sequence::new();
        api.expect_fetch_value()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _| {
                Err(SyncError::Status {
                    status: 503,
                    body: String::new(),
                })
            });
        api.expect_post_value()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _| {
                Err(SyncError::Status {
                    status: 503,
                    body: String::new(),
                })
            });
        let mut stopwatch = stopwatch(api, &clock);
        let sync = stopwatch.subscribe_sync();

        assert_eq!(stopwatch.initialize().await.unwrap(), Duration::zero());
        stopwatch.start().unwrap();
        clock.set_naive(at(DAY_1, 9, 20));
        stopwatch.stop().await.unwrap();
        assert_eq!(stopwatch.elapsed(), Duration::minutes(20));
        assert_eq!(stopwatch.run_state(), RunState::Idle);

        stopwatch.shutdown().await;
        let status = sync.borrow().clone();
        assert!(!status.in_progress());
        assert!(!status.last.unwrap().succeeded());
    }
}
