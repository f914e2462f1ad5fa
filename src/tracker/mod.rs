//! The stopwatch state machine. It only knows about time; anything it wants recorded remotely
//! leaves it as a [SplitRecord].

pub mod split;

use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info};

pub use split::SplitRecord;

use crate::utils::{
    clock::Clock,
    time::{date_of, next_day_start, start_of_day},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

impl Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("cannot {operation} while {state}")]
    InvalidStateTransition {
        state: RunState,
        operation: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerState {
    pub running: bool,
    /// Elapsed time is measured from here, as if the current run started at this instant.
    pub base_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
}

/// Result of a periodic tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub elapsed: Duration,
    pub splits: Vec<SplitRecord>,
}

pub struct TimeTracker<Tz: TimeZone> {
    state: TrackerState,
    time_zone: Tz,
    clock: Arc<dyn Clock>,
}

impl<Tz: TimeZone> TimeTracker<Tz> {
    /// Creates an idle tracker with nothing recorded. Real base time comes from
    /// [TimeTracker::seed] once the remote total for today is known.
    pub fn new(clock: Arc<dyn Clock>, time_zone: Tz) -> Self {
        let now = clock.time();
        Self {
            state: TrackerState {
                running: false,
                base_time: now,
                stop_time: now,
            },
            time_zone,
            clock,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn run_state(&self) -> RunState {
        if self.state.running {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Replaces base and stop time while idle. Used for reconciling with the remote total.
    pub fn seed(
        &mut self,
        base_time: DateTime<Utc>,
        stop_time: DateTime<Utc>,
    ) -> Result<(), TrackerError> {
        self.ensure(RunState::Idle, "seed")?;
        self.state.base_time = base_time;
        self.state.stop_time = stop_time;
        self.log_state("Seeded");
        Ok(())
    }

    /// Starts a run. A base time from an earlier day means today starts from zero, otherwise the
    /// base is shifted forward by the pause so the pause isn't counted.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        self.ensure(RunState::Idle, "start")?;
        let now = self.clock.time();

        if self.state.base_time < start_of_day(now, &self.time_zone) {
            self.state.base_time = now;
        } else {
            self.state.base_time += now - self.state.stop_time;
        }
        self.state.running = true;
        self.log_state("Start");
        Ok(())
    }

    /// Stops the run and returns the records to post. The last record is the total for the
    /// current day; earlier ones only appear when midnight passed since the last tick.
    pub fn stop(&mut self) -> Result<Vec<SplitRecord>, TrackerError> {
        self.ensure(RunState::Running, "stop")?;
        let now = self.clock.time();

        let mut splits = self.split_crossed_days(now);
        self.state.stop_time = now;
        splits.push(SplitRecord::new(
            date_of(self.state.base_time, &self.time_zone),
            now - self.state.base_time,
        ));
        self.state.running = false;
        self.log_state("Stop");
        Ok(splits)
    }

    /// Advances the day accounting and reports elapsed time for display. While running, every
    /// midnight passed since `base_time` produces one record and moves `base_time` to it.
    pub fn tick(&mut self) -> Tick {
        let splits = if self.state.running {
            self.split_crossed_days(self.clock.time())
        } else {
            vec![]
        };

        Tick {
            elapsed: self.elapsed(),
            splits,
        }
    }

    /// Elapsed time for today. Live while running, frozen at the last stop while idle.
    pub fn elapsed(&self) -> Duration {
        let end = if self.state.running {
            self.clock.time()
        } else {
            self.state.stop_time
        };
        (end - self.state.base_time).max(Duration::zero())
    }

    fn split_crossed_days(&mut self, now: DateTime<Utc>) -> Vec<SplitRecord> {
        let border = start_of_day(now, &self.time_zone);
        let mut splits = vec![];

        while self.state.base_time < border {
            let base = self.state.base_time;
            let next = next_day_start(base, &self.time_zone).min(border);
            if next <= base {
                // Time zone data that never moves forward, give the rest to the current day.
                self.state.base_time = border;
                break;
            }
            debug!("Crossed day boundary at {next}");
            splits.push(SplitRecord::new(date_of(base, &self.time_zone), next - base));
            self.state.base_time = next;
        }
        splits
    }

    fn ensure(&self, expected: RunState, operation: &'static str) -> Result<(), TrackerError> {
        let state = self.run_state();
        if state == expected {
            Ok(())
        } else {
            Err(TrackerError::InvalidStateTransition { state, operation })
        }
    }

    fn log_state(&self, message: &str) {
        info!(
            base_time = %self.state.base_time.with_timezone(&self.time_zone).naive_local(),
            stop_time = %self.state.stop_time.with_timezone(&self.time_zone).naive_local(),
            "{message}"
        );
    }
}
