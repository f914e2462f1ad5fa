use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    graph::GraphApi,
    tracker::SplitRecord,
    utils::{
        clock::Clock,
        time::{date_of, start_of_day},
    },
};

use super::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Fetch,
    Post,
}

/// What happened to the most recent remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub operation: SyncOperation,
    pub date: NaiveDate,
    pub value_seconds: f64,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Progress of remote calls as seen by a progress indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub pending: usize,
    pub last: Option<SyncOutcome>,
}

impl SyncStatus {
    pub fn in_progress(&self) -> bool {
        self.pending > 0
    }
}

/// Base and stop time reconstructed from the total stored remotely for today.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub base_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub stored_seconds: f64,
}

/// Keeps one graph in sync with the tracker. Records are posted by a single worker in the order
/// they were handed over, so an older total can never overwrite a newer one.
pub struct SyncCoordinator {
    graph_name: String,
    username: String,
    api: Arc<dyn GraphApi>,
    clock: Arc<dyn Clock>,
    sender: Mutex<Option<mpsc::UnboundedSender<SplitRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    status: Arc<watch::Sender<SyncStatus>>,
}

impl SyncCoordinator {
    /// Spawns the posting worker, so this has to be called inside a tokio runtime.
    pub fn new(
        api: Arc<dyn GraphApi>,
        clock: Arc<dyn Clock>,
        graph_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let graph_name = graph_name.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SyncStatus::default());
        let status = Arc::new(status);

        let worker = PostingWorker {
            receiver,
            api: api.clone(),
            graph_name: graph_name.clone(),
            status: status.clone(),
        };

        Self {
            graph_name,
            username: username.into(),
            api,
            clock,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(tokio::spawn(worker.run()))),
            status,
        }
    }

    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Reads today's total from the graph and turns it into a base time, so that a restart
    /// continues the day instead of starting it over. An unreachable service counts as nothing
    /// recorded yet.
    pub async fn initialize<Tz: TimeZone>(&self, time_zone: &Tz) -> Seed {
        let now = self.clock.time();
        let today = date_of(now, time_zone);

        self.status.send_modify(|s| s.pending += 1);
        let result = self
            .api
            .fetch_value(&self.graph_name, &self.username, today)
            .await;

        let (stored_seconds, error) = match result {
            Ok(v) => (v.max(0.0), None),
            Err(e) => {
                warn!("Couldn't read today's total for {}: {e}", self.graph_name);
                (0.0, Some(e.to_string()))
            }
        };
        self.status.send_modify(|s| {
            s.pending -= 1;
            s.last = Some(SyncOutcome {
                operation: SyncOperation::Fetch,
                date: today,
                value_seconds: stored_seconds,
                error,
            });
        });

        let base_time = base_before(now, stored_seconds, time_zone).unwrap_or_else(|| {
            warn!("Stored total {stored_seconds} for {today} is out of range, starting from zero");
            now
        });
        let stored_seconds = (now - base_time).num_milliseconds() as f64 / 1000.0;
        info!(%base_time, stored_seconds, "Initialised");

        Seed {
            base_time,
            stop_time: now,
            stored_seconds,
        }
    }

    /// Queues `split` for posting and returns immediately.
    pub fn record_async(&self, split: SplitRecord) {
        let sender = lock(&self.sender).clone();
        let Some(sender) = sender else {
            error!("Sync for {} is shut down, dropping {split:?}", self.graph_name);
            return;
        };

        self.status.send_modify(|s| s.pending += 1);
        if let Err(e) = sender.send(split) {
            error!("Posting worker is gone, dropping {:?}", e.0);
            self.status.send_modify(|s| s.pending -= 1);
        }
    }

    /// Stops accepting records and waits until every queued one was attempted.
    pub async fn shutdown(&self) {
        drop(lock(&self.sender).take());
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Posting worker failed {e:?}");
            }
        }
    }
}

/// `now` moved back by `seconds`, but not past the start of today. `None` when the offset can't be
/// represented.
fn base_before<Tz: TimeZone>(
    now: DateTime<Utc>,
    seconds: f64,
    time_zone: &Tz,
) -> Option<DateTime<Utc>> {
    let offset = Duration::try_milliseconds((seconds * 1000.0).round() as i64)?;
    let base = now.checked_sub_signed(offset)?;
    Some(base.max(start_of_day(now, time_zone)))
}

/// Receives records and posts them one at a time.
struct PostingWorker {
    receiver: mpsc::UnboundedReceiver<SplitRecord>,
    api: Arc<dyn GraphApi>,
    graph_name: String,
    status: Arc<watch::Sender<SyncStatus>>,
}

impl PostingWorker {
    async fn run(mut self) {
        while let Some(split) = self.receiver.recv().await {
            let value_seconds = split.value_seconds();
            debug!("Posting {:?}", split);

            let error = match self
                .api
                .post_value(&self.graph_name, split.date, value_seconds)
                .await
            {
                Ok(_) => {
                    info!("Recorded {value_seconds:.2}s for {}", split.date);
                    None
                }
                Err(e) => {
                    error!("Error recording {:?}: {e}", split);
                    Some(e.to_string())
                }
            };

            self.status.send_modify(|s| {
                s.pending -= 1;
                s.last = Some(SyncOutcome {
                    operation: SyncOperation::Post,
                    date: split.date,
                    value_seconds,
                    error,
                });
            });
        }
        self.receiver.close();
    }
}
