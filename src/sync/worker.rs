//! Repair Worker Pool
//!
//! Supervised background execution of repair tasks. Tasks go through a
//! bounded queue to a fixed set of workers. Each task runs under its own
//! timeout, independent of the request that scheduled it. Failures are
//! logged, counted and published to subscribers; a failed task is never
//! retried here, the next reconciliation of that user schedules it again.
//! At most one task per user is queued or running; later ones are coalesced
//! into it.

use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::repair::{RepairHandler, RepairScheduler, RepairTask};
use crate::config::RepairConfig;

/// A repair that did not complete
#[derive(Debug, Clone)]
pub struct RepairFailure {
    pub upk: String,
    pub kind: &'static str,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct RepairStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    coalesced: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    /// Skipped because the same user already had a task in flight
    pub coalesced: u64,
}

impl RepairStats {
    pub fn snapshot(&self) -> RepairStatsSnapshot {
        RepairStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<RepairTask>>>;
/// Users with a task queued or running
type InFlight = Arc<DashSet<String>>;

pub struct RepairPool {
    tx: Mutex<Option<mpsc::Sender<RepairTask>>>,
    failures: broadcast::Sender<RepairFailure>,
    stats: Arc<RepairStats>,
    in_flight: InFlight,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RepairPool {
    /// Spawn the workers. Must be called inside a Tokio runtime.
    pub fn start(handler: Arc<dyn RepairHandler>, config: &RepairConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let (failures, _) = broadcast::channel(64);
        let stats = Arc::new(RepairStats::default());
        let rx: SharedReceiver = Arc::new(AsyncMutex::new(rx));
        let in_flight: InFlight = Arc::new(DashSet::new());

        let workers = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    rx.clone(),
                    handler.clone(),
                    config.task_timeout(),
                    stats.clone(),
                    in_flight.clone(),
                    failures.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            queue_size = config.queue_size,
            task_timeout_secs = config.task_timeout().as_secs(),
            "Repair pool started"
        );

        Self {
            tx: Mutex::new(Some(tx)),
            failures,
            stats,
            in_flight,
            workers: Mutex::new(workers),
        }
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<RepairFailure> {
        self.failures.subscribe()
    }

    pub fn stats(&self) -> RepairStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting tasks, let workers drain the queue, then join them
    pub async fn shutdown(&self) {
        let sender = match self.tx.lock() {
            Ok(mut tx) => tx.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let workers = match self.workers.lock() {
            Ok(mut w) => std::mem::take(&mut *w),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Repair worker panicked");
            }
        }
        info!(stats = ?self.stats(), "Repair pool stopped");
    }

    fn drop_task(&self, task: &RepairTask, reason: &str) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(upk = %task.upk(), kind = task.kind(), reason, "Repair task dropped");
    }
}

impl RepairScheduler for RepairPool {
    fn schedule(&self, task: RepairTask) {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = guard.as_ref() else {
            self.drop_task(&task, "pool shut down");
            return;
        };

        let upk = task.upk().to_string();
        if !self.in_flight.insert(upk.clone()) {
            self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(upk = %upk, kind = task.kind(), "Repair already in flight, coalesced");
            return;
        }

        match tx.try_send(task) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(task)) => {
                self.in_flight.remove(&upk);
                self.drop_task(&task, "queue full");
            }
            Err(TrySendError::Closed(task)) => {
                self.in_flight.remove(&upk);
                self.drop_task(&task, "queue closed");
            }
        }
    }
}

async fn run_worker(
    id: usize,
    rx: SharedReceiver,
    handler: Arc<dyn RepairHandler>,
    timeout: Duration,
    stats: Arc<RepairStats>,
    in_flight: InFlight,
    failures: broadcast::Sender<RepairFailure>,
) {
    debug!(worker = id, "Repair worker started");
    loop {
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else {
            break;
        };

        let upk = task.upk().to_string();
        let kind = task.kind();
        let outcome = tokio::time::timeout(timeout, handler.handle(task)).await;
        in_flight.remove(&upk);
        let error = match outcome {
            Ok(Ok(())) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(worker = id, upk = %upk, kind, "Repair completed");
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", timeout.as_millis()),
        };

        stats.failed.fetch_add(1, Ordering::Relaxed);
        error!(worker = id, upk = %upk, kind, error = %error, "Repair failed");
        // No subscribers is fine
        let _ = failures.send(RepairFailure { upk, kind, error });
    }
    debug!(worker = id, "Repair worker stopped");
}
