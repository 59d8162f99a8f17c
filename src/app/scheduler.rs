//! Periodic Mercury sync in a background tokio task.

use crate::app::sync::{SyncResult, SyncService};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use utoipa::ToSchema;

pub const SYNC_JOB_ID: &str = "mercury_sync";
pub const SYNC_JOB_NAME: &str = "Mercury Transaction Sync";

/// Delay before the first scheduled run.
const INITIAL_DELAY: Duration = Duration::from_secs(5);

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub next_run: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: u64,
    pub auto_reconcile: bool,
    pub min_confidence: f64,
    pub jobs: Vec<ScheduledJob>,
    pub last_sync: Option<String>,
    pub last_sync_success: Option<bool>,
}

pub struct SyncScheduler {
    sync: Arc<SyncService>,
    interval_minutes: u64,
    running: AtomicBool,
    last_result: RwLock<Option<SyncResult>>,
    next_run: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    shutdown: Arc<Notify>,
}

impl SyncScheduler {
    pub fn new(sync: Arc<SyncService>, interval_minutes: u64) -> Self {
        Self {
            sync,
            interval_minutes: interval_minutes.max(1),
            running: AtomicBool::new(false),
            last_result: RwLock::new(None),
            next_run: RwLock::new(None),
            shutdown: Arc::new(Notify::new()),
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the sync loop. Calling it on a running scheduler does nothing.
    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("sync scheduler already running");
            return;
        }
        tracing::info!(
            interval_minutes = self.interval_minutes,
            "starting Mercury sync scheduler"
        );

        tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + INITIAL_DELAY, self.period());
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.set_next_run(INITIAL_DELAY).await;
            let shutdown = self.shutdown.clone();

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let result = self.sync.sync_mercury_transactions().await;
                        *self.last_result.write().await = Some(result);
                        self.set_next_run(self.period()).await;
                    }
                    _ = shutdown.notified() => {
                        tracing::info!("sync scheduler shutting down");
                        break;
                    }
                }
            }

            *self.next_run.write().await = None;
            self.running.store(false, Ordering::SeqCst);
        });
    }

    pub fn stop(&self) {
        if self.is_running() {
            self.shutdown.notify_one();
        }
    }

    async fn set_next_run(&self, after: Duration) {
        let next = chrono::Utc::now() + chrono::Duration::seconds(after.as_secs() as i64);
        *self.next_run.write().await = Some(next);
    }

    pub async fn last_result(&self) -> Option<SyncResult> {
        self.last_result.read().await.clone()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let running = self.is_running();
        let settings = self.sync.settings();
        let last = self.last_result.read().await;
        let jobs = if running {
            vec![ScheduledJob {
                id: SYNC_JOB_ID.to_string(),
                name: SYNC_JOB_NAME.to_string(),
                next_run: self.next_run.read().await.map(|t| t.to_rfc3339()),
            }]
        } else {
            Vec::new()
        };

        SchedulerStatus {
            running,
            interval_minutes: self.interval_minutes,
            auto_reconcile: settings.auto_reconcile,
            min_confidence: settings.min_confidence,
            jobs,
            last_sync: last.as_ref().and_then(|r| r.completed_at.clone()),
            last_sync_success: last.as_ref().map(|r| r.success),
        }
    }
}
