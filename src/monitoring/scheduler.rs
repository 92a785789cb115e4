//! Probe scheduler: one long-lived task per active monitor.
//!
//! Each task drives the loop "probe → record → notify → sleep". The
//! monitor is re-read from the repository at every loop head, so
//! `add_or_replace` takes effect at the next scheduling decision without
//! cancelling an in-flight probe. The sequential loop makes the
//! at-most-one-in-flight guarantee structural.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::entities::prelude::MonitorModel;
use crate::db::repository::MonitorRepository;
use crate::monitoring::executors::ProbeService;
use crate::monitoring::probe_config::MonitorType;
use crate::monitoring::recorder::StatusRecorder;
use crate::monitoring::retry;
use crate::monitoring::types::{CheckResult, CheckStatus};
use crate::notifications::engine::NotificationEngine;

/// Pause before retrying the loop head after a repository read failure.
const REPO_ERROR_BACKOFF: Duration = Duration::from_secs(60);

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    repo: Arc<dyn MonitorRepository>,
    prober: Arc<dyn ProbeService>,
    recorder: Arc<StatusRecorder>,
    engine: Arc<NotificationEngine>,
    tasks: Mutex<HashMap<String, MonitorTask>>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        repo: Arc<dyn MonitorRepository>,
        prober: Arc<dyn ProbeService>,
        recorder: Arc<StatusRecorder>,
        engine: Arc<NotificationEngine>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                prober,
                recorder,
                engine,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Load every active monitor and start its task.
    pub async fn start(&self) -> Result<(), crate::db::repository::RepositoryError> {
        self.reset_all().await
    }

    /// Stop all tasks. Running probes finish and record normally.
    pub async fn stop(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        for (monitor_id, task) in tasks.drain() {
            let _ = task.shutdown.send(true);
            info!(monitor_id = %monitor_id, "Stopping monitor task.");
        }
    }

    /// Reload everything from the repository.
    pub async fn reset_all(&self) -> Result<(), crate::db::repository::RepositoryError> {
        self.stop().await;
        let monitors = self.inner.repo.list_active_monitors().await?;
        info!(count = monitors.len(), "Scheduling active monitors.");
        for monitor in monitors {
            self.spawn_task(&monitor.id).await;
        }
        Ok(())
    }

    /// Ensure the scheduling state matches the (possibly updated) monitor.
    /// A running task picks configuration changes up by itself at the next
    /// loop head.
    pub async fn add_or_replace(&self, monitor: &MonitorModel) {
        if !monitor.active {
            self.remove(&monitor.id).await;
            return;
        }
        let has_live_task = {
            let tasks = self.inner.tasks.lock().await;
            tasks
                .get(&monitor.id)
                .map(|t| !t.handle.is_finished())
                .unwrap_or(false)
        };
        if !has_live_task {
            self.spawn_task(&monitor.id).await;
        }
    }

    /// Discard the monitor's task. A running probe completes and its
    /// result is recorded; no further probe is scheduled.
    pub async fn remove(&self, monitor_id: &str) {
        let mut tasks = self.inner.tasks.lock().await;
        if let Some(task) = tasks.remove(monitor_id) {
            let _ = task.shutdown.send(true);
            info!(monitor_id = monitor_id, "Removed monitor task.");
        }
    }

    pub async fn pause(&self, monitor_id: &str) {
        self.remove(monitor_id).await;
    }

    pub async fn resume(&self, monitor_id: &str) {
        match self.inner.repo.find_monitor(monitor_id).await {
            Ok(Some(monitor)) if monitor.active => {
                self.add_or_replace(&monitor).await;
            }
            Ok(_) => {
                warn!(monitor_id = monitor_id, "Resume requested for missing or paused monitor.");
            }
            Err(e) => {
                error!(monitor_id = monitor_id, error = %e, "Failed to load monitor for resume.");
            }
        }
    }

    async fn spawn_task(&self, monitor_id: &str) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_monitor_loop(
            self.inner.clone(),
            monitor_id.to_string(),
            shutdown_rx,
        ));
        let mut tasks = self.inner.tasks.lock().await;
        if let Some(previous) = tasks.insert(
            monitor_id.to_string(),
            MonitorTask {
                shutdown: shutdown_tx,
                handle,
            },
        ) {
            let _ = previous.shutdown.send(true);
        }
    }
}

async fn run_monitor_loop(
    inner: Arc<Inner>,
    monitor_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(monitor_id = %monitor_id, "Monitor task started.");
    loop {
        if *shutdown.borrow() {
            break;
        }

        // Re-read at every decision point so add_or_replace takes effect.
        let monitor = match inner.repo.find_monitor(&monitor_id).await {
            Ok(Some(monitor)) if monitor.active => monitor,
            Ok(_) => {
                info!(monitor_id = %monitor_id, "Monitor gone or paused; task exits.");
                break;
            }
            Err(e) => {
                error!(monitor_id = %monitor_id, error = %e, "Failed to load monitor; retrying later.");
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(REPO_ERROR_BACKOFF) => continue,
                }
            }
        };

        let prev_status = monitor.last_status.and_then(CheckStatus::from_i16);
        let result = run_probe_attempt(&inner, &monitor).await;

        let monitor_type =
            MonitorType::parse(&monitor.monitor_type).unwrap_or(MonitorType::Http);
        match inner.recorder.record(&monitor.id, monitor_type, &result).await {
            Ok(_row) => {
                // The row is committed; the engine may now read it.
                if let Err(e) = inner
                    .engine
                    .evaluate(&monitor.id, result.status, &result.message, prev_status)
                    .await
                {
                    error!(monitor_id = %monitor.id, error = %e, "Notification evaluation failed.");
                }
            }
            Err(e) => {
                error!(monitor_id = %monitor.id, error = %e, "Recording failed; notification skipped.");
            }
        }

        // The interval is honored from the end of the probe attempt.
        let pause = Duration::from_secs(monitor.interval_seconds.max(1) as u64);
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    info!(monitor_id = %monitor_id, "Monitor task finished.");
}

/// One retry-wrapped probe with panic containment: a panicking executor
/// becomes a DOWN result and never takes the scheduler down.
async fn run_probe_attempt(inner: &Arc<Inner>, monitor: &MonitorModel) -> CheckResult {
    let attempt = || {
        let prober = inner.prober.clone();
        let monitor = monitor.clone();
        async move {
            match std::panic::AssertUnwindSafe(prober.probe(&monitor))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => CheckResult::down(format!("检查执行出错: {}", panic_detail(panic))),
            }
        }
    };
    retry::run_with_retries(monitor.retries, monitor.retry_interval_seconds, attempt).await
}

fn panic_detail(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{http_config, monitor_fixture, MemoryRepository};
    use crate::notifications::engine::{NotificationDispatcher, NotificationEngine};
    use crate::notifications::models::NotificationData;
    use crate::notifications::senders::SenderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    struct NullDispatcher;

    #[async_trait]
    impl NotificationDispatcher for NullDispatcher {
        async fn dispatch(
            &self,
            _channel: &crate::db::entities::prelude::NotificationChannelModel,
            _data: &NotificationData,
        ) -> Result<(), SenderError> {
            Ok(())
        }
    }

    /// Scripted prober that also asserts the one-in-flight invariant.
    struct ScriptedProber {
        calls: AtomicUsize,
        in_flight: AtomicI32,
        max_in_flight: AtomicI32,
        panic_on_call: Option<usize>,
        down_on_call: Option<usize>,
    }

    impl ScriptedProber {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicI32::new(0),
                max_in_flight: AtomicI32::new(0),
                panic_on_call: None,
                down_on_call: None,
            }
        }

        fn panicking_on(call: usize) -> Self {
            Self {
                panic_on_call: Some(call),
                ..Self::new()
            }
        }

        fn down_on(call: usize) -> Self {
            Self {
                down_on_call: Some(call),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ProbeService for ScriptedProber {
        async fn probe(&self, _monitor: &MonitorModel) -> CheckResult {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            // A tiny await keeps the probe suspendable like real I/O.
            tokio::task::yield_now().await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.panic_on_call == Some(call) {
                panic!("executor exploded");
            }
            if self.down_on_call == Some(call) {
                return CheckResult::down("状态码 500 不在允许范围内");
            }
            CheckResult::up("HTTP 200", Some(10))
        }
    }

    fn build(
        repo: Arc<MemoryRepository>,
        prober: Arc<ScriptedProber>,
    ) -> Scheduler {
        let recorder = Arc::new(StatusRecorder::with_id_seed(repo.clone(), 5));
        let engine = Arc::new(NotificationEngine::new(
            repo.clone(),
            Arc::new(NullDispatcher),
        ));
        Scheduler::new(repo, prober, recorder, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn one_row_per_probe_and_never_overlapping() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.interval_seconds = 1;
        repo.add_monitor(monitor);

        let prober = Arc::new(ScriptedProber::new());
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.stop().await;
        // Let the task observe the shutdown signal.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let calls = prober.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected several probes, got {calls}");
        assert_eq!(repo.rows_for("m1").len(), calls);
        assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 1);

        let monitor = repo.monitor("m1").unwrap();
        assert_eq!(monitor.last_status, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_probing() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.interval_seconds = 1;
        repo.add_monitor(monitor);

        let prober = Arc::new(ScriptedProber::new());
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        scheduler.stop().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let after_stop = prober.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_monitors_are_never_probed() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.active = false;
        repo.add_monitor(monitor);

        let prober = Arc::new(ScriptedProber::new());
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
        assert!(repo.rows_for("m1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deactivation_is_noticed_at_the_next_loop_head() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.interval_seconds = 1;
        repo.add_monitor(monitor);

        let prober = Arc::new(ScriptedProber::new());
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        repo.set_active("m1", false);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let settled = prober.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), settled);
    }

    #[tokio::test(start_paused = true)]
    async fn executor_panic_becomes_a_down_row_and_the_loop_survives() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.interval_seconds = 1;
        repo.add_monitor(monitor);

        let prober = Arc::new(ScriptedProber::panicking_on(0));
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        scheduler.stop().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let rows = repo.rows_for("m1");
        assert!(rows.len() >= 2, "loop must continue after the panic");

        let mut sorted = rows.clone();
        sorted.sort_by_key(|r| r.timestamp);
        let first = &sorted[0];
        assert_eq!(first.status, CheckStatus::Down.as_i16());
        assert!(first
            .message
            .as_deref()
            .unwrap()
            .starts_with("检查执行出错: executor exploded"));
        // Later probes succeed again.
        assert_eq!(sorted.last().unwrap().status, CheckStatus::Up.as_i16());
    }

    #[tokio::test(start_paused = true)]
    async fn recording_failure_keeps_the_task_alive() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.interval_seconds = 1;
        repo.add_monitor(monitor);
        repo.set_fail_inserts(true);

        let prober = Arc::new(ScriptedProber::new());
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(prober.calls.load(Ordering::SeqCst) >= 2);
        assert!(repo.rows_for("m1").is_empty());

        // Storage recovers; rows start flowing again.
        repo.set_fail_inserts(false);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!repo.rows_for("m1").is_empty());
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovered_by_retry_writes_one_up_row() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.interval_seconds = 60;
        monitor.retries = 2;
        monitor.retry_interval_seconds = 1;
        repo.add_monitor(monitor);

        let prober = Arc::new(ScriptedProber::down_on(0));
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        // First attempt fails, the retry one second later succeeds.
        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.stop().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let rows = repo.rows_for("m1");
        assert_eq!(rows.len(), 1, "retried attempts collapse into one row");
        assert_eq!(rows[0].status, CheckStatus::Up.as_i16());
        // The history row compacts UP messages away; the annotated retry
        // outcome lives in the monitor's last-known message.
        assert_eq!(rows[0].message, None);
        let monitor = repo.monitor("m1").unwrap();
        assert!(monitor
            .last_message
            .as_deref()
            .unwrap()
            .contains("重试成功 (1/2)"));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_discards_the_task() {
        let repo = Arc::new(MemoryRepository::new());
        let mut monitor = monitor_fixture("m1", MonitorType::Http, http_config("http://ok"));
        monitor.interval_seconds = 1;
        repo.add_monitor(monitor);

        let prober = Arc::new(ScriptedProber::new());
        let scheduler = build(repo.clone(), prober.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        scheduler.remove("m1").await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let settled = prober.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), settled);

        // Resume restarts probing.
        scheduler.resume("m1").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(prober.calls.load(Ordering::SeqCst) > settled);
        scheduler.stop().await;
    }
}
