//! Worker orchestration - one supervised polling loop per active task
//!
//! ## Per-tick flow
//!
//! ```text
//! tick ──> device online? ──no──> offline timer ──(>= 5 min)──> stop + persist
//!              │
//!             yes
//!              ▼
//!        probe (30s bound) ──ok──> failures = 0, log success
//!              │
//!            failed
//!              ▼
//!        failures += 1 ──(>= max_failures)──> remediation, up to 5 attempts 5s apart
//!                                                 │                 │
//!                                              success          exhausted
//!                                                 ▼                 ▼
//!                                          failures = 0       stop + persist
//! ```
//!
//! Each started loop gets a generation id. Status updates and self-stops only
//! take effect while that id is still the registered one, so a loop that is
//! being replaced can never touch its successor.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::device::DeviceBridge;
use crate::error::{MonitoringError, MonitoringResult};
use crate::model::{MonitoringStatus, MonitoringTask};

use super::config_store::ConfigStore;
use super::log_store::ActivityLogStore;
use super::probe::Prober;
use super::registry::TaskRegistry;
use super::remediation::RemediationActuator;

/// Upper bound for a single probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Continuous offline time after which a task stops itself
pub const MAX_OFFLINE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Remediation attempts before a task gives up
pub const MAX_RESTART_ATTEMPTS: u32 = 5;

/// Pause between failed remediation attempts
pub const RESTART_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Overall budget for auto-starting every active task
pub const AUTO_START_BUDGET: Duration = Duration::from_secs(60);

/// Per-task start time above which a warning is emitted
pub const AUTO_START_SOFT_BUDGET: Duration = Duration::from_secs(30);

/// Longest tick period a loop schedules; larger intervals are clamped to it
pub const MAX_TICK_PERIOD: Duration = Duration::from_secs(u32::MAX as u64);

struct RunningWorker {
    id: u64,
    token: CancellationToken,
    status: MonitoringStatus,
}

struct Shared {
    registry: Arc<TaskRegistry>,
    config_store: Arc<ConfigStore>,
    logs: Arc<ActivityLogStore>,
    bridge: Arc<dyn DeviceBridge>,
    prober: Arc<dyn Prober>,
    actuator: RemediationActuator,
    workers: RwLock<HashMap<String, RunningWorker>>,
    next_id: AtomicU64,
}

/// Owns the running loops and their live status
///
/// Cheap to clone; every clone drives the same set of workers.
#[derive(Clone)]
pub struct WorkerOrchestrator {
    shared: Arc<Shared>,
}

impl WorkerOrchestrator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        config_store: Arc<ConfigStore>,
        logs: Arc<ActivityLogStore>,
        bridge: Arc<dyn DeviceBridge>,
        prober: Arc<dyn Prober>,
        actuator: RemediationActuator,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                config_store,
                logs,
                bridge,
                prober,
                actuator,
                workers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start the polling loop for `serial` and mark the task active
    #[instrument(skip(self))]
    pub async fn start(&self, serial: &str) -> MonitoringResult<()> {
        let task = self.shared.registry.get(serial).await?;
        if !self.shared.registry.validate(&task) {
            return Err(MonitoringError::InvalidTask(format!(
                "task for {serial} failed validation"
            )));
        }

        let (id, token) = {
            let mut workers = self.shared.workers.write().await;
            if workers.contains_key(serial) {
                warn!("task already running");
                return Err(MonitoringError::AlreadyRunning(serial.to_string()));
            }

            self.shared.registry.set_active(serial, true).await?;

            let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();
            workers.insert(
                serial.to_string(),
                RunningWorker {
                    id,
                    token: token.clone(),
                    status: MonitoringStatus::started(serial),
                },
            );
            (id, token)
        };

        info!(host = %task.host, method = task.method.as_str(), generation = id, "started monitoring task");

        // Spawned before the next await so a cancelled caller cannot leave a
        // registered worker without a loop.
        let worker = WorkerLoop {
            shared: self.shared.clone(),
            id,
            token,
            task,
            failure_count: 0,
            offline_since: None,
        };
        tokio::spawn(worker.run());

        self.shared
            .logs
            .write(serial, true, "Monitoring task started")
            .await;

        Ok(())
    }

    /// Cancel the loop for `serial`
    ///
    /// An update-driven stop keeps the task's active flag and logs a distinct
    /// message.
    #[instrument(skip(self))]
    pub async fn stop(&self, serial: &str, is_update: bool) -> MonitoringResult<()> {
        let task = self.shared.registry.get(serial).await?;
        if !self.shared.registry.validate(&task) {
            return Err(MonitoringError::InvalidTask(format!(
                "task for {serial} failed validation"
            )));
        }

        let worker = self
            .shared
            .workers
            .write()
            .await
            .remove(serial)
            .ok_or_else(|| MonitoringError::NotRunning(serial.to_string()))?;
        worker.token.cancel();

        if !is_update && let Err(e) = self.shared.registry.set_active(serial, false).await {
            warn!("failed to update task status: {e}");
        }

        let message = if is_update {
            "Monitoring task stopped for update configuration"
        } else {
            "Monitoring task stopped"
        };
        self.shared.logs.write(serial, true, message).await;

        info!(generation = worker.id, "stopped monitoring task");
        Ok(())
    }

    pub async fn get_status(&self, serial: &str) -> MonitoringResult<MonitoringStatus> {
        self.shared
            .workers
            .read()
            .await
            .get(serial)
            .map(|worker| worker.status.clone())
            .ok_or_else(|| MonitoringError::StatusNotFound(serial.to_string()))
    }

    pub async fn is_running(&self, serial: &str) -> bool {
        self.shared.workers.read().await.contains_key(serial)
    }

    /// Start every task flagged active, concurrently, within [`AUTO_START_BUDGET`]
    ///
    /// Individual start failures are logged only. Each attempt runs as its own
    /// task: the budget bounds the wait, not the attempts, so starts still in
    /// flight when it runs out complete in the background.
    pub async fn auto_start(&self) -> MonitoringResult<()> {
        let active: Vec<MonitoringTask> = self
            .shared
            .registry
            .get_all()
            .await
            .into_iter()
            .filter(|task| task.is_active)
            .collect();

        if active.is_empty() {
            info!("no active monitoring tasks found, skipping auto start");
            return Ok(());
        }

        let attempts = active.into_iter().map(|task| {
            let this = self.clone();
            tokio::spawn(async move {
                let begun = Instant::now();
                let result = this.start(&task.serial).await;

                let elapsed = begun.elapsed();
                if elapsed > AUTO_START_SOFT_BUDGET {
                    warn!(serial = %task.serial, ?elapsed, "auto start of task exceeded soft budget");
                }

                match &result {
                    Ok(()) => {
                        this.shared
                            .logs
                            .write(
                                &task.serial,
                                true,
                                "Monitoring task automatically started on application startup",
                            )
                            .await;
                        info!(serial = %task.serial, host = %task.host, "auto started monitoring task");
                    }
                    Err(e) => error!(serial = %task.serial, "failed to auto start monitoring task: {e}"),
                }
                result
            })
        });

        match tokio::time::timeout(AUTO_START_BUDGET, join_all(attempts)).await {
            Ok(results) => {
                let failed = results
                    .iter()
                    .filter(|r| !matches!(r, Ok(Ok(()))))
                    .count();
                if failed > 0 {
                    warn!(failed, "some tasks failed to start");
                }
                Ok(())
            }
            Err(_) => {
                error!("auto start timed out, some tasks may not have started");
                Err(MonitoringError::AutoStartTimeout)
            }
        }
    }

    /// Cancel every loop, clear the active flags and drop all status records
    ///
    /// Nothing is persisted here.
    pub async fn shutdown(&self) {
        info!("starting graceful shutdown");

        let drained: Vec<(String, RunningWorker)> =
            self.shared.workers.write().await.drain().collect();

        for (serial, worker) in drained {
            worker.token.cancel();
            debug!(serial, "stopping monitoring task during shutdown");

            if let Err(e) = self.shared.registry.set_active(&serial, false).await {
                warn!(serial, "failed to update task status during shutdown: {e}");
            }
        }

        info!("graceful shutdown completed");
    }
}

impl Shared {
    /// Apply `update` to the status of generation `id`; false if superseded
    async fn update_status<F>(&self, serial: &str, id: u64, update: F) -> bool
    where
        F: FnOnce(&mut MonitoringStatus),
    {
        match self.workers.write().await.get_mut(serial) {
            Some(worker) if worker.id == id => {
                update(&mut worker.status);
                true
            }
            _ => false,
        }
    }

    /// Permanently stop generation `id` from inside its own loop and persist
    async fn stop_generation(&self, serial: &str, id: u64) {
        let removed = {
            let mut workers = self.workers.write().await;
            match workers.get(serial) {
                Some(worker) if worker.id == id => workers.remove(serial),
                _ => None,
            }
        };

        let Some(worker) = removed else {
            debug!(serial, generation = id, "worker already superseded, not stopping");
            return;
        };
        worker.token.cancel();

        if let Err(e) = self.registry.set_active(serial, false).await {
            warn!(serial, "failed to update task status: {e}");
        }
        self.logs.write(serial, true, "Monitoring task stopped").await;

        let tasks = self.registry.get_all().await;
        if let Err(e) = self.config_store.persist(tasks).await {
            error!(serial, "failed to save tasks after stop: {e}");
        }
    }
}

/// State owned by one running loop
struct WorkerLoop {
    shared: Arc<Shared>,
    id: u64,
    token: CancellationToken,
    task: MonitoringTask,
    failure_count: i64,
    offline_since: Option<Instant>,
}

impl WorkerLoop {
    #[instrument(skip(self), fields(serial = %self.task.serial, generation = self.id))]
    async fn run(mut self) {
        let period = tick_period(self.task.checking_interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.tick().await.is_break() {
                break;
            }
        }

        debug!("monitoring worker stopped");
    }

    async fn tick(&mut self) -> ControlFlow<()> {
        let serial = self.task.serial.clone();

        if !self.shared.bridge.is_online(&serial).await {
            return self.handle_offline(&serial).await;
        }

        if let Some(since) = self.offline_since.take() {
            info!(was_offline_for = ?since.elapsed(), "device back online, resetting offline timer");
        }

        let success = tokio::select! {
            _ = self.token.cancelled() => return ControlFlow::Break(()),
            result = tokio::time::timeout(PROBE_TIMEOUT, self.shared.prober.probe(&self.task)) => {
                result.unwrap_or_else(|_| {
                    debug!("probe timed out");
                    false
                })
            }
        };

        if success {
            self.failure_count = 0;
        } else {
            self.failure_count += 1;
        }

        let failure_count = self.failure_count;
        let current = self
            .shared
            .update_status(&serial, self.id, |status| {
                status.last_ping_time = Some(Utc::now());
                status.last_success = success;
                status.failure_count = failure_count;
            })
            .await;
        if !current {
            return ControlFlow::Break(());
        }

        if success {
            let message = format!(
                "Ping to {} success using {} method",
                self.task.host, self.task.method
            );
            debug!("{message}");
            self.shared.logs.write(&serial, true, message).await;
            return ControlFlow::Continue(());
        }

        let message = format!(
            "Ping to {} failed using {} method. Retry {}/{}",
            self.task.host, self.task.method, self.failure_count, self.task.max_failures
        );
        debug!("{message}");
        self.shared.logs.write(&serial, false, message).await;

        if self.failure_count >= self.task.max_failures {
            return self.remediate(&serial).await;
        }

        ControlFlow::Continue(())
    }

    async fn handle_offline(&mut self, serial: &str) -> ControlFlow<()> {
        debug!("device not online, waiting");
        self.shared
            .logs
            .write(
                serial,
                false,
                "Device is offline, waiting for device to come online",
            )
            .await;

        let since = *self.offline_since.get_or_insert_with(|| {
            info!("device went offline, starting offline timer");
            Instant::now()
        });

        let offline_for = since.elapsed();
        if offline_for < MAX_OFFLINE_DURATION {
            return ControlFlow::Continue(());
        }

        error!(?offline_for, max = ?MAX_OFFLINE_DURATION, "device offline for too long, stopping monitoring task");
        self.shared
            .logs
            .write(
                serial,
                false,
                format!(
                    "Device offline {}s, stopping monitoring task",
                    offline_for.as_secs()
                ),
            )
            .await;

        self.shared.stop_generation(serial, self.id).await;
        ControlFlow::Break(())
    }

    async fn remediate(&mut self, serial: &str) -> ControlFlow<()> {
        info!(
            failure_count = self.failure_count,
            max_failures = self.task.max_failures,
            "max failures reached, performing restart action"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = tokio::select! {
                _ = self.token.cancelled() => return ControlFlow::Break(()),
                result = self
                    .shared
                    .actuator
                    .perform_restart_action(serial, self.task.airplane_mode_delay) => result,
            };

            let Err(e) = result else {
                break;
            };

            error!(attempt, "failed to perform restart action: {e:#}");
            self.shared
                .logs
                .write(
                    serial,
                    false,
                    format!(
                        "Failed to perform restart action: {e:#}. Retry {attempt}/{MAX_RESTART_ATTEMPTS}"
                    ),
                )
                .await;

            if attempt >= MAX_RESTART_ATTEMPTS {
                error!("max restart failure reached, stopping monitoring task");
                self.shared
                    .logs
                    .write(
                        serial,
                        false,
                        "Max restart failure reached, stopping monitoring task",
                    )
                    .await;
                self.shared.stop_generation(serial, self.id).await;
                return ControlFlow::Break(());
            }

            tokio::select! {
                _ = self.token.cancelled() => return ControlFlow::Break(()),
                _ = tokio::time::sleep(RESTART_RETRY_DELAY) => {}
            }
        }

        self.shared
            .logs
            .write(serial, true, "Restart action performed successfully")
            .await;
        self.failure_count = 0;

        if self
            .shared
            .update_status(serial, self.id, |status| status.failure_count = 0)
            .await
        {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }
}

/// Tick period for a validated interval, clamped to [`MAX_TICK_PERIOD`]
fn tick_period(checking_interval: i64) -> Duration {
    Duration::from_secs(checking_interval.max(1) as u64).min(MAX_TICK_PERIOD)
}
