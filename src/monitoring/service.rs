//! Monitoring facade consumed by the transport layer

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::MonitoringConfig;
use crate::device::{DeviceBridge, NetworkControl};
use crate::error::MonitoringResult;
use crate::model::{MonitoringLog, MonitoringStatus, MonitoringTask, MonitoringTaskRequest};

use super::config_store::ConfigStore;
use super::log_store::ActivityLogStore;
use super::probe::{Pinger, Prober};
use super::registry::TaskRegistry;
use super::remediation::RemediationActuator;
use super::worker::WorkerOrchestrator;

/// Single entry point to the monitoring subsystem
///
/// Every mutating call re-persists the full task set.
pub struct MonitoringService {
    registry: Arc<TaskRegistry>,
    config_store: Arc<ConfigStore>,
    logs: Arc<ActivityLogStore>,
    orchestrator: WorkerOrchestrator,
}

impl MonitoringService {
    /// Wire the subsystem with the default [`Pinger`] probes
    pub fn new(
        config: &MonitoringConfig,
        bridge: Arc<dyn DeviceBridge>,
        network: Arc<dyn NetworkControl>,
    ) -> anyhow::Result<Self> {
        let prober = Arc::new(Pinger::new(bridge.clone())?);
        Ok(Self::with_prober(config, bridge, network, prober))
    }

    pub fn with_prober(
        config: &MonitoringConfig,
        bridge: Arc<dyn DeviceBridge>,
        network: Arc<dyn NetworkControl>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let config_store = Arc::new(ConfigStore::new(&config.task_file));
        let logs = Arc::new(ActivityLogStore::new(&config.log_dir));
        let actuator = RemediationActuator::new(network, logs.clone());
        let orchestrator = WorkerOrchestrator::new(
            registry.clone(),
            config_store.clone(),
            logs.clone(),
            bridge,
            prober,
            actuator,
        );

        Self {
            registry,
            config_store,
            logs,
            orchestrator,
        }
    }

    /// Seed the registry from disk and resume every task left active
    ///
    /// Failures are logged; the service stays usable either way.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) {
        let tasks = self.config_store.load_all();
        info!(count = tasks.len(), "loaded monitoring tasks from config file");
        self.registry.load(tasks).await;

        if let Err(e) = self.orchestrator.auto_start().await {
            error!("failed to auto start tasks: {e}");
        }
    }

    /// Register a task and start monitoring it right away
    ///
    /// A failed start is logged, not returned.
    #[instrument(skip(self, task), fields(serial = %task.serial))]
    pub async fn create(&self, task: MonitoringTask) -> MonitoringResult<MonitoringTask> {
        let created = self.registry.create(task).await?;
        self.persist().await?;

        if created.is_active
            && let Err(e) = self.orchestrator.start(&created.serial).await
        {
            error!("failed to start monitoring after creation: {e}");
        }

        Ok(created)
    }

    pub async fn start(&self, serial: &str) -> MonitoringResult<()> {
        self.orchestrator.start(serial).await?;
        self.persist_logged("start").await;
        Ok(())
    }

    pub async fn stop(&self, serial: &str) -> MonitoringResult<()> {
        self.orchestrator.stop(serial, false).await?;
        self.persist_logged("stop").await;
        Ok(())
    }

    /// Stop (best effort) and remove a task
    #[instrument(skip(self))]
    pub async fn delete(&self, serial: &str) -> MonitoringResult<()> {
        if let Err(e) = self.stop(serial).await {
            warn!("failed to stop monitoring task during deletion: {e}");
        }

        self.registry.delete(serial).await?;
        self.persist().await
    }

    pub async fn get_status(&self, serial: &str) -> MonitoringResult<MonitoringStatus> {
        self.orchestrator.get_status(serial).await
    }

    pub async fn get_config(&self, serial: &str) -> MonitoringResult<MonitoringTask> {
        self.registry.get(serial).await
    }

    /// Apply new parameters, restarting the worker if it was running
    ///
    /// When the update is rejected a running task is restarted with its
    /// previous configuration.
    #[instrument(skip(self, request))]
    pub async fn update_config(
        &self,
        serial: &str,
        request: MonitoringTaskRequest,
    ) -> MonitoringResult<MonitoringTask> {
        let was_running = self.orchestrator.is_running(serial).await;

        if was_running && let Err(e) = self.orchestrator.stop(serial, true).await {
            warn!("failed to stop monitoring during update: {e}");
        }

        let result = self.registry.update(serial, &request).await;
        if result.is_ok() {
            self.persist_logged("update").await;
        }

        if was_running && let Err(e) = self.orchestrator.start(serial).await {
            error!("failed to restart monitoring after update: {e}");
        }

        result
    }

    pub async fn get_all(&self) -> Vec<MonitoringTask> {
        self.registry.get_all().await
    }

    /// Newest `limit` activity entries for `serial` (`0` = all buffered)
    pub async fn get_logs(&self, serial: &str, limit: usize) -> Vec<MonitoringLog> {
        self.logs.get(serial, limit).await
    }

    /// Replay buffered activity then stream live events until `token` fires
    pub async fn listen_logs<F>(
        &self,
        token: CancellationToken,
        serial: &str,
        callback: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(MonitoringLog) -> anyhow::Result<()> + Send,
    {
        self.logs.listen(token, serial, callback).await
    }

    /// Clear the activity log of an existing task
    pub async fn clear_logs(&self, serial: &str) -> MonitoringResult<()> {
        self.registry.get(serial).await?;
        self.logs.clear(serial).await
    }

    /// Persist, stop every worker and close every log listener
    ///
    /// The task set is saved before the workers are torn down; tasks running
    /// at this point stay active on disk.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.persist_logged("shutdown").await;
        self.orchestrator.shutdown().await;
        self.logs.shutdown().await;
    }

    async fn persist(&self) -> MonitoringResult<()> {
        let tasks = self.registry.get_all().await;
        self.config_store.persist(tasks).await
    }

    async fn persist_logged(&self, after: &str) {
        if let Err(e) = self.persist().await {
            error!("failed to save tasks to file after {after}: {e}");
        }
    }
}
