//! In-memory registry of monitoring task definitions, keyed by serial

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{MonitoringError, MonitoringResult};
use crate::model::{MonitoringTask, MonitoringTaskRequest};

/// Sole writer of [`MonitoringTask`] definitions
///
/// Every mutation goes through one registry-wide write lock; readers share the
/// read side. Callers always receive clones, never references into the map.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, MonitoringTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task
    ///
    /// Timestamps are reset to now and the task is marked active.
    pub async fn create(&self, mut task: MonitoringTask) -> MonitoringResult<MonitoringTask> {
        let mut tasks = self.tasks.write().await;

        if tasks.contains_key(&task.serial) {
            return Err(MonitoringError::TaskExists(task.serial));
        }

        let now = Utc::now();
        task.created_at = now;
        task.updated_at = now;
        task.is_active = true;

        if !task.is_valid() {
            return Err(MonitoringError::InvalidTask(format!(
                "task for {} failed validation",
                task.serial
            )));
        }

        info!(serial = %task.serial, host = %task.host, method = %task.method.as_str(), "created task");

        tasks.insert(task.serial.clone(), task.clone());
        Ok(task)
    }

    /// Apply an update request to an existing task
    ///
    /// Serial, creation time and the active flag are preserved. The existing
    /// map entry is left untouched if the resulting task would be invalid.
    pub async fn update(
        &self,
        serial: &str,
        request: &MonitoringTaskRequest,
    ) -> MonitoringResult<MonitoringTask> {
        let mut tasks = self.tasks.write().await;

        let task = tasks
            .get_mut(serial)
            .ok_or_else(|| MonitoringError::TaskNotFound(serial.to_string()))?;

        if !task.is_valid() {
            return Err(invalid(serial));
        }

        let mut candidate = task.clone();
        candidate.apply_request(request);
        candidate.updated_at = Utc::now();

        if !candidate.is_valid() {
            return Err(invalid(serial));
        }

        *task = candidate;

        info!(serial, host = %task.host, method = %task.method.as_str(), "updated task");

        Ok(task.clone())
    }

    /// Toggle the active flag
    pub async fn set_active(&self, serial: &str, is_active: bool) -> MonitoringResult<()> {
        self.update_field(serial, |task| task.is_active = is_active)
            .await
            .inspect(|_| debug!(serial, is_active, "updated task status"))
    }

    /// Apply an arbitrary mutation under the registry lock
    ///
    /// The task must be valid before the mutation and still be valid after it;
    /// otherwise the change is discarded.
    pub async fn update_field<F>(&self, serial: &str, mutate: F) -> MonitoringResult<()>
    where
        F: FnOnce(&mut MonitoringTask),
    {
        let mut tasks = self.tasks.write().await;

        let task = tasks
            .get_mut(serial)
            .ok_or_else(|| MonitoringError::TaskNotFound(serial.to_string()))?;

        if !task.is_valid() {
            return Err(invalid(serial));
        }

        let mut candidate = task.clone();
        mutate(&mut candidate);
        candidate.updated_at = Utc::now();

        if !candidate.is_valid() {
            return Err(invalid(serial));
        }

        *task = candidate;
        Ok(())
    }

    pub async fn delete(&self, serial: &str) -> MonitoringResult<()> {
        let mut tasks = self.tasks.write().await;

        if tasks.remove(serial).is_none() {
            return Err(MonitoringError::TaskNotFound(serial.to_string()));
        }

        info!(serial, "deleted task");
        Ok(())
    }

    pub async fn get(&self, serial: &str) -> MonitoringResult<MonitoringTask> {
        self.tasks
            .read()
            .await
            .get(serial)
            .cloned()
            .ok_or_else(|| MonitoringError::TaskNotFound(serial.to_string()))
    }

    /// All tasks, ordered by serial
    pub async fn get_all(&self) -> Vec<MonitoringTask> {
        let mut all: Vec<MonitoringTask> = self.tasks.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.serial.cmp(&b.serial));
        all
    }

    pub fn validate(&self, task: &MonitoringTask) -> bool {
        task.is_valid()
    }

    pub async fn exists(&self, serial: &str) -> bool {
        self.tasks.read().await.contains_key(serial)
    }

    /// Seed the registry from persisted tasks, overwriting by serial
    pub async fn load(&self, loaded: Vec<MonitoringTask>) {
        let mut tasks = self.tasks.write().await;
        for task in loaded {
            tasks.insert(task.serial.clone(), task);
        }
    }
}

fn invalid(serial: &str) -> MonitoringError {
    MonitoringError::InvalidTask(format!("task for {serial} failed validation"))
}
