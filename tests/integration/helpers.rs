//! Helper fakes and fixtures for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modemwatch::{
    MonitoringMethod, MonitoringService, MonitoringTask, MonitoringTaskRequest,
    config::MonitoringConfig,
    device::{DeviceBridge, NetworkControl},
    monitoring::Prober,
};
use tempfile::TempDir;

/// In-memory device with a controllable online flag and airplane mode
pub struct FakeDevice {
    online: AtomicBool,
    airplane: AtomicBool,
    toggle_fails: AtomicBool,
    toggles: AtomicUsize,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(true),
            airplane: AtomicBool::new(false),
            toggle_fails: AtomicBool::new(false),
            toggles: AtomicUsize::new(0),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn fail_toggles(&self) {
        self.toggle_fails.store(true, Ordering::SeqCst);
    }

    pub fn toggles(&self) -> usize {
        self.toggles.load(Ordering::SeqCst)
    }

    pub fn airplane_mode(&self) -> bool {
        self.airplane.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceBridge for FakeDevice {
    async fn is_online(&self, _serial: &str) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn shell(&self, _serial: &str, _command: &str) -> anyhow::Result<String> {
        Ok("1 packets transmitted, 1 received, 0% packet loss".to_string())
    }
}

#[async_trait]
impl NetworkControl for FakeDevice {
    async fn toggle_airplane_mode(&self, _serial: &str) -> anyhow::Result<bool> {
        self.toggles.fetch_add(1, Ordering::SeqCst);
        if self.toggle_fails.load(Ordering::SeqCst) {
            anyhow::bail!("timeout: cannot change airplane mode state");
        }
        let enabled = !self.airplane.load(Ordering::SeqCst);
        self.airplane.store(enabled, Ordering::SeqCst);
        Ok(enabled)
    }
}

/// Prober replaying scripted outcomes, then a fixed fallback
pub struct ScriptedProber {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    probes: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(script: Vec<bool>, fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            probes: AtomicUsize::new(0),
        })
    }

    pub fn always(outcome: bool) -> Arc<Self> {
        Self::new(vec![], outcome)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _task: &MonitoringTask) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

pub fn request(
    method: MonitoringMethod,
    max_failures: i64,
    checking_interval: i64,
    airplane_mode_delay: i64,
) -> MonitoringTaskRequest {
    MonitoringTaskRequest {
        host: "8.8.8.8".to_string(),
        method,
        max_failures,
        checking_interval,
        airplane_mode_delay,
    }
}

pub fn task(serial: &str, request: MonitoringTaskRequest) -> MonitoringTask {
    MonitoringTask::from_request(serial, request)
}

pub fn monitoring_config(dir: &Path) -> MonitoringConfig {
    MonitoringConfig {
        task_file: dir.join("andromodem_monitoring_config.json"),
        log_dir: dir.join("logs"),
    }
}

/// A service wired to fakes inside a temporary directory
pub struct Harness {
    pub dir: TempDir,
    pub device: Arc<FakeDevice>,
    pub prober: Arc<ScriptedProber>,
    pub service: Arc<MonitoringService>,
}

impl Harness {
    pub fn new(prober: Arc<ScriptedProber>) -> Self {
        Self::in_dir(tempfile::tempdir().unwrap(), prober)
    }

    pub fn in_dir(dir: TempDir, prober: Arc<ScriptedProber>) -> Self {
        let device = FakeDevice::new();
        let service = Arc::new(MonitoringService::with_prober(
            &monitoring_config(dir.path()),
            device.clone(),
            device.clone(),
            prober.clone(),
        ));

        Self {
            dir,
            device,
            prober,
            service,
        }
    }

    /// Shut the service down and build a fresh one over the same files
    pub async fn restart(self, prober: Arc<ScriptedProber>) -> Self {
        self.service.shutdown().await;
        Self::in_dir(self.dir, prober)
    }

    pub async fn messages(&self, serial: &str) -> Vec<String> {
        self.service
            .get_logs(serial, 0)
            .await
            .into_iter()
            .map(|log| log.message)
            .collect()
    }

    pub fn persisted_tasks(&self) -> Vec<MonitoringTask> {
        let raw = std::fs::read_to_string(
            self.dir.path().join("andromodem_monitoring_config.json"),
        )
        .unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}
