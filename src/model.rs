//! Monitoring data model
//!
//! These types are shared by the registry, the persisted config file, the
//! activity log files and the REST transport, so their serde representation is
//! part of the on-disk and on-the-wire contract.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MonitoringError, MonitoringResult};

/// Lowest accepted `max_failures` value
pub const MIN_MAX_FAILURES: i64 = 1;

/// Highest accepted `max_failures` value
pub const MAX_MAX_FAILURES: i64 = 100;

/// Lowest checking interval accepted from API requests (seconds)
///
/// The registry validator only requires a positive interval; both checks are
/// kept as they are.
pub const MIN_REQUEST_INTERVAL_SECS: i64 = 5;

/// How a monitored host is probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitoringMethod {
    /// ICMP ping executed from the device's own shell
    #[serde(rename = "ping_by_device")]
    PingByDevice,

    /// ICMP ping executed from the host running this service
    #[serde(rename = "icmp")]
    Icmp,

    /// Plain HTTP GET
    #[serde(rename = "http")]
    Http,

    /// HTTPS GET without certificate validation
    #[serde(rename = "https")]
    Https,

    /// WebSocket handshake
    #[serde(rename = "ws")]
    WebSocket,
}

impl MonitoringMethod {
    pub const ALL: [MonitoringMethod; 5] = [
        MonitoringMethod::PingByDevice,
        MonitoringMethod::Icmp,
        MonitoringMethod::Http,
        MonitoringMethod::Https,
        MonitoringMethod::WebSocket,
    ];

    /// Get the wire name of the method
    ///
    /// This matches the serde serialization format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringMethod::PingByDevice => "ping_by_device",
            MonitoringMethod::Icmp => "icmp",
            MonitoringMethod::Http => "http",
            MonitoringMethod::Https => "https",
            MonitoringMethod::WebSocket => "ws",
        }
    }
}

impl fmt::Display for MonitoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MonitoringMethod::PingByDevice => "ICMP Ping By Device",
            MonitoringMethod::Icmp => "ICMP",
            MonitoringMethod::Http => "HTTP",
            MonitoringMethod::Https => "HTTPS",
            MonitoringMethod::WebSocket => "WS",
        };
        f.write_str(label)
    }
}

/// Monitoring definition for a single device, keyed by serial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringTask {
    /// Device serial (unique key)
    pub serial: String,

    /// Probe target (host, IP, or host:port)
    pub host: String,

    /// Probe method
    pub method: MonitoringMethod,

    /// Consecutive failed probes before remediation kicks in
    pub max_failures: i64,

    /// Seconds between ticks
    pub checking_interval: i64,

    /// Seconds to keep airplane mode enabled during remediation
    pub airplane_mode_delay: i64,

    #[serde(default)]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl MonitoringTask {
    /// Build a new task for `serial` from a create request
    ///
    /// Timestamps are set to now and the task starts out active.
    pub fn from_request(serial: impl Into<String>, request: MonitoringTaskRequest) -> Self {
        let now = Utc::now();
        Self {
            serial: serial.into(),
            host: request.host,
            method: request.method,
            max_failures: request.max_failures,
            checking_interval: request.checking_interval,
            airplane_mode_delay: request.airplane_mode_delay,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Authoritative task validation
    ///
    /// Serial and host must be non-blank, `max_failures` within 1..=100, the
    /// interval positive, the delay non-negative and neither timestamp in the
    /// future. The method is constrained by its type.
    pub fn is_valid(&self) -> bool {
        if self.serial.trim().is_empty() || self.host.trim().is_empty() {
            return false;
        }

        if self.checking_interval <= 0 || self.airplane_mode_delay < 0 {
            return false;
        }

        if !(MIN_MAX_FAILURES..=MAX_MAX_FAILURES).contains(&self.max_failures) {
            return false;
        }

        let now = Utc::now();
        self.created_at <= now && self.updated_at <= now
    }

    /// Overwrite the mutable fields from an update request
    pub fn apply_request(&mut self, request: &MonitoringTaskRequest) {
        self.host = request.host.clone();
        self.method = request.method;
        self.max_failures = request.max_failures;
        self.checking_interval = request.checking_interval;
        self.airplane_mode_delay = request.airplane_mode_delay;
    }
}

/// Body of create and update requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringTaskRequest {
    pub host: String,
    pub method: MonitoringMethod,
    pub max_failures: i64,
    pub checking_interval: i64,
    pub airplane_mode_delay: i64,
}

impl MonitoringTaskRequest {
    /// Request-level validation applied by the transport before the registry
    /// sees the request
    pub fn validate(&self) -> MonitoringResult<()> {
        if self.host.trim().is_empty() {
            return Err(MonitoringError::InvalidTask("host is required".to_string()));
        }

        if self.max_failures < MIN_MAX_FAILURES {
            return Err(MonitoringError::InvalidTask(format!(
                "max_failures must be at least {MIN_MAX_FAILURES}"
            )));
        }

        if self.checking_interval < MIN_REQUEST_INTERVAL_SECS {
            return Err(MonitoringError::InvalidTask(format!(
                "checking_interval must be at least {MIN_REQUEST_INTERVAL_SECS}"
            )));
        }

        if self.airplane_mode_delay < 0 {
            return Err(MonitoringError::InvalidTask(
                "airplane_mode_delay must be at least 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// A single activity event for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringLog {
    pub serial: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl MonitoringLog {
    pub fn new(serial: impl Into<String>, success: bool, message: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            success,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Live state of a running worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub serial: String,
    pub failure_count: i64,
    pub last_ping_time: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub last_success: bool,
}

impl MonitoringStatus {
    /// Fresh status for a worker that is about to start
    pub fn started(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            failure_count: 0,
            last_ping_time: None,
            is_running: true,
            last_success: false,
        }
    }
}
