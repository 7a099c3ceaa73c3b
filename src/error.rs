//! Error types for monitoring operations

use std::fmt;

/// Result type alias for monitoring operations
pub type MonitoringResult<T> = Result<T, MonitoringError>;

/// Errors returned synchronously by the monitoring core
///
/// Runtime probe and remediation failures never surface here; they are
/// recorded as activity log entries instead.
#[derive(Debug)]
pub enum MonitoringError {
    /// A task with this serial already exists
    TaskExists(String),

    /// No task with this serial is registered
    TaskNotFound(String),

    /// No live status exists for this serial (worker not running)
    StatusNotFound(String),

    /// The task's worker is already running
    AlreadyRunning(String),

    /// The task has no running worker
    NotRunning(String),

    /// Task or request failed validation
    InvalidTask(String),

    /// Auto-start did not finish within its overall budget
    AutoStartTimeout,

    /// Device or network collaborator failure
    Device(String),

    /// Config or log (de)serialization error
    SerializationError(String),

    /// I/O error (file access, etc.)
    IoError(std::io::Error),
}

impl fmt::Display for MonitoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitoringError::TaskExists(serial) => {
                write!(f, "monitoring task already exists: {}", serial)
            }
            MonitoringError::TaskNotFound(serial) => {
                write!(f, "task not found in configuration file: {}", serial)
            }
            MonitoringError::StatusNotFound(serial) => {
                write!(f, "no monitoring status for device: {}", serial)
            }
            MonitoringError::AlreadyRunning(serial) => {
                write!(f, "monitoring task is already running: {}", serial)
            }
            MonitoringError::NotRunning(serial) => {
                write!(f, "no running monitoring task found: {}", serial)
            }
            MonitoringError::InvalidTask(msg) => {
                write!(f, "invalid monitoring task configuration: {}", msg)
            }
            MonitoringError::AutoStartTimeout => write!(f, "auto start tasks timeout"),
            MonitoringError::Device(msg) => write!(f, "device error: {}", msg),
            MonitoringError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            MonitoringError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for MonitoringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitoringError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MonitoringError {
    fn from(err: std::io::Error) -> Self {
        MonitoringError::IoError(err)
    }
}

impl From<serde_json::Error> for MonitoringError {
    fn from(err: serde_json::Error) -> Self {
        MonitoringError::SerializationError(err.to_string())
    }
}
