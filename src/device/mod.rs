//! Device-side collaborators
//!
//! The monitoring core never talks to the debug bridge directly. It consumes
//! two narrow seams:
//!
//! - [`DeviceBridge`]: "is this serial reachable" and "run a shell command"
//! - [`NetworkControl`]: "toggle airplane mode and report the resulting state"
//!
//! [`adb::AdbClient`] implements both on top of the `adb` executable. Tests
//! substitute in-memory fakes.

use async_trait::async_trait;

pub mod adb;

/// Access to devices attached through the debug bridge
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Whether the device with this serial is currently online
    async fn is_online(&self, serial: &str) -> bool;

    /// Run a shell command on the device and return its combined output
    async fn shell(&self, serial: &str, command: &str) -> anyhow::Result<String>;
}

/// Radio control on a device
#[async_trait]
pub trait NetworkControl: Send + Sync {
    /// Flip airplane mode and wait until the device confirms the change
    ///
    /// Returns the resulting state (`true` = airplane mode enabled).
    async fn toggle_airplane_mode(&self, serial: &str) -> anyhow::Result<bool>;
}
