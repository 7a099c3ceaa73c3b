//! `adb` command-line implementation of the device collaborators

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, trace, warn};

use super::{DeviceBridge, NetworkControl};

/// Upper bound for a single adb invocation
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the device to confirm an airplane-mode change
const AIRPLANE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll period while waiting for the confirmation
const AIRPLANE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Talks to devices by spawning the `adb` executable
#[derive(Debug, Clone)]
pub struct AdbClient {
    program: String,
}

impl AdbClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `adb -s <serial> <args...>` and return stdout
    ///
    /// Non-zero exit codes are errors carrying stderr.
    async fn run(&self, serial: &str, args: &[&str]) -> Result<String> {
        trace!("running {} -s {serial} {args:?}", self.program);

        let child = Command::new(&self.program)
            .arg("-s")
            .arg(serial)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;

        let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .context("adb command timed out")?
            .context("failed to wait for adb")?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("adb exited with {}: {}", output.status, stderr.trim());
        }

        Ok(stdout)
    }

    async fn airplane_mode_enabled(&self, serial: &str) -> Result<bool> {
        let raw = self
            .run(serial, &["shell", "settings", "get", "global", "airplane_mode_on"])
            .await
            .context("error checking airplane mode status")?;

        parse_airplane_mode(&raw)
    }
}

#[async_trait]
impl DeviceBridge for AdbClient {
    async fn is_online(&self, serial: &str) -> bool {
        match self.run(serial, &["get-state"]).await {
            Ok(state) => is_online_state(&state),
            Err(e) => {
                debug!("get-state failed for {serial}: {e:#}");
                false
            }
        }
    }

    async fn shell(&self, serial: &str, command: &str) -> Result<String> {
        self.run(serial, &["shell", command]).await
    }
}

#[async_trait]
impl NetworkControl for AdbClient {
    #[instrument(skip(self))]
    async fn toggle_airplane_mode(&self, serial: &str) -> Result<bool> {
        let was_enabled = self.airplane_mode_enabled(serial).await?;
        let action = if was_enabled { "disable" } else { "enable" };

        self.run(serial, &["shell", "cmd", "connectivity", "airplane-mode", action])
            .await
            .with_context(|| format!("error {action} airplane mode"))?;

        let deadline = tokio::time::Instant::now() + AIRPLANE_CONFIRM_TIMEOUT;
        loop {
            tokio::time::sleep(AIRPLANE_POLL_INTERVAL).await;

            let current = self.airplane_mode_enabled(serial).await?;
            if current != was_enabled {
                debug!("airplane mode is now {}", if current { "on" } else { "off" });
                return Ok(current);
            }

            if tokio::time::Instant::now() >= deadline {
                warn!("device did not confirm airplane mode {action}");
                bail!("timeout: cannot change airplane mode state");
            }
        }
    }
}

/// `adb get-state` prints `device` for an online, authorized device
fn is_online_state(output: &str) -> bool {
    output.trim() == "device"
}

fn parse_airplane_mode(output: &str) -> Result<bool> {
    match output.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => bail!("unexpected airplane mode value: {other:?}"),
    }
}
