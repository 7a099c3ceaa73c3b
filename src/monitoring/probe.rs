//! Reachability probes
//!
//! Every strategy answers a single yes/no question and never retries; the
//! worker decides what a failure means.
//!
//! | Method           | How                                              |
//! |------------------|--------------------------------------------------|
//! | `ping_by_device` | `ping -c 1 -W 5 <host>` in the device shell      |
//! | `icmp`           | one `ping` from this host                        |
//! | `http`/`https`   | `GET scheme://host`, any response is success     |
//! | `ws`             | `ws://host` handshake, no payload                |

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, instrument};

use crate::device::DeviceBridge;
use crate::model::{MonitoringMethod, MonitoringTask};

/// Timeout for HTTP requests and WebSocket handshakes
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard bound on a host-side `ping` process
const HOST_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Markers of a successful single ping across Linux, macOS and Windows output
const ICMP_SUCCESS_PATTERNS: [&str; 5] = [
    "1 received",
    " 0% packet loss",
    " 0.0% packet loss",
    "received = 1",
    "lost = 0",
];

/// A reachability check for one task
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, task: &MonitoringTask) -> bool;
}

/// Probe implementation dispatching on [`MonitoringMethod`]
pub struct Pinger {
    bridge: Arc<dyn DeviceBridge>,
    client: reqwest::Client,
}

impl Pinger {
    pub fn new(bridge: Arc<dyn DeviceBridge>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { bridge, client })
    }

    /// Ping `host` from the device's own shell
    pub async fn ping_by_device(&self, serial: &str, host: &str) -> bool {
        let command = format!("ping -c 1 -W 5 {}", shell_quote(host));
        match self.bridge.shell(serial, &command).await {
            Ok(output) => is_icmp_success(&output),
            Err(e) => {
                error!(serial, "failed to run ping command on device: {e:#}");
                false
            }
        }
    }

    /// Ping `host` once from this machine
    pub async fn ping_icmp(&self, host: &str) -> bool {
        let Some(args) = host_ping_args(host) else {
            debug!(host, "refusing to pass host that looks like an option to ping");
            return false;
        };

        let child = Command::new("ping")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                debug!(host, "failed to spawn ping: {e}");
                return false;
            }
        };

        let output = match tokio::time::timeout(HOST_PING_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(host, "failed to run ping: {e}");
                return false;
            }
            Err(_) => {
                debug!(host, "ping timed out");
                return false;
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        is_icmp_success(&combined)
    }

    /// Issue a GET to `scheme://host`; any response counts
    pub async fn ping_http(&self, host: &str, use_https: bool) -> bool {
        let scheme = if use_https { "https" } else { "http" };
        let url = format!("{scheme}://{host}");

        match self.client.get(&url).send().await {
            Ok(response) => {
                debug!(%url, status = %response.status(), "http probe answered");
                true
            }
            Err(e) => {
                debug!(%url, "http probe failed: {e}");
                false
            }
        }
    }

    /// Complete a WebSocket handshake with `ws://host`
    pub async fn ping_websocket(&self, host: &str) -> bool {
        let url = format!("ws://{host}");

        match tokio::time::timeout(CLIENT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str())).await {
            Ok(Ok((mut stream, _))) => {
                if let Err(e) = stream.close(None).await {
                    debug!(%url, "failed to close websocket: {e}");
                }
                true
            }
            Ok(Err(e)) => {
                debug!(%url, "websocket handshake failed: {e}");
                false
            }
            Err(_) => {
                debug!(%url, "websocket handshake timed out");
                false
            }
        }
    }
}

#[async_trait]
impl Prober for Pinger {
    #[instrument(skip(self, task), fields(serial = %task.serial, method = task.method.as_str()))]
    async fn probe(&self, task: &MonitoringTask) -> bool {
        match task.method {
            MonitoringMethod::PingByDevice => self.ping_by_device(&task.serial, &task.host).await,
            MonitoringMethod::Icmp => self.ping_icmp(&task.host).await,
            MonitoringMethod::Http => self.ping_http(&task.host, false).await,
            MonitoringMethod::Https => self.ping_http(&task.host, true).await,
            MonitoringMethod::WebSocket => self.ping_websocket(&task.host).await,
        }
    }
}

/// Classify textual ping output
///
/// Case-insensitive substring match against [`ICMP_SUCCESS_PATTERNS`].
pub fn is_icmp_success(output: &str) -> bool {
    if output.is_empty() {
        return false;
    }

    let lower = output.to_lowercase();
    ICMP_SUCCESS_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Arguments for one local `ping` of `host`
///
/// Unix pings get `--` ahead of the host. Windows `ping` has no such marker,
/// so a host starting with `-` yields `None` there.
fn host_ping_args(host: &str) -> Option<Vec<&str>> {
    if cfg!(target_os = "windows") {
        if host.starts_with('-') {
            return None;
        }
        Some(vec!["-n", "1", "-w", "5000", host])
    } else if cfg!(target_os = "macos") {
        Some(vec!["-c", "1", "-W", "5000", "--", host])
    } else {
        Some(vec!["-c", "1", "-W", "5", "--", host])
    }
}

/// Quote `arg` as a single word for a POSIX shell
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
