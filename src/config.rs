use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::trace;

/// Top-level application configuration
///
/// Every section is optional in the file; missing values fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub adb: AdbConfig,

    /// API server configuration (optional - defaults to env/`util` values)
    pub api: Option<ApiSettings>,
}

/// Where the monitoring subsystem keeps its state
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    /// JSON file holding every monitoring task
    #[serde(default = "default_task_file")]
    pub task_file: PathBuf,

    /// Directory holding one `<serial>.log` file per device
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            task_file: default_task_file(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_task_file() -> PathBuf {
    PathBuf::from("andromodem_monitoring_config.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("andromodem_logs/monitoring")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AdbConfig {
    /// adb executable (looked up on PATH unless absolute)
    #[serde(default = "default_adb_program")]
    pub program: String,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            program: default_adb_program(),
        }
    }
}

fn default_adb_program() -> String {
    String::from("adb")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    pub bind_addr: Option<SocketAddr>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
