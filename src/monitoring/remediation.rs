//! Airplane-mode recovery cycle

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, instrument};

use crate::device::NetworkControl;

use super::log_store::ActivityLogStore;

/// Cycles airplane mode on and back off to force a fresh radio attach
///
/// A single attempt only; retry policy belongs to the worker.
pub struct RemediationActuator {
    network: Arc<dyn NetworkControl>,
    logs: Arc<ActivityLogStore>,
}

impl RemediationActuator {
    pub fn new(network: Arc<dyn NetworkControl>, logs: Arc<ActivityLogStore>) -> Self {
        Self { network, logs }
    }

    /// Enable airplane mode, wait `delay_secs`, then disable it again
    ///
    /// If the first toggle leaves airplane mode disabled (it was already on),
    /// the cycle ends there.
    #[instrument(skip(self))]
    pub async fn perform_restart_action(&self, serial: &str, delay_secs: i64) -> Result<()> {
        info!("performing restart action");

        let enabled = match self.network.toggle_airplane_mode(serial).await {
            Ok(enabled) => enabled,
            Err(e) => {
                error!("failed to toggle airplane mode: {e:#}");
                self.logs
                    .write(serial, false, "Failed to enable airplane mode during restart action")
                    .await;
                return Err(e);
            }
        };

        if !enabled {
            return Ok(());
        }

        self.logs
            .write(serial, true, "Success enable airplane mode")
            .await;

        if delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(delay_secs as u64)).await;
        }

        match self.network.toggle_airplane_mode(serial).await {
            Ok(false) => {
                self.logs
                    .write(serial, true, "Success disable airplane mode")
                    .await;
                Ok(())
            }
            Ok(true) => Ok(()),
            Err(e) => {
                error!("failed to toggle airplane mode: {e:#}");
                self.logs
                    .write(serial, false, "Failed to disable airplane mode during restart action")
                    .await;
                Err(e)
            }
        }
    }
}
