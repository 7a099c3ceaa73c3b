//! API shared state

use std::sync::Arc;

use crate::monitoring::MonitoringService;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<MonitoringService>,
}

impl ApiState {
    pub fn new(service: Arc<MonitoringService>) -> Self {
        Self { service }
    }
}
