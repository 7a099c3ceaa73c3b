pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod model;
pub mod monitoring;
pub mod util;

pub use error::{MonitoringError, MonitoringResult};
pub use model::{MonitoringLog, MonitoringMethod, MonitoringStatus, MonitoringTask, MonitoringTaskRequest};
pub use monitoring::MonitoringService;
