//! Connectivity monitoring with automatic remediation
//!
//! ## Component Overview
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │  MonitoringService   │  (facade)
//!                 └──────────┬───────────┘
//!          ┌─────────────────┼──────────────────┐
//!          │                 │                  │
//!   ┌──────▼──────┐   ┌──────▼───────┐   ┌──────▼──────────┐
//!   │TaskRegistry │   │ ConfigStore  │   │WorkerOrchestrator│
//!   └─────────────┘   └──────────────┘   └──────┬──────────┘
//!                                               │ one loop per task
//!                       ┌───────────────────────┼──────────────────┐
//!                       │                       │                  │
//!                ┌──────▼──────┐    ┌───────────▼────────┐  ┌──────▼─────────┐
//!                │   Prober    │    │RemediationActuator │  │ActivityLogStore│
//!                └─────────────┘    └────────────────────┘  └────────────────┘
//! ```
//!
//! ## Ownership
//!
//! - **TaskRegistry** is the only writer of task definitions
//! - **ConfigStore** reads and writes snapshots of the whole set
//! - **WorkerOrchestrator** owns live status and produces activity events
//! - **ActivityLogStore** keeps the newest 100 events per device and streams
//!   new ones to listeners

pub mod config_store;
pub mod log_store;
pub mod probe;
pub mod registry;
pub mod remediation;
pub mod service;
pub mod worker;

pub use config_store::ConfigStore;
pub use log_store::ActivityLogStore;
pub use probe::{Pinger, Prober, is_icmp_success};
pub use registry::TaskRegistry;
pub use remediation::RemediationActuator;
pub use service::MonitoringService;
pub use worker::WorkerOrchestrator;
