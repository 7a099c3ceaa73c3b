//! REST and Server-Sent-Events transport for the monitoring subsystem
//!
//! ## Architecture
//!
//! - **Axum** router with Tower HTTP tracing and CORS layers
//! - **MonitoringService** facade shared through [`ApiState`]
//! - **SSE** stream fed by the activity log listener
//!
//! ## Endpoints
//!
//! - `GET    /api/health/ping` - Liveness
//! - `GET    /api/monitoring` - Every monitoring task
//! - `POST   /api/devices/:serial/monitoring` - Create a task
//! - `GET    /api/devices/:serial/monitoring` - Task configuration
//! - `PUT    /api/devices/:serial/monitoring` - Update a task
//! - `DELETE /api/devices/:serial/monitoring` - Delete a task
//! - `POST   /api/devices/:serial/monitoring/start` - Start monitoring
//! - `POST   /api/devices/:serial/monitoring/stop` - Stop monitoring
//! - `GET    /api/devices/:serial/monitoring/status` - Live status
//! - `GET    /api/devices/:serial/monitoring/logs?limit=N` - Recent activity
//! - `DELETE /api/devices/:serial/monitoring/logs` - Clear activity
//! - `GET    /event/devices/:serial/monitoring/logs` - Live activity stream

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod sse;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{ApiResponse, HealthResponse};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:49153")
    pub bind_addr: SocketAddr,

    /// Enable permissive CORS for browser clients
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: crate::util::get_bind_addr(),
            enable_cors: true,
        }
    }
}

impl From<Option<crate::config::ApiSettings>> for ApiConfig {
    fn from(settings: Option<crate::config::ApiSettings>) -> Self {
        let defaults = ApiConfig::default();
        match settings {
            Some(settings) => Self {
                bind_addr: settings.bind_addr.unwrap_or(defaults.bind_addr),
                enable_cors: settings.enable_cors,
            },
            None => defaults,
        }
    }
}

/// Build the router with every monitoring route
#[cfg(feature = "api")]
pub fn router(state: ApiState) -> Router {
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/health/ping", get(routes::health::ping))
        .route("/api/monitoring", get(routes::monitoring::list_tasks))
        .route(
            "/api/devices/:serial/monitoring",
            post(routes::monitoring::create_task)
                .get(routes::monitoring::get_task)
                .put(routes::monitoring::update_task)
                .delete(routes::monitoring::delete_task),
        )
        .route(
            "/api/devices/:serial/monitoring/start",
            post(routes::monitoring::start_task),
        )
        .route(
            "/api/devices/:serial/monitoring/stop",
            post(routes::monitoring::stop_task),
        )
        .route(
            "/api/devices/:serial/monitoring/status",
            get(routes::monitoring::get_status),
        )
        .route(
            "/api/devices/:serial/monitoring/logs",
            get(routes::monitoring::get_logs).delete(routes::monitoring::clear_logs),
        )
        .route(
            "/event/devices/:serial/monitoring/logs",
            get(sse::monitoring_log_events),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};

    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
