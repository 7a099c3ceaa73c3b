//! Monitoring task endpoints

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
        types::ApiResponse,
    },
    model::{MonitoringLog, MonitoringStatus, MonitoringTask, MonitoringTaskRequest},
};

/// Entries returned by the logs endpoint when `limit` is absent or invalid
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Query parameters for the logs endpoint
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Max entries, newest last (default: 100)
    limit: Option<String>,
}

impl LogsQuery {
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_LOG_LIMIT)
    }
}

fn parse_request(
    body: Result<Json<MonitoringTaskRequest>, JsonRejection>,
) -> ApiResult<MonitoringTaskRequest> {
    let Json(request) = body.map_err(|e| {
        debug!("failed to read request body: {e}");
        ApiError::InvalidRequest("Invalid request body".to_string())
    })?;
    request.validate()?;
    Ok(request)
}

/// GET /api/monitoring
pub async fn list_tasks(State(state): State<ApiState>) -> Json<ApiResponse<Vec<MonitoringTask>>> {
    let tasks = state.service.get_all().await;
    Json(ApiResponse::ok("Monitoring tasks retrieved successfully", tasks))
}

/// POST /api/devices/:serial/monitoring
pub async fn create_task(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
    body: Result<Json<MonitoringTaskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<MonitoringTask>>)> {
    let request = parse_request(body)?;
    let task = MonitoringTask::from_request(serial, request);

    let created = state.service.create(task).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Monitoring task created successfully", created)),
    ))
}

/// GET /api/devices/:serial/monitoring
pub async fn get_task(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> ApiResult<Json<ApiResponse<MonitoringTask>>> {
    let task = state.service.get_config(&serial).await?;
    Ok(Json(ApiResponse::ok(
        "Monitoring config retrieved successfully",
        task,
    )))
}

/// PUT /api/devices/:serial/monitoring
pub async fn update_task(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
    body: Result<Json<MonitoringTaskRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<MonitoringTask>>> {
    let request = parse_request(body)?;
    let task = state.service.update_config(&serial, request).await?;
    Ok(Json(ApiResponse::ok(
        "Monitoring config updated successfully",
        task,
    )))
}

/// DELETE /api/devices/:serial/monitoring
pub async fn delete_task(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.service.delete(&serial).await?;
    Ok(Json(ApiResponse::message("Monitoring deleted successfully")))
}

/// POST /api/devices/:serial/monitoring/start
pub async fn start_task(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.service.start(&serial).await?;
    Ok(Json(ApiResponse::message("Monitoring started successfully")))
}

/// POST /api/devices/:serial/monitoring/stop
pub async fn stop_task(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.service.stop(&serial).await?;
    Ok(Json(ApiResponse::message("Monitoring stopped successfully")))
}

/// GET /api/devices/:serial/monitoring/status
pub async fn get_status(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> ApiResult<Json<ApiResponse<MonitoringStatus>>> {
    let status = state.service.get_status(&serial).await?;
    Ok(Json(ApiResponse::ok(
        "Monitoring status retrieved successfully",
        status,
    )))
}

/// GET /api/devices/:serial/monitoring/logs
pub async fn get_logs(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Json<ApiResponse<Vec<MonitoringLog>>> {
    let logs = state.service.get_logs(&serial, query.limit()).await;
    Json(ApiResponse::ok("Monitoring logs retrieved successfully", logs))
}

/// DELETE /api/devices/:serial/monitoring/logs
pub async fn clear_logs(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.service.clear_logs(&serial).await?;
    Ok(Json(ApiResponse::message(
        "Monitoring logs cleared successfully",
    )))
}
