//! Server-Sent-Events handler for live activity streaming

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::state::ApiState;

/// Events buffered between the log listener and a slow HTTP client
const STREAM_BUFFER: usize = 32;

/// GET /event/devices/:serial/monitoring/logs
///
/// Replays the buffered activity of `serial`, then pushes every new entry as
/// a `data:` frame holding the JSON log record.
pub async fn monitoring_log_events(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(serial, "log stream client connected");

    let (tx, rx) = mpsc::channel::<String>(STREAM_BUFFER);
    let token = CancellationToken::new();

    {
        let token = token.clone();
        let serial = serial.clone();
        tokio::spawn(async move {
            let result = state
                .service
                .listen_logs(token, &serial, move |log| {
                    let data = serde_json::to_string(&log)?;
                    match tx.try_send(data) {
                        Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
                        Err(TrySendError::Closed(_)) => {
                            Err(anyhow::anyhow!("log stream client disconnected"))
                        }
                    }
                })
                .await;

            if let Err(e) = result {
                debug!(serial, "log listener stopped: {e}");
            }
        });
    }

    // Dropping the response stream cancels the listener through the guard.
    let guard = token.drop_guard();
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let data = rx.recv().await?;
        Some((Ok::<_, Infallible>(Event::default().data(data)), (rx, guard)))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
