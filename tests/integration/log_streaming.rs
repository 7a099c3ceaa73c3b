//! Live activity fan-out through the service facade

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use modemwatch::{MonitoringError, MonitoringLog, MonitoringMethod, MonitoringService};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

fn spawn_listener(
    service: Arc<MonitoringService>,
    serial: &str,
    token: CancellationToken,
) -> (mpsc::UnboundedReceiver<MonitoringLog>, JoinHandle<anyhow::Result<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let serial = serial.to_string();
    let handle = tokio::spawn(async move {
        service
            .listen_logs(token, &serial, move |log| {
                tx.send(log)?;
                Ok(())
            })
            .await
    });
    (rx, handle)
}

#[tokio::test(start_paused = true)]
async fn test_listener_replays_history_then_streams_live() {
    let h = Harness::new(ScriptedProber::always(true));
    h.service
        .create(task("ABC123", request(MonitoringMethod::Http, 3, 5, 0)))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let (mut rx, handle) = spawn_listener(h.service.clone(), "ABC123", token.clone());

    let replayed = rx.recv().await.unwrap();
    assert_eq!(replayed.message, "Monitoring task started");
    assert!(replayed.success);

    tokio::time::sleep(Duration::from_secs(6)).await;

    let live = rx.recv().await.unwrap();
    assert_eq!(live.serial, "ABC123");
    assert_eq!(live.message, "Ping to 8.8.8.8 success using HTTP method");

    token.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_listener_only_sees_its_own_serial() {
    let h = Harness::new(ScriptedProber::always(true));
    h.service
        .create(task("A", request(MonitoringMethod::Icmp, 3, 5, 0)))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let (mut rx, handle) = spawn_listener(h.service.clone(), "B", token.clone());

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(rx.try_recv().is_err());

    token.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_shutdown_ends_listeners() {
    let h = Harness::new(ScriptedProber::always(true));
    h.service
        .create(task("ABC123", request(MonitoringMethod::Icmp, 3, 60, 0)))
        .await
        .unwrap();

    let (mut rx, handle) =
        spawn_listener(h.service.clone(), "ABC123", CancellationToken::new());
    assert!(rx.recv().await.is_some());

    h.service.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_logs_limit_and_clear() {
    let h = Harness::new(ScriptedProber::always(true));
    h.service
        .create(task("ABC123", request(MonitoringMethod::Icmp, 3, 60, 0)))
        .await
        .unwrap();
    h.service.stop("ABC123").await.unwrap();
    h.service.start("ABC123").await.unwrap();

    let newest = h.service.get_logs("ABC123", 2).await;
    let messages: Vec<_> = newest.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages, vec!["Monitoring task stopped", "Monitoring task started"]);

    h.service.clear_logs("ABC123").await.unwrap();
    assert!(h.service.get_logs("ABC123", 0).await.is_empty());

    assert_matches!(
        h.service.clear_logs("UNKNOWN").await,
        Err(MonitoringError::TaskNotFound(_))
    );
}
