//! Persistence across restarts and self-healing of the task file

use modemwatch::MonitoringMethod;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::*;

fn task_file(h: &Harness) -> std::path::PathBuf {
    h.dir.path().join("andromodem_monitoring_config.json")
}

#[tokio::test]
async fn test_active_tasks_resume_after_restart() {
    let h = Harness::new(ScriptedProber::always(true));

    h.service
        .create(task("RUNNING", request(MonitoringMethod::Icmp, 3, 5, 0)))
        .await
        .unwrap();
    h.service
        .create(task("STOPPED", request(MonitoringMethod::Http, 3, 5, 0)))
        .await
        .unwrap();
    h.service.stop("STOPPED").await.unwrap();

    let h = h.restart(ScriptedProber::always(true)).await;

    let on_disk = h.persisted_tasks();
    assert_eq!(on_disk.len(), 2);
    assert!(on_disk.iter().find(|t| t.serial == "RUNNING").unwrap().is_active);

    h.service.bootstrap().await;

    assert!(h.service.get_status("RUNNING").await.unwrap().is_running);
    assert!(h.service.get_status("STOPPED").await.is_err());
    assert_eq!(h.service.get_all().await.len(), 2);

    let messages = h.messages("RUNNING").await;
    assert_eq!(
        messages.last().unwrap(),
        "Monitoring task automatically started on application startup"
    );
    assert_eq!(messages.first().unwrap(), "Monitoring task started");
}

#[tokio::test]
async fn test_malformed_config_boots_empty_with_backup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("andromodem_monitoring_config.json"),
        "[{\"serial\": \"ABC123\",",
    )
    .unwrap();

    let h = Harness::in_dir(dir, ScriptedProber::always(true));
    h.service.bootstrap().await;

    assert!(h.service.get_all().await.is_empty());
    assert!(!task_file(&h).exists());

    let backups = std::fs::read_dir(h.dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("andromodem_monitoring_config.json.corrupted.")
        })
        .count();
    assert_eq!(backups, 1);
}

#[tokio::test]
async fn test_mostly_invalid_config_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let good = serde_json::to_value(task("GOOD", request(MonitoringMethod::Icmp, 3, 5, 0))).unwrap();
    let mut bad_failures = good.clone();
    bad_failures["serial"] = json!("BAD1");
    bad_failures["max_failures"] = json!(0);
    let mut bad_interval = good.clone();
    bad_interval["serial"] = json!("BAD2");
    bad_interval["checking_interval"] = json!(-1);

    std::fs::write(
        dir.path().join("andromodem_monitoring_config.json"),
        json!([good, bad_failures, bad_interval]).to_string(),
    )
    .unwrap();

    let h = Harness::in_dir(dir, ScriptedProber::always(true));
    h.service.bootstrap().await;

    assert!(h.service.get_all().await.is_empty());
    assert!(!task_file(&h).exists());
}

#[tokio::test]
async fn test_minority_invalid_config_is_salvaged() {
    let dir = tempfile::tempdir().unwrap();
    let mut good = serde_json::to_value(task("GOOD", request(MonitoringMethod::Icmp, 3, 5, 0))).unwrap();
    good["is_active"] = json!(false);
    let mut other = good.clone();
    other["serial"] = json!("OTHER");
    let mut bad = good.clone();
    bad["serial"] = json!("BAD");
    bad["host"] = json!("");

    std::fs::write(
        dir.path().join("andromodem_monitoring_config.json"),
        json!([good, other, bad]).to_string(),
    )
    .unwrap();

    let h = Harness::in_dir(dir, ScriptedProber::always(true));
    h.service.bootstrap().await;

    let serials: Vec<_> = h
        .service
        .get_all()
        .await
        .into_iter()
        .map(|t| t.serial)
        .collect();
    assert_eq!(serials, vec!["GOOD", "OTHER"]);
    assert_eq!(h.persisted_tasks().len(), 2);
    assert!(h.service.get_status("GOOD").await.is_err());
}

#[tokio::test]
async fn test_activity_history_survives_restart() {
    let h = Harness::new(ScriptedProber::always(true));

    h.service
        .create(task("ABC123", request(MonitoringMethod::Icmp, 3, 5, 0)))
        .await
        .unwrap();
    h.service.stop("ABC123").await.unwrap();

    let h = h.restart(ScriptedProber::always(true)).await;
    h.service.bootstrap().await;
    h.service.start("ABC123").await.unwrap();

    assert_eq!(
        h.messages("ABC123").await,
        vec![
            "Monitoring task started",
            "Monitoring task stopped",
            "Monitoring task started",
        ]
    );
}
