// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client lifecycle and sync tests against a recording transport.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use apiscope::request_log::RequestLogEntry;
use apiscope::{
    Client, Consumer, HubError, KeyInfo, KeySet, Observation, PathInfo, RequestInfo, ResponseInfo,
    ServerError,
};
use common::RecordingTransport;

/// Poll `condition` until it holds or a second has passed.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn observation(path: &str, status: u16) -> Observation {
    let request = RequestInfo::new("GET", format!("https://api.example.com{}", path)).with_path(path);
    let response = ResponseInfo::new(status, 0.05).with_size(12);
    Observation::new(request, response)
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn test_sync_ships_counters_consumers_and_logs() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(RecordingTransport::new().with_keys(KeySet::new("salt")));
    let client = Client::with_transport(common::config(temp.path()), transport.clone());
    assert!(client.is_enabled());

    let alice = Consumer::from_identifier("alice").map(|c| c.with_name("Alice"));
    for _ in 0..3 {
        client.observe(observation("/items", 200).with_consumer(alice.clone()));
    }
    client.observe(
        observation("/items", 500).with_error(ServerError::new("Panic", "boom", "at handler")),
    );

    let report = client.sync_now().await;
    assert!(report.counters_sent);
    assert_eq!(report.files_sent, 1);

    let payload = transport.syncs.lock().unwrap()[0].clone();
    assert_eq!(payload.instance_uuid, client.instance_uuid().unwrap());
    let ok = payload
        .requests
        .iter()
        .find(|r| r.status_code == 200)
        .expect("200 bucket");
    assert_eq!(ok.request_count, 3);
    assert_eq!(ok.consumer.as_deref(), Some("alice"));
    assert_eq!(ok.response_size_sum, 36);
    assert_eq!(payload.server_errors.len(), 1);
    assert_eq!(payload.server_errors[0].error_type, "Panic");
    assert_eq!(payload.consumers, vec![alice.unwrap()]);

    let (uuid, body) = transport.logs.lock().unwrap()[0].clone();
    let lines = common::gunzip_lines(&body);
    assert_eq!(lines.len(), 4);
    let entry: RequestLogEntry = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(entry.request.consumer.as_deref(), Some("alice"));
    assert!(!uuid.is_empty());

    // Everything was drained by the first tick.
    let report = client.sync_now().await;
    assert!(!report.counters_sent);
    assert_eq!(report.files_sent, 0);
    assert_eq!(transport.sync_count(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_failed_log_upload_is_retried_next_tick() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(RecordingTransport::new().with_keys(KeySet::new("salt")));
    let client = Client::with_transport(common::config(temp.path()), transport.clone());

    client.observe(observation("/items", 200));
    transport.fail_next_log(HubError::api("unavailable", 503));

    let report = client.sync_now().await;
    assert!(report.files_failed);
    assert_eq!(report.files_sent, 0);
    assert_eq!(client.engine().unwrap().logger().pending_files(), 1);

    let report = client.sync_now().await;
    assert!(!report.files_failed);
    assert_eq!(report.files_sent, 1);
    assert_eq!(transport.log_count(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_payment_required_suspends_request_logging() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(RecordingTransport::new().with_keys(KeySet::new("salt")));
    let client = Client::with_transport(common::config(temp.path()), transport.clone());

    client.observe(observation("/items", 200));
    transport.fail_next_log(HubError::PaymentRequired);
    client.sync_now().await;

    let logger = client.engine().unwrap().logger();
    assert!(logger.is_suspended());
    assert_eq!(logger.pending_files(), 0);

    // Counters keep flowing while logging is suspended.
    client.observe(observation("/items", 200));
    assert_eq!(logger.active_entries(), 0);
    let report = client.sync_now().await;
    assert!(report.counters_sent);
    assert_eq!(transport.log_count(), 0);

    client.shutdown().await;
}

#[tokio::test]
async fn test_interrupted_upload_keeps_file_queued() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(
        RecordingTransport::new()
            .with_keys(KeySet::new("salt"))
            .with_log_delay(Duration::from_secs(3600)),
    );
    let client = Client::with_transport(common::config(temp.path()), transport.clone());

    client.observe(observation("/items", 200));
    let tick = tokio::time::timeout(Duration::from_millis(50), client.sync_now()).await;
    assert!(tick.is_err());

    let logger = client.engine().unwrap().logger();
    assert_eq!(logger.pending_files(), 1);
    let file = logger.get_file().unwrap();
    assert_eq!(file.attempts, 0);
    assert!(file.exists());
    logger.requeue_file(file);

    client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_leaves_no_files_behind() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(
        RecordingTransport::new()
            .with_keys(KeySet::new("salt"))
            .with_log_delay(Duration::from_secs(3600)),
    );
    let client = Client::with_transport(common::config(temp.path()), transport.clone());

    client.observe(observation("/items", 200));
    client.observe(observation("/items/1", 404));
    client.shutdown().await;

    let logger = client.engine().unwrap().logger();
    assert!(logger.is_closed());
    assert_eq!(logger.pending_files(), 0);
    assert!(!logger.spool_dir().exists());
    assert_eq!(transport.log_count(), 0);
    assert_eq!(std::fs::read_dir(temp.path().join("apiscope")).unwrap().count(), 0);
}

// ============================================================================
// Startup and keys
// ============================================================================

#[tokio::test]
async fn test_startup_waits_for_data() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(RecordingTransport::new().with_keys(KeySet::new("salt")));
    let config = common::config(temp.path()).with_app_version("2.4.1");
    let client = Client::with_transport(config, transport.clone());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.startup_count(), 0);

    let paths = vec![PathInfo::new("get", "/items"), PathInfo::new("POST", "/items")];
    let versions = BTreeMap::from([("axum".to_string(), "0.7.5".to_string())]);
    client.set_startup_data(paths.clone(), versions, "rust:axum");

    assert!(eventually(|| transport.startup_count() == 1).await);
    assert!(eventually(|| client.engine().unwrap().is_started()).await);

    let payload = transport.startups.lock().unwrap()[0].clone();
    assert_eq!(payload.paths, paths);
    assert_eq!(payload.client, "rust:axum");
    assert_eq!(payload.versions.get("axum").map(String::as_str), Some("0.7.5"));
    assert_eq!(payload.versions.get("app").map(String::as_str), Some("2.4.1"));
    assert!(payload.versions.contains_key("apiscope"));

    client.shutdown().await;
}

#[tokio::test]
async fn test_keys_are_available_after_refresh() {
    let temp = TempDir::new().unwrap();
    let key_set = KeySet::new("pepper").with_raw_key(
        "raw-key-1",
        KeyInfo::new("key-1").with_name("CI").with_scopes(["read", "write"]),
    );
    let transport = Arc::new(RecordingTransport::new().with_keys(key_set));
    let client = Client::with_transport(common::config(temp.path()), transport);

    assert!(eventually(|| client.lookup_key("raw-key-1").is_some()).await);
    let info = client.lookup_key("raw-key-1").unwrap();
    assert_eq!(info.key_id, "key-1");
    assert!(info.has_scopes(&["read"]));
    assert!(!info.has_scope("admin"));
    assert!(client.lookup_key("raw-key-2").is_none());

    client.shutdown().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_singleton_lifecycle() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(RecordingTransport::new().with_keys(KeySet::new("salt")));

    let client = Client::init_with_transport(common::config(temp.path()), transport.clone());
    let again = Client::init_with_transport(common::config(temp.path()), transport.clone());
    assert!(Arc::ptr_eq(&client, &again));
    assert!(Arc::ptr_eq(&client, &Client::get().unwrap()));

    client.observe(observation("/items", 200));
    client.shutdown().await;

    assert!(Client::get().is_none());
    assert_eq!(transport.sync_count(), 1);
    assert_eq!(transport.log_count(), 1);
    assert!(client.engine().unwrap().logger().is_closed());

    // A second shutdown is a no-op.
    client.shutdown().await;
    assert_eq!(transport.sync_count(), 1);

    // The slot is free again and can be reset explicitly.
    let replacement = Client::init_with_transport(common::config(temp.path()), transport.clone());
    assert!(!Arc::ptr_eq(&replacement, &client));
    let taken = Client::reset_instance().unwrap();
    assert!(Arc::ptr_eq(&taken, &replacement));
    assert!(Client::get().is_none());
    replacement.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_disables_client() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let mut config = common::config(temp.path());
    config.client_id = "not-a-uuid".to_string();

    let client = Client::with_transport(config, transport.clone());
    assert!(!client.is_enabled());
    client.observe(observation("/items", 200));
    let report = client.sync_now().await;
    assert!(!report.counters_sent);
    client.shutdown().await;
    assert_eq!(transport.sync_count(), 0);
}
