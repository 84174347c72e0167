// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;

use apiscope::config::{AgentConfig, RequestLoggingConfig, SyncConfig};
use apiscope::hub::{StartupPayload, SyncPayload};
use apiscope::{HubError, HubTransport, KeySet};

pub const CLIENT_ID: &str = "76b5cb91-a0a4-4ea0-a894-57d2b9fcb2c9";

/// Agent config with request logging into `spool` and background loops idle.
pub fn config(spool: &std::path::Path) -> AgentConfig {
    let mut config = AgentConfig::new(CLIENT_ID, "test")
        .with_request_logging(RequestLoggingConfig::verbose().with_spool_dir(spool));
    config.sync = SyncConfig {
        sync_interval_secs: 3600,
        initial_sync_interval_secs: 3600,
        key_refresh_interval_secs: 3600,
        ..SyncConfig::fast()
    };
    config
}

/// Decompress a gzip body into its NDJSON lines.
pub fn gunzip_lines(body: &[u8]) -> Vec<String> {
    let mut text = String::new();
    GzDecoder::new(body)
        .read_to_string(&mut text)
        .expect("valid gzip");
    text.lines().map(str::to_string).collect()
}

/// Transport that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    pub startups: Mutex<Vec<StartupPayload>>,
    pub syncs: Mutex<Vec<SyncPayload>>,
    pub logs: Mutex<Vec<(String, Vec<u8>)>>,
    pub key_set: Mutex<Option<KeySet>>,
    /// Errors returned by upcoming `send_log` calls, in order.
    pub log_failures: Mutex<VecDeque<HubError>>,
    /// Time each `send_log` call hangs before answering.
    pub log_delay: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(self, key_set: KeySet) -> Self {
        *self.key_set.lock().unwrap() = Some(key_set);
        self
    }

    pub fn with_log_delay(self, delay: Duration) -> Self {
        *self.log_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fail_next_log(&self, error: HubError) {
        self.log_failures.lock().unwrap().push_back(error);
    }

    pub fn startup_count(&self) -> usize {
        self.startups.lock().unwrap().len()
    }

    pub fn sync_count(&self) -> usize {
        self.syncs.lock().unwrap().len()
    }

    pub fn log_count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }
}

#[async_trait]
impl HubTransport for RecordingTransport {
    async fn send_startup(&self, payload: &StartupPayload) -> Result<(), HubError> {
        self.startups.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn send_sync(&self, payload: &SyncPayload) -> Result<(), HubError> {
        self.syncs.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn send_log(&self, uuid: &str, body: Vec<u8>) -> Result<(), HubError> {
        let delay = *self.log_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.log_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.logs.lock().unwrap().push((uuid.to_string(), body));
        Ok(())
    }

    async fn fetch_keys(&self) -> Result<KeySet, HubError> {
        self.key_set
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| HubError::api("no keys configured", 404))
    }
}
