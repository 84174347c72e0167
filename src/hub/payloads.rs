// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON bodies sent to the hub.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consumers::Consumer;
use crate::counters::{RequestCounts, ServerErrorCounts};
use crate::types::{PathInfo, StartupData};

/// One-time handshake describing the instrumented application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupPayload {
    pub instance_uuid: Uuid,
    pub message_uuid: Uuid,
    pub paths: Vec<PathInfo>,
    pub versions: BTreeMap<String, String>,
    pub client: String,
}

impl StartupPayload {
    /// Build the handshake for this instance.
    ///
    /// The agent version and, when known, the application version are added
    /// to the reported component versions.
    pub fn new(instance_uuid: Uuid, data: StartupData, app_version: Option<&str>) -> Self {
        let mut versions = data.versions;
        versions
            .entry("apiscope".to_string())
            .or_insert_with(|| crate::VERSION.to_string());
        if let Some(version) = app_version {
            versions
                .entry("app".to_string())
                .or_insert_with(|| version.to_string());
        }

        Self {
            instance_uuid,
            message_uuid: Uuid::new_v4(),
            paths: data.paths,
            versions,
            client: data.client,
        }
    }
}

/// Drained counters of one sync tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub timestamp: DateTime<Utc>,
    pub instance_uuid: Uuid,
    pub message_uuid: Uuid,
    pub requests: Vec<RequestCounts>,
    pub server_errors: Vec<ServerErrorCounts>,
    pub consumers: Vec<Consumer>,
}

impl SyncPayload {
    pub fn new(
        instance_uuid: Uuid,
        requests: Vec<RequestCounts>,
        server_errors: Vec<ServerErrorCounts>,
        consumers: Vec<Consumer>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            instance_uuid,
            message_uuid: Uuid::new_v4(),
            requests,
            server_errors,
            consumers,
        }
    }

    /// Nothing to send.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.server_errors.is_empty() && self.consumers.is_empty()
    }
}
