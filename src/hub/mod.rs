// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Communication with the hub.
//!
//! All endpoints live under `{hub_url}/v2/{client_id}/{env}`:
//!
//! | Method | Endpoint       | Body                         |
//! |--------|----------------|------------------------------|
//! | POST   | `/startup`     | [`StartupPayload`] (JSON)    |
//! | POST   | `/sync`        | [`SyncPayload`] (JSON)       |
//! | POST   | `/log?uuid=..` | gzip NDJSON request log file |
//! | GET    | `/keys`        | [`KeySet`](crate::keys::KeySet) (JSON) |

pub mod payloads;
pub mod retry;
pub mod transport;

pub use payloads::{StartupPayload, SyncPayload};
pub use retry::{retry, retry_when, RetryConfig};
pub use transport::{HubClient, HubTransport};

#[cfg(test)]
pub use transport::MockHubTransport;
