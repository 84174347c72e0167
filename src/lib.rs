// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! apiscope - in-process API telemetry agent.
//!
//! Web framework adapters feed every handled request into the agent. It
//! aggregates request counts, response times, server errors and API consumers
//! in memory, optionally keeps a redacted and compressed request log, and
//! periodically ships everything to the hub in the background.
//!
//! # Architecture
//!
//! - [`types`] - Request, response and error descriptions supplied by adapters
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and environment overrides
//! - [`counters`] - Request and server error aggregation
//! - [`consumers`] - API consumer registry
//! - [`keys`] - Hashed API key lookup
//! - [`capture`] - Per-request application log capture
//! - [`request_log`] - Redacted request logging with gzip rotation
//! - [`hub`] - Hub payloads, transport and retry policy
//! - [`client`] - Process-wide client and sync engine
//! - [`logging`] - Subscriber setup for hosts
//!
//! # Example
//!
//! ```rust,ignore
//! use apiscope::{AgentConfig, Client, Observation, RequestInfo, ResponseInfo};
//!
//! let client = Client::init(AgentConfig::new(client_id, "prod"));
//!
//! let request = RequestInfo::new("GET", "https://api.example.com/items/1")
//!     .with_path("/items/{id}");
//! let response = ResponseInfo::new(200, 0.012);
//! client.observe(Observation::new(request, response));
//! ```

pub mod capture;
pub mod client;
pub mod config;
pub mod consumers;
pub mod counters;
pub mod error;
pub mod hub;
pub mod keys;
pub mod logging;
pub mod request_log;
pub mod types;

// Re-export commonly used types at crate root
pub use capture::{CaptureLayer, LogRecord};
pub use client::{Client, Observation, SyncEngine, TickReport};
pub use config::{load_config, AgentConfig, RequestLoggingConfig, SyncConfig};
pub use consumers::{Consumer, ConsumerRegistry};
pub use counters::{RequestCounter, ServerErrorCounter};
pub use error::{ConfigError, HubError, LogFileError};
pub use hub::{HubClient, HubTransport};
pub use keys::{KeyInfo, KeyRegistry, KeySet};
pub use request_log::RequestLogger;
pub use types::{Header, PathInfo, RequestInfo, ResponseInfo, ServerError, StartupData};

/// Agent version, reported to the hub.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
