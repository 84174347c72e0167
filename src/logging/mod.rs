// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging setup for applications embedding the agent.
//!
//! The agent itself only emits `tracing` events under the `apiscope` target.
//! Hosts that do not install their own subscriber can use [`init_logging`]:
//!
//! ```rust,ignore
//! use apiscope::logging::{init_logging, LoggingConfig};
//!
//! let _guard = init_logging(&LoggingConfig::production())?;
//! ```
//!
//! With `capture_request_logs` enabled the [`crate::capture::CaptureLayer`] is
//! installed alongside the formatter, so events emitted while handling a
//! request are attached to its request log entry.

mod init;

pub use init::{init_logging, LoggingConfig, LoggingGuard};
