// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory delta counters drained by the sync engine.
//!
//! Both counters are fed from request-handling threads and drained by the
//! background sync task. Recording is a single short critical section with
//! no I/O; draining swaps the whole map out atomically.

mod bounded;
mod histogram;
mod requests;
mod server_errors;

pub use bounded::{BoundedMap, EvictionPolicy};
pub use histogram::ResponseTimeHistogram;
pub use requests::{RequestCounter, RequestCounts, RequestKey, RequestRecord, RequestStats};
pub use server_errors::{
    truncate_message, truncate_traceback, ServerErrorCounter, ServerErrorCounts, ServerErrorKey,
    ServerErrorStats, MAX_MESSAGE_CHARS, MAX_TRACEBACK_BYTES, MESSAGE_TRUNCATION_MARKER,
    TRACEBACK_TRUNCATION_MARKER,
};

pub(crate) use server_errors::truncate_chars;
