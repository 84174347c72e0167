// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured request logging.
//!
//! Entries are serialized to NDJSON, buffered in bounded segments and
//! written to gzip files under the spool directory for delivery by the sync
//! engine.

mod entry;
mod logger;
mod redact;
mod segment;

pub use entry::{ExceptionData, RequestData, RequestLogEntry, ResponseData};
pub use logger::RequestLogger;
pub use redact::{is_json_content_type, is_supported_content_type, Redactor, MASK};
pub use segment::{LogFile, Segment};
