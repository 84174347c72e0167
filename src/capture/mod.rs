// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-request capture of application log records.
//!
//! Adapters wrap request execution in [`scope`] (or [`sync_scope`]). Any
//! record appended while the scope is active, including through
//! [`CaptureLayer`], is collected and returned when the scope ends, ready to
//! be attached to the request log entry.
//!
//! Captures follow the task, not the thread. To keep capturing in a spawned
//! task, take [`current`] and run the task body inside [`LogCapture::scope`].

mod layer;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::counters::truncate_chars;
use crate::types::unix_timestamp;

pub use layer::CaptureLayer;

/// Records kept per capture; further appends are dropped.
pub const MAX_CAPTURED_RECORDS: usize = 1000;

/// Longest captured message, in characters.
pub const MAX_LOG_MESSAGE_CHARS: usize = 2048;

tokio::task_local! {
    static CURRENT_CAPTURE: LogCapture;
}

/// A captured application log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unix seconds.
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub level: String,
    pub message: String,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    pub fn new(level: impl AsRef<str>, message: impl AsRef<str>) -> Self {
        Self {
            timestamp: unix_timestamp(),
            logger: None,
            level: level.as_ref().to_uppercase(),
            message: truncate_chars(message.as_ref().trim(), MAX_LOG_MESSAGE_CHARS),
        }
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Shared handle to the records of one request.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record unless the capture is full.
    pub fn push(&self, record: LogRecord) {
        let mut records = self.lock();
        if records.len() < MAX_CAPTURED_RECORDS {
            records.push(record);
        }
    }

    /// Take every record captured so far.
    pub fn take(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `future` with this capture as the active one.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT_CAPTURE.scope(self, future).await
    }
}

/// Run `future` inside a fresh capture and return its output with the records.
pub async fn scope<F: Future>(future: F) -> (F::Output, Vec<LogRecord>) {
    let capture = LogCapture::new();
    let output = CURRENT_CAPTURE.scope(capture.clone(), future).await;
    (output, capture.take())
}

/// Synchronous variant of [`scope`].
pub fn sync_scope<F, R>(f: F) -> (R, Vec<LogRecord>)
where
    F: FnOnce() -> R,
{
    let capture = LogCapture::new();
    let output = CURRENT_CAPTURE.sync_scope(capture.clone(), f);
    (output, capture.take())
}

/// Append to the active capture. Dropped silently when none is active.
pub fn append(record: LogRecord) {
    let _ = CURRENT_CAPTURE.try_with(|capture| capture.push(record));
}

/// Handle to the active capture, for propagation into spawned tasks.
pub fn current() -> Option<LogCapture> {
    CURRENT_CAPTURE.try_with(LogCapture::clone).ok()
}

/// Whether a capture is active for the current task.
pub fn is_active() -> bool {
    CURRENT_CAPTURE.try_with(|_| ()).is_ok()
}
