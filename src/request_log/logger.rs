// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request log buffering, rotation and file handoff.
//!
//! The request path only serializes an entry and appends it to the active
//! segment under a short lock. Compression and every other file operation
//! happen in [`RequestLogger::maintain`] and [`RequestLogger::rotate_file`],
//! which the sync engine calls from its background task.
//!
//! Files move through seal → claim ([`RequestLogger::get_file`]) → delete
//! ([`LogFile::delete`]). A claimed file that could not be delivered goes
//! back to the queue through [`RequestLogger::retry_file_later`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::LogRecord;
use crate::config::RequestLoggingConfig;
use crate::counters::{truncate_message, truncate_traceback};
use crate::types::{RequestInfo, ResponseInfo, ServerError};

use super::entry::{ExceptionData, RequestData, RequestLogEntry, ResponseData};
use super::redact::{is_json_content_type, is_supported_content_type, Redactor};
use super::segment::{LogFile, Segment};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Segments {
    active: Segment,
    sealed: VecDeque<Segment>,
}

/// Buffers request log entries and turns them into compressed files.
pub struct RequestLogger {
    config: RequestLoggingConfig,
    redactor: Redactor,
    spool_dir: PathBuf,
    segments: Mutex<Segments>,
    files: Mutex<VecDeque<LogFile>>,
    suspended_until: Mutex<Option<Instant>>,
    closed: AtomicBool,
}

impl RequestLogger {
    /// Create a logger spooling to `<spool dir>/apiscope/<instance_uuid>`.
    pub fn new(config: RequestLoggingConfig, instance_uuid: Uuid) -> Self {
        let base = config.spool_dir.clone().unwrap_or_else(std::env::temp_dir);
        let spool_dir = base.join("apiscope").join(instance_uuid.to_string());

        Self {
            redactor: Redactor::new(&config),
            config,
            spool_dir,
            segments: Mutex::new(Segments::default()),
            files: Mutex::new(VecDeque::new()),
            suspended_until: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RequestLoggingConfig {
        &self.config
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    /// Whether new entries are currently accepted.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.is_closed() && !self.is_suspended()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_suspended(&self) -> bool {
        lock(&self.suspended_until).is_some_and(|until| Instant::now() < until)
    }

    // ========================================================================
    // Request path
    // ========================================================================

    /// Record one request/response pair.
    ///
    /// Skipped when disabled, closed, suspended, or when the request is a
    /// health check. Never performs file I/O.
    pub fn log_request(
        &self,
        request: &RequestInfo,
        response: &ResponseInfo,
        error: Option<&ServerError>,
        logs: Vec<LogRecord>,
    ) {
        if !self.is_enabled() {
            return;
        }

        let path = request
            .path
            .as_deref()
            .unwrap_or_else(|| url_path(&request.url));
        if self.redactor.is_excluded(path, request.header("user-agent")) {
            return;
        }

        let entry = self.build_entry(request, response, error, logs);
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Failed to serialize request log entry");
                return;
            }
        };

        let mut segments = lock(&self.segments);
        if segments.active.is_full_for(
            line.len(),
            self.config.max_segment_entries,
            self.config.max_segment_bytes,
        ) {
            let full = std::mem::take(&mut segments.active);
            segments.sealed.push_back(full);
            if segments.sealed.len() > self.config.max_files {
                segments.sealed.pop_front();
                debug!("Dropped oldest unsent request log segment");
            }
        }
        segments.active.push(&line);
    }

    fn build_entry(
        &self,
        request: &RequestInfo,
        response: &ResponseInfo,
        error: Option<&ServerError>,
        logs: Vec<LogRecord>,
    ) -> RequestLogEntry {
        let config = &self.config;

        let request_headers = if config.log_request_headers {
            self.redactor.mask_headers(&request.headers)
        } else {
            Vec::new()
        };
        let response_headers = if config.log_response_headers {
            self.redactor.mask_headers(&response.headers)
        } else {
            Vec::new()
        };

        let request_body = if config.log_request_body {
            self.capture_body(request.body.as_deref(), request.header("content-type"))
        } else {
            None
        };
        let response_body = if config.log_response_body {
            self.capture_body(response.body.as_deref(), response.header("content-type"))
        } else {
            None
        };

        RequestLogEntry {
            uuid: Uuid::new_v4(),
            request: RequestData {
                timestamp: request.timestamp,
                method: request.method.to_uppercase(),
                path: request.path.clone(),
                url: self.redactor.mask_url(&request.url, config.log_query_params),
                headers: request_headers,
                size: request.size,
                consumer: request.consumer.clone(),
                body: request_body,
            },
            response: ResponseData {
                status_code: response.status_code,
                response_time: response.response_time,
                headers: response_headers,
                size: response.size,
                body: response_body,
            },
            exception: error.map(|e| ExceptionData {
                error_type: e.error_type.clone(),
                message: truncate_message(&e.message),
                stacktrace: truncate_traceback(&e.traceback),
            }),
            logs: if config.capture_logs { logs } else { Vec::new() },
        }
    }

    fn capture_body(&self, body: Option<&[u8]>, content_type: Option<&str>) -> Option<Vec<u8>> {
        let body = body?;
        if body.is_empty()
            || body.len() > self.config.max_body_size
            || !is_supported_content_type(content_type)
        {
            return None;
        }

        if is_json_content_type(content_type) {
            Some(self.redactor.mask_json_body(body))
        } else {
            Some(body.to_vec())
        }
    }

    // ========================================================================
    // Background side
    // ========================================================================

    /// Seal the active segment and compress all sealed segments to files.
    pub fn rotate_file(&self) -> usize {
        {
            let mut segments = lock(&self.segments);
            if !segments.active.is_empty() {
                let active = std::mem::take(&mut segments.active);
                segments.sealed.push_back(active);
            }
        }
        self.maintain()
    }

    /// Compress sealed segments, enforce file retention and lift an expired
    /// suspension. Returns the number of files written.
    pub fn maintain(&self) -> usize {
        {
            let mut suspended = lock(&self.suspended_until);
            if suspended.is_some_and(|until| Instant::now() >= until) {
                *suspended = None;
                info!("Request logging resumed");
            }
        }

        let sealed = std::mem::take(&mut lock(&self.segments).sealed);
        let mut written = Vec::with_capacity(sealed.len());
        for segment in sealed.iter().filter(|s| !s.is_empty()) {
            match LogFile::write(&self.spool_dir, segment) {
                Ok(file) => {
                    debug!(file = %file.path.display(), entries = file.entries, "Request log file written");
                    written.push(file);
                }
                Err(e) => warn!(error = %e, "Failed to write request log file"),
            }
        }

        let count = written.len();
        let mut dropped = Vec::new();
        {
            let mut files = lock(&self.files);
            files.extend(written);
            while files.len() > self.config.max_files {
                if let Some(oldest) = files.pop_front() {
                    dropped.push(oldest);
                }
            }
        }
        for file in dropped {
            warn!(file = %file.path.display(), "Request log retention exceeded, dropping oldest file");
            file.delete_quietly();
        }
        count
    }

    /// Claim the oldest pending file.
    pub fn get_file(&self) -> Option<LogFile> {
        lock(&self.files).pop_front()
    }

    /// Return a claimed file after a failed delivery.
    ///
    /// Files that have failed too often are deleted instead.
    pub fn retry_file_later(&self, mut file: LogFile) {
        file.attempts += 1;
        if file.attempts >= self.config.max_file_attempts || self.is_suspended() {
            warn!(file = %file.path.display(), attempts = file.attempts, "Giving up on request log file");
            file.delete_quietly();
            return;
        }
        lock(&self.files).push_front(file);
    }

    /// Return a claimed file untouched, e.g. when its delivery was cancelled.
    pub fn requeue_file(&self, file: LogFile) {
        lock(&self.files).push_front(file);
    }

    /// Number of files waiting for delivery.
    pub fn pending_files(&self) -> usize {
        lock(&self.files).len()
    }

    /// Entries in the active segment.
    pub fn active_entries(&self) -> usize {
        lock(&self.segments).active.len()
    }

    /// Number of sealed segments not yet compressed.
    pub fn sealed_segments(&self) -> usize {
        lock(&self.segments).sealed.len()
    }

    /// Stop logging for `duration` and drop everything pending.
    pub fn suspend(&self, duration: Duration) {
        *lock(&self.suspended_until) = Some(Instant::now() + duration);
        self.clear();
        info!(?duration, "Request logging suspended");
    }

    /// Drop buffered segments and delete pending files.
    pub fn clear(&self) {
        {
            let mut segments = lock(&self.segments);
            segments.active = Segment::new();
            segments.sealed.clear();
        }
        let files = std::mem::take(&mut *lock(&self.files));
        for file in &files {
            file.delete_quietly();
        }
    }

    /// Flush the partial segment to disk and stop accepting entries.
    ///
    /// Flushed files stay claimable until [`RequestLogger::discard`] or drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let written = self.rotate_file();
        debug!(written, "Request logger closed");
    }

    /// Delete everything not yet delivered and remove the spool directory.
    pub fn discard(&self) {
        self.clear();
        match std::fs::remove_dir_all(&self.spool_dir) {
            Ok(()) => debug!(dir = %self.spool_dir.display(), "Spool directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(dir = %self.spool_dir.display(), error = %e, "Failed to remove spool directory"),
        }
    }
}

impl Drop for RequestLogger {
    fn drop(&mut self) {
        self.discard();
    }
}

/// Path component of a URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path_start = if url.contains("://") {
        without_scheme.find('/').map(|i| &without_scheme[i..])
    } else {
        Some(without_scheme)
    };
    let path = path_start.unwrap_or("/");
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}
