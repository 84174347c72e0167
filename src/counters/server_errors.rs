// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deduplicated counting of unhandled server errors.
//!
//! Errors are grouped by fingerprint (consumer, method, path, error type and
//! truncated message). Only the first traceback of a window is retained, so
//! an error storm costs one entry per fingerprint.

use serde::{Deserialize, Serialize};

use crate::config::CountersConfig;
use crate::types::ServerError;

use super::bounded::{BoundedMap, EvictionPolicy};

/// Maximum message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 2048;

/// Maximum traceback length in bytes.
pub const MAX_TRACEBACK_BYTES: usize = 65_536;

/// Appended to truncated messages.
pub const MESSAGE_TRUNCATION_MARKER: &str = "... (truncated)";

/// Prepended to truncated tracebacks.
pub const TRACEBACK_TRUNCATION_MARKER: &str = "... (truncated) ...\n";

/// Cap a message at [`MAX_MESSAGE_CHARS`] characters.
///
/// A cut message ends with [`MESSAGE_TRUNCATION_MARKER`] and is exactly
/// `MAX_MESSAGE_CHARS` long.
pub fn truncate_message(message: &str) -> String {
    truncate_chars(message.trim(), MAX_MESSAGE_CHARS)
}

/// Cap `text` at `max_chars` characters, ending in the truncation marker when cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(MESSAGE_TRUNCATION_MARKER.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(MESSAGE_TRUNCATION_MARKER);
    truncated
}

/// Cap a traceback at [`MAX_TRACEBACK_BYTES`] bytes.
///
/// The innermost (last) lines are kept, preceded by
/// [`TRACEBACK_TRUNCATION_MARKER`].
pub fn truncate_traceback(traceback: &str) -> String {
    let traceback = traceback.trim();
    if traceback.len() <= MAX_TRACEBACK_BYTES {
        return traceback.to_string();
    }

    let cutoff = MAX_TRACEBACK_BYTES - TRACEBACK_TRUNCATION_MARKER.len();
    let mut kept: Vec<&str> = Vec::new();
    let mut length = 0;

    for line in traceback.split_inclusive('\n').rev() {
        if length + line.len() > cutoff {
            if kept.is_empty() {
                kept.push(tail_at_char_boundary(line, cutoff));
            }
            break;
        }
        length += line.len();
        kept.push(line);
    }

    let mut truncated = String::with_capacity(MAX_TRACEBACK_BYTES);
    truncated.push_str(TRACEBACK_TRUNCATION_MARKER);
    for line in kept.iter().rev() {
        truncated.push_str(line);
    }
    truncated
}

fn tail_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    let mut start = s.len().saturating_sub(max_bytes);
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Fingerprint of a server error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerErrorKey {
    pub consumer: Option<String>,
    pub method: String,
    pub path: String,
    pub error_type: String,
    /// Already truncated.
    pub message: String,
}

/// Occurrences and example traceback for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerErrorStats {
    pub error_count: u64,
    pub traceback: String,
}

/// Drained error group, in hub payload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorCounts {
    pub consumer: Option<String>,
    pub method: String,
    pub path: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(rename = "msg")]
    pub message: String,
    pub traceback: String,
    pub error_count: u64,
}

/// Delta accumulator of server errors between flushes.
pub struct ServerErrorCounter {
    entries: BoundedMap<ServerErrorKey, ServerErrorStats>,
}

impl ServerErrorCounter {
    pub fn new() -> Self {
        Self::with_config(&CountersConfig::default())
    }

    pub fn with_config(config: &CountersConfig) -> Self {
        Self::with_limit(config.max_server_error_keys, config.eviction)
    }

    pub fn with_limit(max_keys: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: BoundedMap::new("server_errors", max_keys, policy),
        }
    }

    /// Record one occurrence of `error` for the given endpoint.
    pub fn add_server_error(
        &self,
        consumer: Option<&str>,
        method: &str,
        path: &str,
        error: &ServerError,
    ) {
        let key = ServerErrorKey {
            consumer: consumer
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            method: method.to_uppercase(),
            path: path.to_string(),
            error_type: error.error_type.clone(),
            message: truncate_message(&error.message),
        };

        self.entries.update(
            key,
            || ServerErrorStats {
                error_count: 0,
                traceback: truncate_traceback(&error.traceback),
            },
            |stats| stats.error_count += 1,
        );
    }

    /// Take all error groups accumulated since the previous drain.
    pub fn drain(&self) -> Vec<ServerErrorCounts> {
        self.entries
            .drain()
            .into_iter()
            .map(|(key, stats)| ServerErrorCounts {
                consumer: key.consumer,
                method: key.method,
                path: key.path,
                error_type: key.error_type,
                message: key.message,
                traceback: stats.traceback,
                error_count: stats.error_count,
            })
            .collect()
    }

    pub fn get(&self, key: &ServerErrorKey) -> Option<ServerErrorStats> {
        self.entries.get_cloned(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServerErrorCounter {
    fn default() -> Self {
        Self::new()
    }
}
