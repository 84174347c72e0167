// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core type definitions shared by framework adapters and the agent.
//!
//! Framework adapters translate their own request/response objects into
//! [`RequestInfo`] and [`ResponseInfo`], and unhandled errors into
//! [`ServerError`]. Everything downstream works on these types only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single header as an ordered name/value pair.
pub type Header = (String, String);

/// Current wall-clock time as fractional Unix seconds.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Case-insensitive header lookup returning the first match.
pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

// ============================================================================
// Request / Response
// ============================================================================

/// Request data supplied by a framework adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInfo {
    /// When the request was received (Unix seconds).
    pub timestamp: f64,
    /// HTTP method.
    pub method: String,
    /// Route template (e.g. `/items/{id}`), `None` when no route matched.
    pub path: Option<String>,
    /// Full request URL including query string.
    pub url: String,
    /// Request headers in arrival order.
    pub headers: Vec<Header>,
    /// Request body size in bytes, if known.
    pub size: Option<u64>,
    /// Identified consumer, if any.
    pub consumer: Option<String>,
    /// Raw request body, if the adapter buffered it.
    pub body: Option<Vec<u8>>,
}

impl RequestInfo {
    /// Create request info stamped with the current time.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            timestamp: unix_timestamp(),
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// Attach a body; the size is filled in from the body when unset.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.size.get_or_insert(body.len() as u64);
        self.body = Some(body);
        self
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response data supplied by a framework adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseInfo {
    /// HTTP status code.
    pub status_code: u16,
    /// Time taken to produce the response, in seconds.
    pub response_time: f64,
    /// Response headers in order.
    pub headers: Vec<Header>,
    /// Total response size in bytes as streamed, if known.
    pub size: Option<u64>,
    /// Raw response body, if the adapter buffered it.
    pub body: Option<Vec<u8>>,
}

impl ResponseInfo {
    pub fn new(status_code: u16, response_time: f64) -> Self {
        Self {
            status_code,
            response_time,
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Attach a body; the size is filled in from the body when unset.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.size.get_or_insert(body.len() as u64);
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

// ============================================================================
// Server errors
// ============================================================================

/// An unhandled error raised while serving a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Error type name (e.g. `std::io::Error`).
    pub error_type: String,
    /// Display message.
    pub message: String,
    /// Formatted traceback or error chain.
    pub traceback: String,
}

impl ServerError {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        traceback: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            traceback: traceback.into(),
        }
    }

    /// Build from a Rust error, using its source chain as the traceback.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut traceback = format!("{}: {}", std::any::type_name::<E>(), err);
        let mut source = err.source();
        while let Some(cause) = source {
            traceback.push_str("\nCaused by: ");
            traceback.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            error_type: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            traceback,
        }
    }
}

// ============================================================================
// Startup data
// ============================================================================

/// A registered route.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathInfo {
    pub method: String,
    pub path: String,
}

impl PathInfo {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
        }
    }
}

/// Application description sent once per process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartupData {
    /// Registered routes.
    pub paths: Vec<PathInfo>,
    /// Component name → version.
    pub versions: BTreeMap<String, String>,
    /// Adapter label, e.g. `rust:axum`.
    pub client: String,
}

impl StartupData {
    pub fn new(paths: Vec<PathInfo>, client: impl Into<String>) -> Self {
        Self {
            paths,
            versions: BTreeMap::new(),
            client: client.into(),
        }
    }

    pub fn with_version(mut self, component: impl Into<String>, version: impl Into<String>) -> Self {
        self.versions.insert(component.into(), version.into());
        self
    }
}
