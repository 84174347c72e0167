// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber initialization.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::capture::CaptureLayer;

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,

    /// Whether to include span events (enter/exit).
    pub include_span_events: bool,

    /// Whether to include file/line information.
    pub include_file_line: bool,

    /// Whether to include the target module path.
    pub include_target: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    /// Whether to use the compact format.
    pub compact: bool,

    /// Custom filter directive (overrides default_level).
    pub filter_directive: Option<String>,

    /// Install the [`CaptureLayer`] so request log entries carry application logs.
    pub capture_request_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            include_span_events: false,
            include_file_line: false,
            include_target: true,
            ansi_colors: true,
            compact: true,
            filter_directive: None,
            capture_request_logs: false,
        }
    }
}

impl LoggingConfig {
    /// Verbose output including the agent's own debug events.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_span_events: true,
            include_file_line: true,
            include_target: true,
            ansi_colors: true,
            compact: false,
            filter_directive: None,
            capture_request_logs: true,
        }
    }

    /// Warnings only, no colors.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            include_span_events: false,
            include_file_line: false,
            include_target: false,
            ansi_colors: false,
            compact: true,
            filter_directive: None,
            capture_request_logs: true,
        }
    }

    /// Trace-level output for the agent itself.
    pub fn testing() -> Self {
        Self {
            default_level: Level::TRACE,
            include_span_events: true,
            include_file_line: true,
            include_target: true,
            ansi_colors: false,
            compact: false,
            filter_directive: Some("apiscope=trace".to_string()),
            capture_request_logs: false,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture_request_logs = capture;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_level.to_string());
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Keep alive for the lifetime of the program.
pub struct LoggingGuard {
    _private: (),
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> io::Result<LoggingGuard> {
    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    let capture = config.capture_request_logs.then(CaptureLayer::new);

    let result = if config.compact {
        tracing_subscriber::registry()
            .with(capture)
            .with(config.env_filter())
            .with(fmt_layer.compact())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(capture)
            .with(config.env_filter())
            .with(fmt_layer)
            .try_init()
    };
    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(LoggingGuard { _private: () })
}
