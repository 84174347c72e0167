// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! All types deserialize from camelCase JSON or YAML and fall back to
//! defaults for any missing field.

use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::sync::Backoff;
use crate::counters::EvictionPolicy;
use crate::error::ConfigError;
use crate::hub::retry::RetryConfig;

/// Default hub base URL.
pub const DEFAULT_HUB_URL: &str = "https://hub.apiscope.dev";

static ENV_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w-]{1,32}$").unwrap());

/// Top-level agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Client identifier issued by the hub (UUID).
    pub client_id: String,

    /// Target environment label (e.g. `prod`, `staging`).
    pub env: String,

    /// Hub base URL.
    pub hub_url: String,

    /// Version of the instrumented application.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Request logging settings.
    pub request_logging: RequestLoggingConfig,

    /// Synchronization schedule and retry settings.
    pub sync: SyncConfig,

    /// Response time histogram settings.
    pub histogram: HistogramConfig,

    /// Counter capacity settings.
    pub counters: CountersConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            env: "dev".to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            app_version: None,
            request_logging: RequestLoggingConfig::default(),
            sync: SyncConfig::default(),
            histogram: HistogramConfig::default(),
            counters: CountersConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Create a config for the given client and environment.
    pub fn new(client_id: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            env: env.into(),
            ..Default::default()
        }
    }

    pub fn with_request_logging(mut self, request_logging: RequestLoggingConfig) -> Self {
        self.request_logging = request_logging;
        self
    }

    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into();
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField("clientId".to_string()));
        }
        if uuid::Uuid::parse_str(self.client_id.trim()).is_err() {
            return Err(ConfigError::invalid("clientId", "must be a UUID"));
        }
        if !ENV_REGEX.is_match(&self.env) {
            return Err(ConfigError::invalid(
                "env",
                "must be 1-32 characters of letters, digits, '_' or '-'",
            ));
        }
        if !(self.hub_url.starts_with("http://") || self.hub_url.starts_with("https://")) {
            return Err(ConfigError::invalid("hubUrl", "must be an http(s) URL"));
        }

        self.request_logging.validate()?;
        self.sync.validate()?;
        self.histogram.validate()?;
        self.counters.validate()
    }
}

// ============================================================================
// Request logging
// ============================================================================

/// Request logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestLoggingConfig {
    pub enabled: bool,
    pub log_query_params: bool,
    pub log_request_headers: bool,
    pub log_request_body: bool,
    pub log_response_headers: bool,
    pub log_response_body: bool,
    pub capture_logs: bool,

    /// Extra query parameter name patterns to mask (case-insensitive regex).
    pub mask_query_params: Vec<String>,

    /// Extra header name patterns to mask.
    pub mask_headers: Vec<String>,

    /// Extra JSON body field name patterns to mask.
    pub mask_body_fields: Vec<String>,

    /// Extra path patterns excluded from logging.
    pub exclude_paths: Vec<String>,

    /// Largest body captured, in bytes.
    pub max_body_size: usize,

    /// Entry cap of a buffered segment.
    pub max_segment_entries: usize,

    /// Byte cap of a buffered segment.
    pub max_segment_bytes: usize,

    /// Number of compressed files kept while awaiting delivery.
    pub max_files: usize,

    /// Delivery attempts per file before it is dropped.
    pub max_file_attempts: u32,

    /// Directory for compressed segment files (defaults to the system temp dir).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,
}

impl Default for RequestLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_query_params: true,
            log_request_headers: false,
            log_request_body: false,
            log_response_headers: true,
            log_response_body: false,
            capture_logs: false,
            mask_query_params: Vec::new(),
            mask_headers: Vec::new(),
            mask_body_fields: Vec::new(),
            exclude_paths: Vec::new(),
            max_body_size: 50_000,
            max_segment_entries: 1_000,
            max_segment_bytes: 1_000_000,
            max_files: 50,
            max_file_attempts: 10,
            spool_dir: None,
        }
    }
}

impl RequestLoggingConfig {
    /// Logging enabled with every capture toggle switched on.
    pub fn verbose() -> Self {
        Self {
            enabled: true,
            log_query_params: true,
            log_request_headers: true,
            log_request_body: true,
            log_response_headers: true,
            log_response_body: true,
            capture_logs: true,
            ..Default::default()
        }
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_segment_entries == 0 {
            return Err(ConfigError::invalid("maxSegmentEntries", "must be greater than 0"));
        }
        if self.max_segment_bytes == 0 {
            return Err(ConfigError::invalid("maxSegmentBytes", "must be greater than 0"));
        }
        if self.max_files == 0 {
            return Err(ConfigError::invalid("maxFiles", "must be greater than 0"));
        }

        let patterns = self
            .mask_query_params
            .iter()
            .chain(&self.mask_headers)
            .chain(&self.mask_body_fields)
            .chain(&self.exclude_paths);
        for pattern in patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::invalid("requestLogging", format!("{}: {}", pattern, e)));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Sync schedule
// ============================================================================

/// Synchronization schedule, timeouts and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Regular interval between sync ticks.
    pub sync_interval_secs: u64,

    /// Shorter interval used right after startup.
    pub initial_sync_interval_secs: u64,

    /// How long the shorter interval applies.
    pub initial_period_secs: u64,

    /// Interval between key set refreshes.
    pub key_refresh_interval_secs: u64,

    /// Delay before retrying a failed key refresh.
    pub key_retry_interval_secs: u64,

    /// Timeout of a single hub request.
    pub request_timeout_secs: u64,

    /// Grace period for shutdown draining.
    pub shutdown_timeout_secs: u64,

    /// Startup handshake attempts before giving up.
    pub startup_max_attempts: usize,
    pub startup_initial_delay_ms: u64,
    pub startup_max_delay_ms: u64,

    /// Backoff applied to log file delivery after failures.
    pub log_backoff_initial_ms: u64,
    pub log_backoff_max_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 60,
            initial_sync_interval_secs: 10,
            initial_period_secs: 3_600,
            key_refresh_interval_secs: 300,
            key_retry_interval_secs: 30,
            request_timeout_secs: 10,
            shutdown_timeout_secs: 5,
            startup_max_attempts: 10,
            startup_initial_delay_ms: 1_000,
            startup_max_delay_ms: 60_000,
            log_backoff_initial_ms: 10_000,
            log_backoff_max_ms: 600_000,
        }
    }
}

impl SyncConfig {
    /// Near-zero delays for tests.
    pub fn fast() -> Self {
        Self {
            sync_interval_secs: 1,
            initial_sync_interval_secs: 1,
            initial_period_secs: 0,
            key_refresh_interval_secs: 1,
            key_retry_interval_secs: 1,
            request_timeout_secs: 1,
            shutdown_timeout_secs: 1,
            startup_max_attempts: 3,
            startup_initial_delay_ms: 1,
            startup_max_delay_ms: 10,
            log_backoff_initial_ms: 0,
            log_backoff_max_ms: 0,
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn initial_sync_interval(&self) -> Duration {
        Duration::from_secs(self.initial_sync_interval_secs)
    }

    pub fn initial_period(&self) -> Duration {
        Duration::from_secs(self.initial_period_secs)
    }

    pub fn key_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.key_refresh_interval_secs)
    }

    pub fn key_retry_interval(&self) -> Duration {
        Duration::from_secs(self.key_retry_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Retry policy for the startup handshake.
    pub fn startup_retry(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.startup_initial_delay_ms),
            max_delay: Duration::from_millis(self.startup_max_delay_ms),
            factor: 2.0,
            max_attempts: Some(self.startup_max_attempts),
        }
    }

    /// Backoff state for log file delivery.
    pub fn log_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.log_backoff_initial_ms),
            Duration::from_millis(self.log_backoff_max_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::invalid("syncIntervalSecs", "must be greater than 0"));
        }
        if self.initial_sync_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "initialSyncIntervalSecs",
                "must be greater than 0",
            ));
        }
        if self.key_refresh_interval_secs == 0 || self.key_retry_interval_secs == 0 {
            return Err(ConfigError::invalid("keyRefreshIntervalSecs", "must be greater than 0"));
        }
        if self.startup_max_attempts == 0 {
            return Err(ConfigError::invalid("startupMaxAttempts", "must be greater than 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Histogram & counters
// ============================================================================

/// Response time histogram boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistogramConfig {
    /// Bucket upper bounds in milliseconds, strictly increasing.
    pub response_time_buckets_ms: Vec<u64>,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            response_time_buckets_ms: vec![
                5, 10, 25, 50, 75, 100, 250, 500, 750, 1_000, 2_500, 5_000, 7_500, 10_000,
            ],
        }
    }
}

impl HistogramConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let buckets = &self.response_time_buckets_ms;
        if buckets.is_empty() {
            return Err(ConfigError::invalid("responseTimeBucketsMs", "must not be empty"));
        }
        if buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::invalid(
                "responseTimeBucketsMs",
                "must be strictly increasing",
            ));
        }
        Ok(())
    }
}

/// Capacity limits of the in-memory counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountersConfig {
    /// Distinct request keys kept between flushes.
    pub max_request_keys: usize,

    /// Distinct error fingerprints kept between flushes.
    pub max_server_error_keys: usize,

    /// What to do when a counter is full.
    pub eviction: EvictionPolicy,
}

impl Default for CountersConfig {
    fn default() -> Self {
        Self {
            max_request_keys: 10_000,
            max_server_error_keys: 1_000,
            eviction: EvictionPolicy::RejectNew,
        }
    }
}

impl CountersConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_request_keys == 0 || self.max_server_error_keys == 0 {
            return Err(ConfigError::invalid("counters", "key limits must be greater than 0"));
        }
        Ok(())
    }
}
