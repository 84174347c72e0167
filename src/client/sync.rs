// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sync engine: owns the collectors and reconciles them with the hub.
//!
//! Three background tasks run per engine:
//! - startup: waits for the route list, then sends the handshake with
//!   bounded exponential backoff
//! - sync: drains counters every tick and delivers request log files
//! - keys: refreshes the key set on its own cadence
//!
//! Drained counters are sent once and dropped on failure. Log files stay on
//! disk and are retried on later ticks, oldest first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::consumers::ConsumerRegistry;
use crate::counters::{RequestCounter, ServerErrorCounter};
use crate::error::HubError;
use crate::hub::{retry_when, HubTransport, StartupPayload, SyncPayload};
use crate::keys::KeyRegistry;
use crate::request_log::{LogFile, RequestLogger};
use crate::types::StartupData;

/// How long request logging stays off after the hub refuses it.
pub const PAYMENT_REQUIRED_SUSPENSION: Duration = Duration::from_secs(3600);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Backoff
// ============================================================================

/// Exponential delay after consecutive failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next_delay: Duration,
    retry_at: Option<Instant>,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next_delay: initial,
            retry_at: None,
            failures: 0,
        }
    }

    /// Whether the caller should still hold off.
    pub fn is_waiting(&self) -> bool {
        self.retry_at.is_some_and(|at| Instant::now() < at)
    }

    /// Register a failure and return the delay until the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.next_delay;
        self.failures += 1;
        self.retry_at = Some(Instant::now() + delay);
        self.next_delay = delay.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next_delay = self.initial;
        self.retry_at = None;
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Outcome of one sync tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub requests: usize,
    pub server_errors: usize,
    pub consumers: usize,
    /// Whether a counters payload reached the hub.
    pub counters_sent: bool,
    pub files_sent: usize,
    /// Whether log delivery stopped on a failure.
    pub files_failed: bool,
}

/// Collectors plus the logic that ships them.
pub struct SyncEngine {
    config: AgentConfig,
    instance_uuid: Uuid,
    pub(crate) requests: RequestCounter,
    pub(crate) server_errors: ServerErrorCounter,
    pub(crate) consumers: ConsumerRegistry,
    pub(crate) keys: KeyRegistry,
    pub(crate) logger: RequestLogger,
    transport: Arc<dyn HubTransport>,
    startup_data: Mutex<Option<StartupData>>,
    startup_ready: Notify,
    startup_done: AtomicBool,
    log_backoff: Mutex<Backoff>,
    started_at: Instant,
}

impl SyncEngine {
    pub fn new(config: AgentConfig, transport: Arc<dyn HubTransport>) -> Self {
        let instance_uuid = Uuid::new_v4();
        Self {
            instance_uuid,
            requests: RequestCounter::with_config(&config.counters, &config.histogram),
            server_errors: ServerErrorCounter::with_config(&config.counters),
            consumers: ConsumerRegistry::new(),
            keys: KeyRegistry::new(),
            logger: RequestLogger::new(config.request_logging.clone(), instance_uuid),
            transport,
            startup_data: Mutex::new(None),
            startup_ready: Notify::new(),
            startup_done: AtomicBool::new(false),
            log_backoff: Mutex::new(config.sync.log_backoff()),
            started_at: Instant::now(),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn instance_uuid(&self) -> Uuid {
        self.instance_uuid
    }

    pub fn requests(&self) -> &RequestCounter {
        &self.requests
    }

    pub fn server_errors(&self) -> &ServerErrorCounter {
        &self.server_errors
    }

    pub fn consumers(&self) -> &ConsumerRegistry {
        &self.consumers
    }

    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    /// Whether the startup handshake has been accepted.
    pub fn is_started(&self) -> bool {
        self.startup_done.load(Ordering::Acquire)
    }

    /// Provide the startup data; the startup task picks it up.
    pub fn set_startup_data(&self, data: StartupData) {
        *lock(&self.startup_data) = Some(data);
        self.startup_ready.notify_one();
    }

    /// Interval before the next tick. Shorter during the initial period.
    pub fn current_interval(&self) -> Duration {
        let sync = &self.config.sync;
        if self.started_at.elapsed() < sync.initial_period() {
            sync.initial_sync_interval()
        } else {
            sync.sync_interval()
        }
    }

    /// Drain and ship everything collected since the previous tick.
    pub async fn tick(&self) -> TickReport {
        let payload = SyncPayload::new(
            self.instance_uuid,
            self.requests.drain(),
            self.server_errors.drain(),
            self.consumers.drain(),
        );

        let mut report = TickReport {
            requests: payload.requests.len(),
            server_errors: payload.server_errors.len(),
            consumers: payload.consumers.len(),
            ..Default::default()
        };

        if !payload.is_empty() {
            match self.transport.send_sync(&payload).await {
                Ok(()) => {
                    report.counters_sent = true;
                    debug!(
                        requests = report.requests,
                        server_errors = report.server_errors,
                        consumers = report.consumers,
                        "Sync payload sent"
                    );
                }
                Err(e) => warn!(error = %e, "Failed to send sync payload, dropping it"),
            }
        }

        self.logger.rotate_file();
        let (sent, failed) = self.send_log_files().await;
        report.files_sent = sent;
        report.files_failed = failed;
        report
    }

    /// Deliver pending log files oldest first, stopping at the first failure.
    async fn send_log_files(&self) -> (usize, bool) {
        if lock(&self.log_backoff).is_waiting() {
            debug!("Request log delivery backing off");
            return (0, false);
        }

        let mut sent = 0;
        while let Some(file) = self.logger.get_file() {
            let claimed = ClaimedFile::new(&self.logger, file);
            let body = match claimed.file.read_bytes() {
                Ok(body) => body,
                Err(e) => {
                    warn!(file = %claimed.file.path.display(), error = %e, "Failed to read request log file");
                    claimed.discard();
                    continue;
                }
            };

            match self.transport.send_log(&claimed.file.uuid.to_string(), body).await {
                Ok(()) => {
                    sent += 1;
                    lock(&self.log_backoff).reset();
                    claimed.discard();
                }
                Err(HubError::PaymentRequired) => {
                    claimed.discard();
                    self.logger.suspend(PAYMENT_REQUIRED_SUSPENSION);
                    warn!("Request logging is not available for this client, suspending");
                    return (sent, true);
                }
                Err(e) => {
                    claimed.retry_later();
                    let delay = lock(&self.log_backoff).record_failure();
                    warn!(error = %e, ?delay, "Failed to send request log file, will retry");
                    return (sent, true);
                }
            }
        }
        (sent, false)
    }

    /// Send the handshake once startup data is available.
    pub async fn startup(&self) -> Result<(), HubError> {
        let data = loop {
            if let Some(data) = lock(&self.startup_data).clone() {
                break data;
            }
            self.startup_ready.notified().await;
        };

        let payload = StartupPayload::new(self.instance_uuid, data, self.config.app_version.as_deref());
        let retry_config = self.config.sync.startup_retry();
        retry_when(
            "startup",
            &retry_config,
            || self.transport.send_startup(&payload),
            HubError::is_retryable,
        )
        .await?;

        self.startup_done.store(true, Ordering::Release);
        info!(instance = %self.instance_uuid, "Startup data sent");
        Ok(())
    }

    /// Refresh keys, returning the delay until the next refresh.
    pub async fn refresh_keys(&self) -> Duration {
        match self.keys.refresh(self.transport.as_ref()).await {
            Ok(_) => self.config.sync.key_refresh_interval(),
            Err(_) => self.config.sync.key_retry_interval(),
        }
    }
}

// ============================================================================
// Claimed files
// ============================================================================

/// A log file taken off the queue for delivery.
///
/// Dropping it unsettled, e.g. when a tick is cancelled mid-upload, puts the
/// file back at the front of the queue with its attempt count unchanged.
struct ClaimedFile<'a> {
    logger: &'a RequestLogger,
    file: LogFile,
    settled: bool,
}

impl<'a> ClaimedFile<'a> {
    fn new(logger: &'a RequestLogger, file: LogFile) -> Self {
        Self {
            logger,
            file,
            settled: false,
        }
    }

    /// Delete from disk; the file is done with.
    fn discard(mut self) {
        self.settled = true;
        self.file.delete_quietly();
    }

    fn retry_later(mut self) {
        self.settled = true;
        self.logger.retry_file_later(self.file.clone());
    }
}

impl Drop for ClaimedFile<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(file = %self.file.path.display(), "Request log delivery interrupted, requeueing");
            self.logger.requeue_file(self.file.clone());
        }
    }
}

// ============================================================================
// Background tasks
// ============================================================================

/// Resolves once cancellation is signalled or the sender is gone.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

pub(crate) async fn run_startup(engine: Arc<SyncEngine>, mut cancel: watch::Receiver<bool>) {
    tokio::select! {
        result = engine.startup() => {
            if let Err(e) = result {
                warn!(error = %e, "Giving up on startup handshake");
            }
        }
        _ = cancelled(&mut cancel) => {}
    }
}

pub(crate) async fn run_sync_loop(engine: Arc<SyncEngine>, mut cancel: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = sleep(engine.current_interval()) => {}
            _ = cancelled(&mut cancel) => break,
        }
        engine.tick().await;
    }
    debug!("Sync loop stopped");
}

pub(crate) async fn run_key_refresh(engine: Arc<SyncEngine>, mut cancel: watch::Receiver<bool>) {
    loop {
        let delay = tokio::select! {
            delay = engine.refresh_keys() => delay,
            _ = cancelled(&mut cancel) => break,
        };
        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancelled(&mut cancel) => break,
        }
    }
    debug!("Key refresh loop stopped");
}
