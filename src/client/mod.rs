// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide agent client.
//!
//! Framework adapters call [`Client::init`] once at startup and
//! [`Client::observe`] for every handled request. The client owns a
//! [`SyncEngine`] and its background tasks. An invalid configuration, or no
//! tokio runtime, yields a disabled client whose operations do nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use apiscope::{AgentConfig, Client, Observation, RequestInfo, ResponseInfo};
//!
//! let client = Client::init(AgentConfig::new(client_id, "prod"));
//! client.set_startup_data(paths, versions, "rust:axum");
//!
//! // Per request:
//! client.observe(Observation::new(request, response));
//!
//! // On shutdown:
//! client.shutdown().await;
//! ```

pub mod sync;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::LogRecord;
use crate::config::AgentConfig;
use crate::consumers::Consumer;
use crate::counters::RequestRecord;
use crate::hub::{HubClient, HubTransport};
use crate::keys::KeyInfo;
use crate::types::{PathInfo, RequestInfo, ResponseInfo, ServerError, StartupData};

pub use sync::{Backoff, SyncEngine, TickReport};

static INSTANCE: Lazy<RwLock<Option<Arc<Client>>>> = Lazy::new(|| RwLock::new(None));

/// Everything an adapter knows about one handled request.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub request: RequestInfo,
    pub response: ResponseInfo,
    pub error: Option<ServerError>,
    pub consumer: Option<Consumer>,
    pub logs: Vec<LogRecord>,
}

impl Observation {
    pub fn new(request: RequestInfo, response: ResponseInfo) -> Self {
        Self {
            request,
            response,
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: ServerError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_consumer(mut self, consumer: Option<Consumer>) -> Self {
        self.consumer = consumer;
        self
    }

    /// Attach records returned by [`crate::capture::scope`].
    pub fn with_logs(mut self, logs: Vec<LogRecord>) -> Self {
        self.logs = logs;
        self
    }
}

/// The agent client.
pub struct Client {
    engine: Option<Arc<SyncEngine>>,
    cancel: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    // ========================================================================
    // Construction & singleton
    // ========================================================================

    /// Create and register the process-wide client.
    ///
    /// Later calls return the existing instance.
    pub fn init(config: AgentConfig) -> Arc<Client> {
        Self::register(|| Self::new(config))
    }

    /// Like [`Client::init`], with a custom hub transport.
    pub fn init_with_transport(config: AgentConfig, transport: Arc<dyn HubTransport>) -> Arc<Client> {
        Self::register(|| Self::with_transport(config, transport))
    }

    fn register<F: FnOnce() -> Client>(build: F) -> Arc<Client> {
        let mut slot = INSTANCE.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            warn!("Client already initialized, returning the existing instance");
            return Arc::clone(existing);
        }
        let client = Arc::new(build());
        *slot = Some(Arc::clone(&client));
        client
    }

    /// The registered client, if any.
    pub fn get() -> Option<Arc<Client>> {
        INSTANCE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Unregister the process-wide client without shutting it down.
    pub fn reset_instance() -> Option<Arc<Client>> {
        INSTANCE
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Create an unregistered client talking to the configured hub.
    pub fn new(config: AgentConfig) -> Client {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Invalid configuration, agent disabled");
            return Self::disabled();
        }
        match HubClient::new(&config) {
            Ok(transport) => Self::with_transport(config, Arc::new(transport)),
            Err(e) => {
                warn!(error = %e, "Failed to create hub client, agent disabled");
                Self::disabled()
            }
        }
    }

    /// Create an unregistered client with a custom transport.
    pub fn with_transport(config: AgentConfig, transport: Arc<dyn HubTransport>) -> Client {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Invalid configuration, agent disabled");
            return Self::disabled();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available, agent disabled");
            return Self::disabled();
        };

        let engine = Arc::new(SyncEngine::new(config, transport));
        let (cancel, cancel_rx) = watch::channel(false);
        let tasks = vec![
            runtime.spawn(sync::run_startup(Arc::clone(&engine), cancel_rx.clone())),
            runtime.spawn(sync::run_sync_loop(Arc::clone(&engine), cancel_rx.clone())),
            runtime.spawn(sync::run_key_refresh(Arc::clone(&engine), cancel_rx)),
        ];

        info!(
            instance = %engine.instance_uuid(),
            env = %engine.config().env,
            request_logging = engine.config().request_logging.enabled,
            "Agent started"
        );

        Client {
            engine: Some(engine),
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    /// A client that ignores every operation.
    pub fn disabled() -> Client {
        let (cancel, _) = watch::channel(true);
        Client {
            engine: None,
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&Arc<SyncEngine>> {
        self.engine.as_ref()
    }

    pub fn instance_uuid(&self) -> Option<Uuid> {
        self.engine.as_ref().map(|e| e.instance_uuid())
    }

    // ========================================================================
    // Request path
    // ========================================================================

    /// Record one handled request.
    ///
    /// Counters need a matched route; unmatched requests are only logged.
    pub fn observe(&self, observation: Observation) {
        let Some(engine) = &self.engine else {
            return;
        };
        let Observation {
            mut request,
            response,
            error,
            consumer,
            logs,
        } = observation;

        if request.consumer.is_none() {
            request.consumer = consumer.as_ref().map(|c| c.identifier.clone());
        }

        if let Some(path) = request.path.as_deref() {
            engine.requests.add_request(RequestRecord {
                consumer: request.consumer.as_deref(),
                method: &request.method,
                path,
                status_code: response.status_code,
                response_time: response.response_time,
                request_size: request.size,
                response_size: response.size,
            });
            if let Some(error) = &error {
                engine.server_errors.add_server_error(
                    request.consumer.as_deref(),
                    &request.method,
                    path,
                    error,
                );
            }
        }

        engine.consumers.add_or_update_consumer(consumer);
        engine.logger.log_request(&request, &response, error.as_ref(), logs);
    }

    /// Look up an API key in the cached key set. Never performs I/O.
    pub fn lookup_key(&self, raw_key: &str) -> Option<Arc<KeyInfo>> {
        self.engine.as_ref()?.keys.get(raw_key)
    }

    /// Provide the registered routes and component versions for the handshake.
    pub fn set_startup_data(
        &self,
        paths: Vec<PathInfo>,
        versions: BTreeMap<String, String>,
        client_label: impl Into<String>,
    ) {
        if let Some(engine) = &self.engine {
            engine.set_startup_data(StartupData {
                paths,
                versions,
                client: client_label.into(),
            });
        }
    }

    // ========================================================================
    // Background control
    // ========================================================================

    /// Run a sync tick now.
    pub async fn sync_now(&self) -> TickReport {
        match &self.engine {
            Some(engine) => engine.tick().await,
            None => TickReport::default(),
        }
    }

    /// Stop background tasks, flush once more and close the request logger.
    ///
    /// Each phase is bounded by the shutdown timeout. Log files still
    /// undelivered afterwards are deleted with the spool directory. Safe to
    /// call twice.
    pub async fn shutdown(&self) {
        self.cancel.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));

        if let Some(engine) = &self.engine {
            let timeout = engine.config().sync.shutdown_timeout();

            for mut task in tasks {
                if tokio::time::timeout(timeout, &mut task).await.is_err() {
                    debug!("Background task did not stop in time, aborting");
                    task.abort();
                    let _ = task.await;
                }
            }

            if !engine.logger.is_closed() {
                engine.logger.close();
                match tokio::time::timeout(timeout, engine.tick()).await {
                    Ok(report) => debug!(?report, "Final sync done"),
                    Err(_) => warn!("Final sync timed out"),
                }
                // Nothing delivers files after this point.
                engine.logger.discard();
                info!(instance = %engine.instance_uuid(), "Agent stopped");
            }
        }

        let mut slot = INSTANCE.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), self)) {
            *slot = None;
        }
    }
}
