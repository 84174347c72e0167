// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Consumer metadata tracking.
//!
//! A consumer is an identified caller of the instrumented API. Adapters report
//! consumers on every request; the registry forwards a consumer to the hub
//! only when it is new or its display metadata changed.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Maximum identifier length in characters.
pub const MAX_IDENTIFIER_CHARS: usize = 128;

/// Maximum name and group length in characters.
pub const MAX_NAME_CHARS: usize = 64;

/// An identified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Consumer {
    /// Create a normalized consumer. Returns `None` for a blank identifier.
    pub fn new(
        identifier: impl AsRef<str>,
        name: Option<&str>,
        group: Option<&str>,
    ) -> Option<Self> {
        let identifier = normalize(identifier.as_ref(), MAX_IDENTIFIER_CHARS)?;
        Some(Self {
            identifier,
            name: name.and_then(|n| normalize(n, MAX_NAME_CHARS)),
            group: group.and_then(|g| normalize(g, MAX_NAME_CHARS)),
        })
    }

    /// Consumer known only by its identifier.
    pub fn from_identifier(identifier: impl AsRef<str>) -> Option<Self> {
        Self::new(identifier, None, None)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = normalize(name, MAX_NAME_CHARS);
        self
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = normalize(group, MAX_NAME_CHARS);
        self
    }

    /// Whether there is any metadata worth sending to the hub.
    pub fn has_metadata(&self) -> bool {
        self.name.is_some() || self.group.is_some()
    }
}

fn normalize(value: &str, max_chars: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Metadata {
    name: Option<String>,
    group: Option<String>,
}

#[derive(Default)]
struct Inner {
    known: HashMap<String, Metadata>,
    pending: BTreeSet<String>,
}

/// Registry of consumer metadata awaiting delivery.
#[derive(Default)]
pub struct ConsumerRegistry {
    inner: Mutex<Inner>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a consumer, queueing it for delivery when new or changed.
    pub fn add_or_update_consumer(&self, consumer: Option<Consumer>) {
        let Some(consumer) = consumer else {
            return;
        };
        if consumer.identifier.trim().is_empty() || !consumer.has_metadata() {
            return;
        }

        let metadata = Metadata {
            name: consumer.name,
            group: consumer.group,
        };

        let mut inner = self.lock();
        match inner.known.get(&consumer.identifier) {
            Some(existing) if *existing == metadata => {}
            _ => {
                inner.known.insert(consumer.identifier.clone(), metadata);
                inner.pending.insert(consumer.identifier);
            }
        }
    }

    /// Take consumers queued since the previous drain.
    ///
    /// Known metadata is kept so unchanged consumers are not sent again.
    pub fn drain(&self) -> Vec<Consumer> {
        let mut inner = self.lock();
        let pending = std::mem::take(&mut inner.pending);
        pending
            .into_iter()
            .filter_map(|identifier| {
                let metadata = inner.known.get(&identifier)?;
                Some(Consumer {
                    name: metadata.name.clone(),
                    group: metadata.group.clone(),
                    identifier,
                })
            })
            .collect()
    }

    /// Number of consumers awaiting delivery.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of distinct consumers seen.
    pub fn known_len(&self) -> usize {
        self.lock().known.len()
    }
}
