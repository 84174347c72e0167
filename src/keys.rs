// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! API key cache served to the request path.
//!
//! The hub ships the full key set as a map from `sha256(salt || raw_key)` to
//! key metadata. Lookups hash the raw key and read the current snapshot
//! without locking; a refresh builds a new snapshot off to the side and swaps
//! it in atomically, so readers see either the old or the new set.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::HubError;
use crate::hub::HubTransport;

/// Metadata of a single API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key_id: String,
    #[serde(default)]
    pub api_key_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyInfo {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            api_key_id: None,
            name: None,
            scopes: BTreeSet::new(),
            expires_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True iff every required scope is granted. An empty list is always satisfied.
    pub fn has_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|s| self.scopes.contains(s.as_ref()))
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Key set as delivered by the hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    pub salt: String,
    /// Hex sha256 of `salt || raw_key` → key metadata.
    #[serde(default)]
    pub keys: HashMap<String, KeyInfo>,
}

impl KeySet {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            keys: HashMap::new(),
        }
    }

    /// Add a key by its raw value, hashing it with this set's salt.
    pub fn with_raw_key(mut self, raw_key: &str, info: KeyInfo) -> Self {
        self.keys.insert(hash_key(&self.salt, raw_key), info);
        self
    }
}

/// Hex digest used to index keys.
pub fn hash_key(salt: &str, raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(raw_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lifecycle of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRegistryState {
    /// No key set has been loaded yet.
    Uninitialized,
    /// A refresh is in flight. The previous snapshot, if any, is still served.
    Loading,
    /// A snapshot is installed.
    Ready,
}

impl KeyRegistryState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

struct Snapshot {
    salt: String,
    keys: HashMap<String, Arc<KeyInfo>>,
}

/// Cache of hub-managed API keys.
pub struct KeyRegistry {
    snapshot: ArcSwapOption<Snapshot>,
    state: AtomicU8,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwapOption::empty(),
            state: AtomicU8::new(KeyRegistryState::Uninitialized as u8),
        }
    }

    pub fn state(&self) -> KeyRegistryState {
        KeyRegistryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Look up a raw API key in the current snapshot.
    ///
    /// Never performs I/O. Returns `None` before the first load, for unknown
    /// keys and for expired keys.
    pub fn get(&self, raw_key: &str) -> Option<Arc<KeyInfo>> {
        let raw_key = raw_key.trim();
        if raw_key.is_empty() {
            return None;
        }

        let guard = self.snapshot.load();
        let snapshot = guard.as_ref()?;
        let info = snapshot.keys.get(&hash_key(&snapshot.salt, raw_key))?;
        if info.is_expired() {
            return None;
        }
        Some(Arc::clone(info))
    }

    /// Install a new key set.
    pub fn update(&self, key_set: KeySet) {
        let snapshot = Snapshot {
            salt: key_set.salt,
            keys: key_set
                .keys
                .into_iter()
                .map(|(hash, info)| (hash.to_lowercase(), Arc::new(info)))
                .collect(),
        };
        self.snapshot.store(Some(Arc::new(snapshot)));
        self.state
            .store(KeyRegistryState::Ready as u8, Ordering::Release);
    }

    /// Fetch the key set from the hub and swap it in.
    ///
    /// On failure the current snapshot stays in place.
    pub async fn refresh(&self, transport: &dyn HubTransport) -> Result<usize, HubError> {
        let previous = self
            .state
            .swap(KeyRegistryState::Loading as u8, Ordering::AcqRel);

        match transport.fetch_keys().await {
            Ok(key_set) => {
                let count = key_set.keys.len();
                self.update(key_set);
                debug!(count, "Key set refreshed");
                Ok(count)
            }
            Err(e) => {
                self.state.store(previous, Ordering::Release);
                warn!(error = %e, "Key set refresh failed");
                Err(e)
            }
        }
    }

    /// Number of keys in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot
            .load()
            .as_ref()
            .map_or(0, |snapshot| snapshot.keys.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MockHubTransport;
    use chrono::Duration;

    fn key_set() -> KeySet {
        KeySet::new("pepper")
            .with_raw_key(
                "secret-1",
                KeyInfo::new("k1").with_name("Reader").with_scopes(["read"]),
            )
            .with_raw_key(
                "secret-2",
                KeyInfo::new("k2").with_scopes(["read", "write"]),
            )
            .with_raw_key(
                "expired",
                KeyInfo::new("k3").with_expires_at(Utc::now() - Duration::hours(1)),
            )
    }

    #[test]
    fn test_uninitialized_returns_none() {
        let registry = KeyRegistry::new();
        assert_eq!(registry.state(), KeyRegistryState::Uninitialized);
        assert!(registry.get("secret-1").is_none());

        registry.update(key_set());
        assert_eq!(registry.state(), KeyRegistryState::Ready);
        assert_eq!(registry.get("secret-1").unwrap().key_id, "k1");
    }

    #[test]
    fn test_lookup_uses_salted_hash() {
        let registry = KeyRegistry::new();
        registry.update(key_set());

        assert_eq!(registry.state(), KeyRegistryState::Ready);
        assert_eq!(registry.get("secret-1").unwrap().key_id, "k1");
        assert_eq!(registry.get("  secret-2 ").unwrap().key_id, "k2");
        assert!(registry.get("unknown").is_none());
        assert!(registry.get("").is_none());

        let unsalted = KeySet::new("").with_raw_key("secret-1", KeyInfo::new("k1"));
        let other = KeyRegistry::new();
        other.update(KeySet {
            salt: "pepper".to_string(),
            keys: unsalted.keys,
        });
        assert!(other.get("secret-1").is_none());
    }

    #[test]
    fn test_expired_key_not_found() {
        let registry = KeyRegistry::new();
        registry.update(key_set());
        assert!(registry.get("expired").is_none());
    }

    #[test]
    fn test_has_scopes() {
        let info = KeyInfo::new("k").with_scopes(["read", "write"]);
        assert!(info.has_scopes::<&str>(&[]));
        assert!(info.has_scopes(&["read"]));
        assert!(info.has_scopes(&["read", "write"]));
        assert!(!info.has_scopes(&["read", "admin"]));
        assert!(info.has_scope("write"));
    }

    #[test]
    fn test_deserialize_hub_key_set() {
        let json = r#"{
            "salt": "abc",
            "keys": {
                "deadbeef": {"key_id": "k1", "scopes": ["read"], "expires_at": null}
            }
        }"#;
        let set: KeySet = serde_json::from_str(json).unwrap();
        assert_eq!(set.salt, "abc");
        assert!(set.keys["deadbeef"].has_scope("read"));
    }

    #[tokio::test]
    async fn test_refresh_swaps_snapshot() {
        let mut transport = MockHubTransport::new();
        transport.expect_fetch_keys().times(1).returning(|| Ok(key_set()));

        let registry = KeyRegistry::new();
        let count = registry.refresh(&transport).await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.state(), KeyRegistryState::Ready);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let mut transport = MockHubTransport::new();
        transport
            .expect_fetch_keys()
            .times(1)
            .returning(|| Err(HubError::Network("connection refused".to_string())));

        let registry = KeyRegistry::new();
        registry.update(key_set());
        assert!(registry.refresh(&transport).await.is_err());

        assert_eq!(registry.state(), KeyRegistryState::Ready);
        assert_eq!(registry.get("secret-1").unwrap().key_id, "k1");
    }

    #[tokio::test]
    async fn test_failed_first_refresh_stays_uninitialized() {
        let mut transport = MockHubTransport::new();
        transport
            .expect_fetch_keys()
            .returning(|| Err(HubError::Timeout(1000)));

        let registry = KeyRegistry::new();
        assert!(registry.refresh(&transport).await.is_err());
        assert_eq!(registry.state(), KeyRegistryState::Uninitialized);
    }
}
