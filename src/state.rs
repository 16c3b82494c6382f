use std::collections::BTreeMap;

use tokio::sync::Mutex;

use crate::domain::{Container, InterfaceResult, NetConf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    NetworkConfig,
    Container,
    Interfaces,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkConfig => "network configuration",
            Self::Container => "container",
            Self::Interfaces => "container interfaces",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound { kind: ResourceKind, key: String },
    Conflict { kind: ResourceKind, key: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, key } => write!(f, "{kind} not found: {key}"),
            Self::Conflict { kind, key } => write!(f, "{kind} already exists: {key}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A named, lock-guarded map. The lock is only held for the map access
/// itself; callers never see the underlying `BTreeMap`.
pub struct KeyedStore<V> {
    kind: ResourceKind,
    entries: Mutex<BTreeMap<String, V>>,
}

impl<V: Clone> KeyedStore<V> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Inserts or replaces. Returns `true` when an existing entry was replaced.
    pub async fn put(&self, key: impl Into<String>, value: V) -> bool {
        self.entries
            .lock()
            .await
            .insert(key.into(), value)
            .is_some()
    }

    pub async fn insert_unique(&self, key: impl Into<String>, value: V) -> Result<(), StoreError> {
        let key = key.into();
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&key) {
            return Err(StoreError::Conflict {
                kind: self.kind,
                key,
            });
        }
        entries.insert(key, value);
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<V, StoreError> {
        self.entries
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| self.not_found(key))
    }

    pub async fn list(&self) -> Vec<V> {
        self.entries.lock().await.values().cloned().collect()
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| self.not_found(key))
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn not_found(&self, key: &str) -> StoreError {
        StoreError::NotFound {
            kind: self.kind,
            key: key.to_string(),
        }
    }
}

pub type NetworkConfigStore = KeyedStore<NetConf>;
pub type ContainerStore = KeyedStore<Container>;
pub type InterfaceStore = KeyedStore<Vec<InterfaceResult>>;

/// The agent's volatile cache. The three stores are independent: nothing
/// ties a container to its interfaces or to a network configuration.
pub struct AgentStore {
    pub networks: NetworkConfigStore,
    pub containers: ContainerStore,
    pub interfaces: InterfaceStore,
}

impl AgentStore {
    pub fn new() -> Self {
        Self {
            networks: KeyedStore::new(ResourceKind::NetworkConfig),
            containers: KeyedStore::new(ResourceKind::Container),
            interfaces: KeyedStore::new(ResourceKind::Interfaces),
        }
    }
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::new()
    }
}
