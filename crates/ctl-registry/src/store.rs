//! ---
//! ctl_section: "04-mock-registry"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Keyed resource store backing the mock registry."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Resource types accepted by the registration API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Node,
    Device,
    Source,
    Flow,
    Sender,
    Receiver,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Node,
        ResourceType::Device,
        ResourceType::Source,
        ResourceType::Flow,
        ResourceType::Sender,
        ResourceType::Receiver,
    ];

    /// Singular name used in registration bodies (`"type": "receiver"`).
    pub fn singular(&self) -> &'static str {
        match self {
            ResourceType::Node => "node",
            ResourceType::Device => "device",
            ResourceType::Source => "source",
            ResourceType::Flow => "flow",
            ResourceType::Sender => "sender",
            ResourceType::Receiver => "receiver",
        }
    }

    /// Plural name used in URL paths (`/receivers/{id}`).
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceType::Node => "nodes",
            ResourceType::Device => "devices",
            ResourceType::Source => "sources",
            ResourceType::Flow => "flows",
            ResourceType::Sender => "senders",
            ResourceType::Receiver => "receivers",
        }
    }

    /// Parse the plural path form.
    pub fn from_plural(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.plural() == value)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

impl FromStr for ResourceType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.singular() == s)
            .ok_or_else(|| RegistryError::UnknownType(s.to_owned()))
    }
}

/// Failures raised by the store and surfaced by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown resource type '{0}'")]
    UnknownType(String),
    #[error("resource payload is missing a string 'id'")]
    MissingId,
    #[error("{kind} {id} is not registered")]
    NotFound { kind: ResourceType, id: String },
    #[error("registry is disabled")]
    Disabled,
}

/// Outcome of a registration POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Updated,
}

#[derive(Debug)]
struct StoreInner {
    enabled: bool,
    query_api_called: bool,
    resources: IndexMap<(ResourceType, String), Value>,
}

/// In-memory registry contents. Insertion order is kept so query listings are
/// stable across a run.
#[derive(Debug)]
pub struct RegistryStore {
    inner: RwLock<StoreInner>,
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                enabled: true,
                query_api_called: false,
                resources: IndexMap::new(),
            }),
        }
    }

    pub fn enable(&self) {
        self.inner.write().enabled = true;
        info!("mock registry enabled");
    }

    pub fn disable(&self) {
        self.inner.write().enabled = false;
        info!("mock registry disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.read().enabled
    }

    /// Drop every registered resource and the query flag.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.resources.clear();
        inner.query_api_called = false;
        debug!("mock registry reset");
    }

    /// Insert or replace a resource document keyed by its `id` field.
    pub fn register(&self, kind: ResourceType, data: Value) -> Result<Registration, RegistryError> {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or(RegistryError::MissingId)?
            .to_owned();
        let mut inner = self.inner.write();
        if !inner.enabled {
            return Err(RegistryError::Disabled);
        }
        let previous = inner.resources.insert((kind, id.clone()), data);
        let outcome = if previous.is_some() {
            Registration::Updated
        } else {
            Registration::Created
        };
        debug!(%kind, resource = %id, ?outcome, "resource registered");
        Ok(outcome)
    }

    pub fn remove(&self, kind: ResourceType, id: &str) -> Result<Value, RegistryError> {
        let mut inner = self.inner.write();
        if !inner.enabled {
            return Err(RegistryError::Disabled);
        }
        inner
            .resources
            .shift_remove(&(kind, id.to_owned()))
            .ok_or_else(|| RegistryError::NotFound {
                kind,
                id: id.to_owned(),
            })
    }

    pub fn get(&self, kind: ResourceType, id: &str) -> Option<Value> {
        self.inner.read().resources.get(&(kind, id.to_owned())).cloned()
    }

    pub fn list(&self, kind: ResourceType) -> Vec<Value> {
        self.inner
            .read()
            .resources
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that the controller has used the query API.
    pub fn mark_query(&self) {
        self.inner.write().query_api_called = true;
    }

    pub fn query_api_called(&self) -> bool {
        self.inner.read().query_api_called
    }

    pub fn clear_query_flag(&self) {
        self.inner.write().query_api_called = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_reports_create_then_update() {
        let store = RegistryStore::new();
        let first = store
            .register(ResourceType::Receiver, json!({"id": "r1", "label": "a"}))
            .unwrap();
        let second = store
            .register(ResourceType::Receiver, json!({"id": "r1", "label": "b"}))
            .unwrap();
        assert_eq!(first, Registration::Created);
        assert_eq!(second, Registration::Updated);
        assert_eq!(store.get(ResourceType::Receiver, "r1").unwrap()["label"], "b");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn same_id_under_different_types_is_distinct() {
        let store = RegistryStore::new();
        store.register(ResourceType::Sender, json!({"id": "x"})).unwrap();
        store.register(ResourceType::Receiver, json!({"id": "x"})).unwrap();
        assert_eq!(store.list(ResourceType::Sender).len(), 1);
        assert_eq!(store.list(ResourceType::Receiver).len(), 1);
    }

    #[test]
    fn missing_id_is_rejected() {
        let store = RegistryStore::new();
        let err = store
            .register(ResourceType::Device, json!({"label": "no id"}))
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingId);
    }

    #[test]
    fn disabled_store_refuses_writes() {
        let store = RegistryStore::new();
        store.disable();
        let err = store
            .register(ResourceType::Node, json!({"id": "n1"}))
            .unwrap_err();
        assert_eq!(err, RegistryError::Disabled);
        store.enable();
        store.register(ResourceType::Node, json!({"id": "n1"})).unwrap();
    }

    #[test]
    fn remove_and_reset() {
        let store = RegistryStore::new();
        store.register(ResourceType::Flow, json!({"id": "f1"})).unwrap();
        store.register(ResourceType::Flow, json!({"id": "f2"})).unwrap();
        store.remove(ResourceType::Flow, "f1").unwrap();
        assert!(matches!(
            store.remove(ResourceType::Flow, "f1"),
            Err(RegistryError::NotFound { .. })
        ));
        store.mark_query();
        store.reset();
        assert!(store.is_empty());
        assert!(!store.query_api_called());
    }

    #[test]
    fn type_names_round_trip() {
        for kind in ResourceType::ALL {
            assert_eq!(kind.singular().parse::<ResourceType>().unwrap(), kind);
            assert_eq!(ResourceType::from_plural(kind.plural()), Some(kind));
        }
        assert!("sink".parse::<ResourceType>().is_err());
    }
}
