//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Concurrent owner of mock senders and receivers."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! The emulator owns every mock sender and receiver. Each resource sits behind
//! its own mutex so PATCHes on one resource are serialised while unrelated
//! resources proceed in parallel. A second, async lock per resource spans the
//! transition and its resource-store notification, so the store sees active
//! changes for one resource in the order they were applied.

use std::sync::Arc;

use ctl_common::time::activation_timestamp_now;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, Result};
use crate::model::{Activation, ConnectionResource, ResourceKind, StagedPatch};
use crate::notify::{ResourceNotifier, SubscriptionUpdate};
use crate::sdp::{self, StreamType};
use crate::state::Transition;

type ResourceKey = (ResourceKind, String);

/// One emulated resource. `publish` is held from the transition until the
/// resource store has been told about it; `state` only for the mutation.
#[derive(Debug)]
struct Slot {
    state: Mutex<ConnectionResource>,
    publish: tokio::sync::Mutex<()>,
}

impl Slot {
    fn new(resource: ConnectionResource) -> Self {
        Self {
            state: Mutex::new(resource),
            publish: tokio::sync::Mutex::new(()),
        }
    }
}

/// Node-level settings shared by every emulated resource.
#[derive(Debug, Clone)]
pub struct EmulatorSettings {
    /// Host reported in sender constraints and manifests.
    pub advertised_host: String,
    /// Transport URN used when a registered document names none.
    pub transport: String,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            advertised_host: "127.0.0.1".into(),
            transport: "urn:x-nmos:transport:rtp.mcast".into(),
        }
    }
}

/// One request the controller made against a `staged` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedRequest {
    pub method: String,
    pub kind: ResourceKind,
    pub resource_id: String,
    pub body: Option<Value>,
}

/// Result of a successful staged PATCH.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub transition: Transition,
    /// Response body: the staged view, carrying the activation just performed.
    pub response: Value,
}

pub struct ConnectionEmulator {
    settings: EmulatorSettings,
    resources: RwLock<IndexMap<ResourceKey, Arc<Slot>>>,
    requests: Mutex<Vec<StagedRequest>>,
    notifier: Arc<dyn ResourceNotifier>,
}

impl std::fmt::Debug for ConnectionEmulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEmulator")
            .field("settings", &self.settings)
            .field("resources", &self.resources.read().len())
            .finish()
    }
}

impl ConnectionEmulator {
    pub fn new(settings: EmulatorSettings, notifier: Arc<dyn ResourceNotifier>) -> Self {
        Self {
            settings,
            resources: RwLock::new(IndexMap::new()),
            requests: Mutex::new(Vec::new()),
            notifier,
        }
    }

    pub fn settings(&self) -> &EmulatorSettings {
        &self.settings
    }

    /// Take ownership of a resource described by its registry document. An
    /// existing resource with the same id is replaced with a fresh unbound one.
    pub fn add_document(&self, kind: ResourceKind, document: Value) -> Result<String> {
        let resource = ConnectionResource::from_document(
            kind,
            document,
            &self.settings.advertised_host,
            &self.settings.transport,
        )?;
        let id = resource.id.clone();
        self.resources
            .write()
            .insert((kind, id.clone()), Arc::new(Slot::new(resource)));
        debug!(%kind, %id, "resource added to emulator");
        Ok(id)
    }

    pub fn remove(&self, kind: ResourceKind, id: &str) -> Option<ConnectionResource> {
        let removed = self
            .resources
            .write()
            .shift_remove(&(kind, id.to_owned()))?;
        let resource = removed.state.lock().clone();
        Some(resource)
    }

    /// Drop every resource and the request log.
    pub fn clear(&self) {
        self.resources.write().clear();
        self.requests.lock().clear();
    }

    /// Resource ids of one kind in insertion order.
    pub fn ids(&self, kind: ResourceKind) -> Vec<String> {
        self.resources
            .read()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn entry(&self, kind: ResourceKind, id: &str) -> Result<Arc<Slot>> {
        self.resources
            .read()
            .get(&(kind, id.to_owned()))
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound {
                kind,
                id: id.to_owned(),
            })
    }

    /// Point-in-time copy of a resource.
    pub fn snapshot(&self, kind: ResourceKind, id: &str) -> Result<ConnectionResource> {
        let entry = self.entry(kind, id)?;
        let resource = entry.state.lock().clone();
        Ok(resource)
    }

    pub fn get_constraints(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        let entry = self.entry(kind, id)?;
        let resource = entry.state.lock();
        Ok(Value::Array(
            resource
                .constraints
                .iter()
                .cloned()
                .map(Value::Object)
                .collect(),
        ))
    }

    pub fn get_staged(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        let entry = self.entry(kind, id)?;
        let resource = entry.state.lock();
        Ok(resource.staged.to_json(kind))
    }

    pub fn get_active(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        let entry = self.entry(kind, id)?;
        let resource = entry.state.lock();
        Ok(resource.active.to_json(kind))
    }

    pub fn transport_type(&self, kind: ResourceKind, id: &str) -> Result<String> {
        let entry = self.entry(kind, id)?;
        let transport = entry.state.lock().transport.clone();
        Ok(transport)
    }

    /// Session description for a sender. Receivers have no transport file.
    pub fn transport_file(&self, id: &str) -> Result<String> {
        let entry = self.entry(ResourceKind::Sender, id)?;
        let index = self
            .ids(ResourceKind::Sender)
            .iter()
            .position(|candidate| candidate == id)
            .unwrap_or_default();
        let resource = entry.state.lock();
        let stream = resource
            .descriptor
            .document
            .get("manifest_href")
            .and_then(Value::as_str)
            .and_then(StreamType::from_manifest_href)
            .unwrap_or(StreamType::Video);
        let multicast = resource
            .active
            .transport_params
            .first()
            .and_then(|leg| leg.get("destination_ip"))
            .and_then(Value::as_str)
            .filter(|ip| *ip != "auto")
            .map(str::to_owned)
            .unwrap_or_else(|| format!("239.3.14.{}", index % 254 + 1));
        Ok(sdp::render(
            stream,
            &resource.id,
            &self.settings.advertised_host,
            &multicast,
        ))
    }

    /// Manifest served at `/{stream}.sdp`, independent of any sender.
    pub fn stream_manifest(&self, stream: StreamType) -> String {
        sdp::render(stream, "0", &self.settings.advertised_host, "239.3.14.1")
    }

    /// Apply a staged PATCH and, when the active state changed, notify the
    /// resource store. Notification failures are logged; the transition stands.
    /// Concurrent PATCHes to one resource are applied and notified one at a
    /// time.
    pub async fn patch_staged(
        &self,
        kind: ResourceKind,
        id: &str,
        body: &Value,
    ) -> Result<PatchOutcome> {
        let patch = StagedPatch::parse(kind, body)?;
        let entry = self.entry(kind, id)?;
        let _publishing = entry.publish.lock().await;

        let (outcome, update) = {
            let mut resource = entry.state.lock();
            let activation_time = activation_timestamp_now();
            let transition = resource.apply_patch(&patch, &activation_time)?;

            let mut response = resource.staged.to_json(kind);
            if transition.changes_active() {
                response["activation"] =
                    serde_json::to_value(Activation::immediate(activation_time))
                        .unwrap_or(Value::Null);
            }
            let update = transition.changes_active().then(|| SubscriptionUpdate {
                kind,
                resource_id: resource.id.clone(),
                active: resource.active.is_bound(),
                peer_id: resource.active.peer_id.clone(),
                document: resource.descriptor.document.clone(),
            });
            (PatchOutcome { transition, response }, update)
        };

        info!(%kind, %id, transition = ?outcome.transition, "staged patch applied");
        if let Some(update) = update {
            if let Err(err) = self.notifier.notify(&update).await {
                warn!(%kind, %id, error = %err, "resource store notification failed");
            }
        }
        Ok(outcome)
    }

    /// Append to the staged request log.
    pub fn record_request(
        &self,
        method: &str,
        kind: ResourceKind,
        id: &str,
        body: Option<Value>,
    ) {
        self.requests.lock().push(StagedRequest {
            method: method.to_owned(),
            kind,
            resource_id: id.to_owned(),
            body,
        });
    }

    pub fn staged_requests(&self) -> Vec<StagedRequest> {
        self.requests.lock().clone()
    }

    pub fn clear_staged_requests(&self) {
        self.requests.lock().clear();
    }
}
