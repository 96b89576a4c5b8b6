//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Resource store notifications emitted on active-state changes."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use async_trait::async_trait;
use ctl_registry::{RegistryClient, RegistryClientError, ResourceType};
use serde_json::{json, Value};
use tracing::debug;

use crate::model::ResourceKind;

/// Change in a resource's active subscription, sent to the resource store.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub kind: ResourceKind,
    pub resource_id: String,
    pub active: bool,
    pub peer_id: Option<String>,
    /// Registered document the update is applied to.
    pub document: Value,
}

impl SubscriptionUpdate {
    /// Registered document with its `subscription` block replaced.
    pub fn registry_document(&self) -> Value {
        let mut document = self.document.clone();
        if let Value::Object(map) = &mut document {
            map.insert(
                "subscription".into(),
                json!({
                    "active": self.active,
                    self.kind.peer_field(): self.peer_id,
                }),
            );
        }
        document
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("resource store rejected update: {0}")]
    Registry(#[from] RegistryClientError),
}

/// Receives active-state changes from the emulator.
#[async_trait]
pub trait ResourceNotifier: Send + Sync + 'static {
    async fn notify(&self, update: &SubscriptionUpdate) -> Result<(), NotifyError>;
}

/// Re-registers the changed resource through the registration API.
#[derive(Debug, Clone)]
pub struct RegistryNotifier {
    client: RegistryClient,
}

impl RegistryNotifier {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceNotifier for RegistryNotifier {
    async fn notify(&self, update: &SubscriptionUpdate) -> Result<(), NotifyError> {
        let kind = match update.kind {
            ResourceKind::Sender => ResourceType::Sender,
            ResourceKind::Receiver => ResourceType::Receiver,
        };
        self.client
            .register(kind, &update.registry_document())
            .await?;
        debug!(%kind, resource = %update.resource_id, active = update.active, "subscription pushed to registry");
        Ok(())
    }
}

/// Notifier that drops every update, for emulators running without a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardNotifier;

#[async_trait]
impl ResourceNotifier for DiscardNotifier {
    async fn notify(&self, _update: &SubscriptionUpdate) -> Result<(), NotifyError> {
        Ok(())
    }
}
