//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "State shared by the driver hooks and every procedure."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ctl_connection::{ConnectionEmulator, ParameterSet, ResourceKind};
use ctl_facade::{Answer, AskError, Question, RendezvousEngine};
use ctl_registry::{RegistryClient, RegistryStore, ResourceType};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::fixtures::{FixtureResource, Fixtures, NodeEndpoint};
use crate::outcome::ProcedureError;

#[derive(Debug, Clone)]
pub struct HarnessSettings {
    pub question_timeout: Duration,
    pub intro_timeout: Duration,
    pub outro_timeout: Duration,
    /// Registry root as the operator should see it, e.g. `http://10.0.0.1:5102/`.
    pub registry_url: String,
    pub query_version: String,
    pub node: NodeEndpoint,
    pub random_seed: u64,
}

pub(crate) fn registry_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Sender => ResourceType::Sender,
        ResourceKind::Receiver => ResourceType::Receiver,
    }
}

/// Everything a procedure may touch. Built once per run and passed by
/// reference into every hook and procedure.
pub struct SuiteContext {
    settings: HarnessSettings,
    registry: Arc<RegistryStore>,
    registry_client: RegistryClient,
    emulator: Arc<ConnectionEmulator>,
    rendezvous: Arc<RendezvousEngine>,
    fixtures: RwLock<Fixtures>,
    rng: Mutex<StdRng>,
}

impl SuiteContext {
    pub fn new(
        settings: HarnessSettings,
        registry: Arc<RegistryStore>,
        registry_client: RegistryClient,
        emulator: Arc<ConnectionEmulator>,
        rendezvous: Arc<RendezvousEngine>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(settings.random_seed);
        Self {
            settings,
            registry,
            registry_client,
            emulator,
            rendezvous,
            fixtures: RwLock::new(Fixtures::default()),
            rng: Mutex::new(rng),
        }
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<RegistryStore> {
        &self.registry
    }

    pub fn emulator(&self) -> &Arc<ConnectionEmulator> {
        &self.emulator
    }

    pub fn rendezvous(&self) -> &Arc<RendezvousEngine> {
        &self.rendezvous
    }

    pub fn fixtures(&self) -> Fixtures {
        self.fixtures.read().clone()
    }

    /// Query API root shown to the operator.
    pub fn query_url(&self) -> String {
        format!(
            "{}x-nmos/query/{}",
            self.settings.registry_url, self.settings.query_version
        )
    }

    /// Ask with the configured question timeout.
    pub async fn ask(&self, question: Question) -> Result<Answer, AskError> {
        self.rendezvous
            .ask(question, self.settings.question_timeout)
            .await
    }

    pub async fn ask_with_timeout(
        &self,
        question: Question,
        timeout: Duration,
    ) -> Result<Answer, AskError> {
        self.rendezvous.ask(question, timeout).await
    }

    /// A random registered fixture of `kind`.
    pub fn choose_registered(&self, kind: ResourceKind) -> Result<FixtureResource, ProcedureError> {
        let fixtures = self.fixtures.read();
        let registered = fixtures.registered(kind);
        let mut rng = self.rng.lock();
        registered
            .choose(&mut *rng)
            .map(|resource| (*resource).clone())
            .ok_or_else(|| ProcedureError::harness(format!("no registered {kind} fixtures")))
    }

    pub fn active(&self, kind: ResourceKind, id: &str) -> Result<ParameterSet, ProcedureError> {
        self.emulator
            .snapshot(kind, id)
            .map(|resource| resource.active)
            .map_err(ProcedureError::harness)
    }

    /// Seed the registry and the emulator with a fresh fixture set.
    pub async fn set_up_tests(&self) -> Result<()> {
        self.registry.reset();
        self.registry.enable();
        self.emulator.clear();

        let fixtures = {
            let mut rng = self.rng.lock();
            Fixtures::generate(&mut *rng)
        };
        let node = &self.settings.node;
        self.registry_client
            .register(ResourceType::Node, &fixtures.node_document(node))
            .await
            .context("failed to register mock node")?;
        self.registry_client
            .register(ResourceType::Device, &fixtures.device_document(node))
            .await
            .context("failed to register mock device")?;

        for kind in [ResourceKind::Sender, ResourceKind::Receiver] {
            for resource in fixtures.registered(kind) {
                let document = fixtures.resource_document(resource, node);
                self.registry_client
                    .register(registry_type(kind), &document)
                    .await
                    .with_context(|| format!("failed to register {kind} {}", resource.label))?;
                self.emulator
                    .add_document(kind, document)
                    .with_context(|| format!("failed to load {kind} {}", resource.label))?;
            }
        }
        info!(
            registry = %self.settings.registry_url,
            senders = fixtures.registered(ResourceKind::Sender).len(),
            receivers = fixtures.registered(ResourceKind::Receiver).len(),
            "registry populated"
        );
        *self.fixtures.write() = fixtures;
        Ok(())
    }

    /// Per-procedure reset: flags, request log, signal, and any connection a
    /// previous procedure left active.
    pub async fn set_up_test(&self) -> Result<()> {
        self.registry.clear_query_flag();
        self.emulator.clear_staged_requests();
        self.rendezvous.signal().reset();

        let fixtures = self.fixtures();
        for kind in [ResourceKind::Sender, ResourceKind::Receiver] {
            for resource in fixtures.registered(kind) {
                let bound = self
                    .emulator
                    .snapshot(kind, &resource.id)
                    .map(|snapshot| snapshot.active.is_bound() || snapshot.staged.is_bound())
                    .unwrap_or(true);
                if !bound {
                    continue;
                }
                let document = fixtures.resource_document(resource, &self.settings.node);
                self.emulator.add_document(kind, document.clone())?;
                self.registry_client
                    .register(registry_type(kind), &document)
                    .await
                    .with_context(|| format!("failed to reset {kind} {}", resource.label))?;
                debug!(%kind, resource = %resource.id, "connection state reset");
            }
        }
        Ok(())
    }

    pub async fn tear_down_tests(&self) {
        self.registry.disable();
        self.rendezvous.reset();
        if let Err(err) = self.rendezvous.transport().clear().await {
            warn!(error = %err, "failed to clear the testing facade");
        }
    }

    /// Connect `receiver` to `sender` through the emulator, as a controller
    /// would with an immediate activation on both ends.
    pub async fn connect(
        &self,
        sender: &FixtureResource,
        receiver: &FixtureResource,
    ) -> Result<(), ProcedureError> {
        let multicast = format!("239.3.14.{}", self.fixture_index(sender) + 1);
        let receiver_patch = json!({
            "sender_id": sender.id,
            "master_enable": true,
            "activation": {"mode": "activate_immediate"},
            "transport_params": [{"multicast_ip": multicast, "source_ip": self.settings.node.host}]
        });
        let sender_patch = json!({
            "receiver_id": receiver.id,
            "master_enable": true,
            "activation": {"mode": "activate_immediate"},
            "transport_params": [{"destination_ip": multicast, "source_ip": self.settings.node.host}]
        });
        self.emulator
            .patch_staged(ResourceKind::Sender, &sender.id, &sender_patch)
            .await
            .map_err(ProcedureError::harness)?;
        self.emulator
            .patch_staged(ResourceKind::Receiver, &receiver.id, &receiver_patch)
            .await
            .map_err(ProcedureError::harness)?;
        info!(sender = %sender.label, receiver = %receiver.label, "harness connected receiver");
        Ok(())
    }

    fn fixture_index(&self, sender: &FixtureResource) -> usize {
        self.fixtures
            .read()
            .senders
            .iter()
            .position(|s| s.id == sender.id)
            .unwrap_or_default()
    }
}
