//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Starts the mock servers and wires the suite context."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use ctl_common::{AppConfig, OutboundClient, ServerHandle};
use ctl_connection::{spawn_node, ConnectionEmulator, EmulatorSettings, RegistryNotifier};
use ctl_facade::{spawn_callback, FacadeClient, RendezvousEngine, CALLBACK_PATH};
use ctl_registry::{spawn_registry, RegistryClient, RegistryStore};
use tracing::{info, warn};

use crate::context::{HarnessSettings, SuiteContext};
use crate::fixtures::NodeEndpoint;
use crate::outcome::TestResult;
use crate::procedures::controller_suite;
use crate::suite::{Selection, Suite};

/// Loopback address for a listener bound to the unspecified address.
fn reachable(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
    } else {
        addr
    }
}

/// A running harness: mock registry, mock node and the answer callback,
/// plus the suite that drives them.
pub struct Harness {
    context: SuiteContext,
    suite: Suite,
    servers: Vec<ServerHandle>,
}

impl Harness {
    /// Start with the shipped controller suite.
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let suite = controller_suite(config.harness.disabled.iter().cloned());
        Self::start_with_suite(config, suite).await
    }

    pub async fn start_with_suite(config: &AppConfig, suite: Suite) -> Result<Self> {
        let http = OutboundClient::new(config.facade.request_timeout, config.facade.max_redirects)
            .context("failed to build outbound HTTP client")?;
        let advertised = config.node.advertised_host.clone();
        let mut servers = Vec::new();

        let store = Arc::new(RegistryStore::new());
        let registry = spawn_registry(config.registry.listen, store.clone())
            .await
            .context("failed to start mock registry")?;
        let registry_client = RegistryClient::new(
            http.clone(),
            format!("http://{}/", reachable(registry.local_addr())),
            config.registry.api_version.clone(),
        );
        let registry_url = format!("http://{advertised}:{}/", registry.local_addr().port());
        servers.push(registry);

        let emulator = Arc::new(ConnectionEmulator::new(
            EmulatorSettings {
                advertised_host: advertised.clone(),
                transport: config.node.transport.clone(),
            },
            Arc::new(RegistryNotifier::new(registry_client.clone())),
        ));
        let node = match spawn_node(config.node.listen, emulator.clone()).await {
            Ok(node) => node,
            Err(err) => {
                stop_all(servers).await;
                return Err(err.context("failed to start mock node"));
            }
        };
        let node_port = node.local_addr().port();
        servers.push(node);

        let transport = Arc::new(FacadeClient::new(http.clone(), config.facade.url.clone()));
        let rendezvous = Arc::new(RendezvousEngine::new(transport, String::new()));
        let callback = match spawn_callback(config.harness.callback_listen, rendezvous.clone()).await {
            Ok(callback) => callback,
            Err(err) => {
                stop_all(servers).await;
                return Err(err.context("failed to start answer callback"));
            }
        };
        let callback_host = config
            .harness
            .callback_host
            .clone()
            .unwrap_or_else(|| format!("{advertised}:{}", callback.local_addr().port()));
        rendezvous.set_callback_url(format!("http://{callback_host}{CALLBACK_PATH}"));
        servers.push(callback);

        let settings = HarnessSettings {
            question_timeout: config.harness.question_timeout,
            intro_timeout: config.harness.intro_timeout,
            outro_timeout: config.harness.outro_timeout,
            registry_url,
            query_version: config.registry.api_version.clone(),
            node: NodeEndpoint {
                base_url: format!("http://{advertised}:{node_port}"),
                host: advertised.clone(),
                port: node_port,
                connection_version: config.node.api_version.clone(),
                transport: config.node.transport.clone(),
            },
            random_seed: config.harness.random_seed,
        };
        info!(
            registry = %settings.registry_url,
            node = %settings.node.base_url,
            callback = %rendezvous.callback_url(),
            facade = %config.facade.url,
            "harness started"
        );

        let context = SuiteContext::new(settings, store, registry_client, emulator, rendezvous);
        Ok(Self {
            context,
            suite,
            servers,
        })
    }

    pub fn context(&self) -> &SuiteContext {
        &self.context
    }

    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    pub async fn run(&self, selection: &Selection) -> Result<Vec<TestResult>> {
        self.suite.run(&self.context, selection).await
    }

    /// Run until `stop` resolves. An interrupted run still tears the suite
    /// down, so the facade is cleared and the registry disabled; it yields
    /// `None`.
    pub async fn run_until<F>(&self, selection: &Selection, stop: F) -> Option<Result<Vec<TestResult>>>
    where
        F: Future,
    {
        tokio::select! {
            results = self.run(selection) => Some(results),
            _ = stop => {
                warn!(suite = %self.suite.name(), "run interrupted; tearing down");
                self.context.tear_down_tests().await;
                None
            }
        }
    }

    /// Stop every server in reverse start order.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.context);
        for server in self.servers.into_iter().rev() {
            server.shutdown().await?;
        }
        Ok(())
    }
}

async fn stop_all(servers: Vec<ServerHandle>) {
    for server in servers {
        if let Err(err) = server.shutdown().await {
            warn!(error = %err, "server did not stop cleanly");
        }
    }
}
