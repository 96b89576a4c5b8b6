//! ---
//! ctl_section: "05-networking-external-interfaces"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Listener bootstrap shared by the emulated HTTP surfaces."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Bind `listen` and serve `router` on a background task.
///
/// Failing to bind is the one setup error that is fatal for a harness run, so it
/// is returned with the listener name attached.
pub async fn spawn_router(
    name: &'static str,
    listen: SocketAddr,
    router: Router,
) -> Result<ServerHandle> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {name} listener {listen}"))?;
    let address = listener
        .local_addr()
        .with_context(|| format!("failed to read {name} listener address"))?;
    info!(server = name, address = %address, "listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router.layer(TraceLayer::new_for_http()))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
    let task = tokio::spawn(async move {
        if let Err(err) = server.await {
            warn!(server = name, error = %err, "server exited with error");
        }
    });

    Ok(ServerHandle {
        name,
        address,
        task,
        shutdown: shutdown_tx,
    })
}

/// Handle returned from [`spawn_router`] allowing the caller to stop the server.
#[derive(Debug)]
pub struct ServerHandle {
    name: &'static str,
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ServerHandle {
    /// Socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// `http://host:port` base URL for the bound address.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Request graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .with_context(|| format!("{} server task panicked", self.name))?;
        info!(server = self.name, "stopped");
        Ok(())
    }
}
