//! ---
//! ctl_section: "01-core-functionality"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Shared primitives and utilities for the harness runtime."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! Shared primitives for the controller conformance harness.
//! This crate exposes configuration loading, logging bootstrap, the outbound
//! HTTP helper and timestamp utilities consumed across the workspace.

pub mod config;
pub mod http;
pub mod logging;
pub mod server;
pub mod time;

pub use config::{
    AppConfig, FacadeConfig, HarnessConfig, LoadedAppConfig, LoggingConfig, NodeConfig,
    RegistryConfig,
};
pub use http::{CommunicationError, OutboundClient};
pub use logging::{init_tracing, LogFormat};
pub use server::{spawn_router, ServerHandle};
