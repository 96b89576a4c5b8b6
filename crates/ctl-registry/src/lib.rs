//! ---
//! ctl_section: "04-mock-registry"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Mock registry crate exports."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! Mock registry presented to the controller under test: a keyed in-memory
//! store behind registration and query HTTP APIs, plus the client the harness
//! uses to seed it.

pub mod api;
pub mod client;
pub mod store;

pub use api::{router, spawn_registry, RegistrationRequest};
pub use client::{RegistryClient, RegistryClientError};
pub use store::{Registration, RegistryError, RegistryStore, ResourceType};
