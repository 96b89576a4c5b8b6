//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Mock node emulating staged/active connection management."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! Mock node for controller testing. Senders and receivers carry a staged and
//! an active parameter set; a controller stages a binding, activates it, or
//! tears it down through the connection API, and every change to the active
//! set is pushed to the mock registry.

pub mod api;
pub mod emulator;
pub mod error;
pub mod model;
pub mod notify;
pub mod sdp;
pub mod state;

pub use api::{router, spawn_node};
pub use emulator::{ConnectionEmulator, EmulatorSettings, PatchOutcome, StagedRequest};
pub use error::ConnectionError;
pub use model::{ConnectionResource, ParameterSet, ResourceKind, StagedPatch};
pub use notify::{
    DiscardNotifier, NotifyError, RegistryNotifier, ResourceNotifier, SubscriptionUpdate,
};
pub use state::Transition;
