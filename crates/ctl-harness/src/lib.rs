//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Test script driver crate exports."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! Sequences named controller test procedures. Each procedure asks the
//! operator, through the testing facade, to act with the controller and
//! then checks what the controller did against the mock registry and node.

pub mod context;
pub mod fixtures;
pub mod outcome;
pub mod procedures;
pub mod report;
pub mod runtime;
pub mod suite;

pub use context::{HarnessSettings, SuiteContext};
pub use fixtures::{FixtureResource, Fixtures, NodeEndpoint};
pub use outcome::{ProcedureError, ProcedureResult, TestOutcome, TestResult, Verdict};
pub use procedures::controller_suite;
pub use report::{render_json, render_table};
pub use runtime::Harness;
pub use suite::{Procedure, ProcedureFn, ProcedureFuture, Selection, Suite};
