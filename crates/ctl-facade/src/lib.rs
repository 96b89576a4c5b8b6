//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Question/answer rendezvous with the testing facade."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! Procedures pose questions to an external facade and block until the
//! facade posts the answer back to the callback endpoint.

pub mod callback;
pub mod client;
pub mod error;
pub mod question;
pub mod rendezvous;
pub mod signal;
pub mod stub;

pub use callback::{spawn_callback, CALLBACK_PATH};
pub use client::{FacadeClient, FacadeTransport};
pub use error::AskError;
pub use question::{Answer, AnswerOption, AnswerPayload, AnswerValue, Question, QuestionType};
pub use rendezvous::{DeliveryOutcome, RendezvousEngine};
pub use signal::EarlyAnswerSignal;
pub use stub::{spawn_stub, FacadeStub};
