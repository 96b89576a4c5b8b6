//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Failure classes of a question/answer exchange."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::time::Duration;

use ctl_common::http::CommunicationError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AskError {
    /// Another question is still outstanding.
    #[error("question {outstanding} is still awaiting an answer")]
    Busy { outstanding: String },
    #[error("problem contacting the testing facade: {0}")]
    Communication(#[from] CommunicationError),
    #[error("question {question_id} timed out after {}s", .timeout.as_secs())]
    Timeout {
        question_id: String,
        timeout: Duration,
    },
    #[error("integrity check failed: {0}")]
    Integrity(String),
    /// The pending question was reset before an answer arrived.
    #[error("question {0} was cancelled")]
    Cancelled(String),
}
