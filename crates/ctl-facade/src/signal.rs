//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Advisory signal raised when an answer arrives."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Raised whenever the rendezvous accepts an answer so that polling waits in
/// procedures can stop early. Purely advisory: the rendezvous timeout decides
/// the outcome of a question.
#[derive(Debug, Clone)]
pub struct EarlyAnswerSignal {
    state: Arc<watch::Sender<bool>>,
}

impl Default for EarlyAnswerSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl EarlyAnswerSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn set(&self) {
        self.state.send_replace(true);
    }

    pub fn reset(&self) {
        self.state.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.state.borrow()
    }

    /// Sleep for `duration` unless the signal is (or becomes) set. Returns
    /// `true` when woken by the signal.
    pub async fn sleep_or_answered(&self, duration: Duration) -> bool {
        let mut rx = self.state.subscribe();
        tokio::select! {
            woke = rx.wait_for(|set| *set) => woke.is_ok(),
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
