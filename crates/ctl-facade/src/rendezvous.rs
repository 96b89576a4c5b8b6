//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Single-flight question/answer handoff between procedures and the callback."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! The engine holds at most one pending question. `ask` parks a oneshot sender
//! in the slot before posting the question, so an answer racing the POST
//! response is never lost. `deliver` runs on the callback handler: it takes the
//! sender out of the slot only when the answer's name matches, so a stale answer
//! can never complete a newer wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ctl_common::time::unix_seconds_now;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::client::FacadeTransport;
use crate::error::AskError;
use crate::question::{Answer, AnswerPayload, Question};
use crate::signal::EarlyAnswerSignal;

struct Pending {
    ticket: u64,
    question_id: String,
    reply: oneshot::Sender<AnswerPayload>,
}

/// What happened to an answer handed to [`RendezvousEngine::deliver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { question_id: String },
    /// Nothing is being waited for; the answer is dropped.
    NoPendingQuestion,
    /// The answer names a different question; dropped, the wait continues.
    Mismatched { expected: String, received: String },
}

pub struct RendezvousEngine {
    transport: Arc<dyn FacadeTransport>,
    callback_url: RwLock<String>,
    slot: Mutex<Option<Pending>>,
    tickets: AtomicU64,
    signal: EarlyAnswerSignal,
}

impl std::fmt::Debug for RendezvousEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousEngine")
            .field("callback_url", &*self.callback_url.read())
            .field("pending", &self.pending_question())
            .finish()
    }
}

/// Timeout advertised to the facade, rounded up so a sub-second wait is
/// never sent as zero.
fn whole_seconds(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl RendezvousEngine {
    pub fn new(transport: Arc<dyn FacadeTransport>, callback_url: impl Into<String>) -> Self {
        Self {
            transport,
            callback_url: RwLock::new(callback_url.into()),
            slot: Mutex::new(None),
            tickets: AtomicU64::new(0),
            signal: EarlyAnswerSignal::new(),
        }
    }

    pub fn callback_url(&self) -> String {
        self.callback_url.read().clone()
    }

    /// Point the facade at a different answer endpoint, e.g. once the callback
    /// listener has bound an ephemeral port.
    pub fn set_callback_url(&self, url: impl Into<String>) {
        *self.callback_url.write() = url.into();
    }

    pub fn transport(&self) -> &Arc<dyn FacadeTransport> {
        &self.transport
    }

    pub fn signal(&self) -> EarlyAnswerSignal {
        self.signal.clone()
    }

    /// Id of the question currently awaiting an answer.
    pub fn pending_question(&self) -> Option<String> {
        self.slot
            .lock()
            .as_ref()
            .map(|pending| pending.question_id.clone())
    }

    /// Post `question` and wait up to `timeout` for its answer.
    pub async fn ask(&self, mut question: Question, timeout: Duration) -> Result<Answer, AskError> {
        question.time_sent = unix_seconds_now();
        question.timeout = whole_seconds(timeout);
        question.callback_url = self.callback_url();
        let question_id = question.question_id.clone();

        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let rx = {
            let mut slot = self.slot.lock();
            if let Some(pending) = slot.as_ref() {
                return Err(AskError::Busy {
                    outstanding: pending.question_id.clone(),
                });
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(Pending {
                ticket,
                question_id: question_id.clone(),
                reply: tx,
            });
            rx
        };
        let _guard = SlotGuard {
            engine: self,
            ticket,
        };
        self.signal.reset();

        if let Err(err) = self.transport.post_question(&question).await {
            warn!(question = %question_id, error = %err, "failed to post question");
            return Err(AskError::Communication(err));
        }
        info!(question = %question_id, kind = %question.kind, timeout_secs = question.timeout, "waiting for answer");

        let payload = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(_)) => return Err(AskError::Cancelled(question_id)),
            Err(_) => {
                warn!(question = %question_id, "question timed out");
                return Err(AskError::Timeout {
                    question_id,
                    timeout,
                });
            }
        };

        question
            .validate(&payload)
            .map_err(AskError::Integrity)
            .map(|answer| {
                debug!(question = %question_id, value = ?answer.value, "answer accepted");
                answer
            })
    }

    /// Clear the slot if it still belongs to `ticket`.
    fn release(&self, ticket: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|pending| pending.ticket == ticket) {
            *slot = None;
        }
    }

    /// Hand an answer from the facade to the waiting `ask`. Never blocks.
    pub fn deliver(&self, payload: AnswerPayload) -> DeliveryOutcome {
        let pending = {
            let mut slot = self.slot.lock();
            let expected = slot.as_ref().map(|pending| pending.question_id.clone());
            match expected {
                None => None,
                Some(expected) if expected != payload.name => {
                    warn!(%expected, received = %payload.name, "discarding answer for another question");
                    return DeliveryOutcome::Mismatched {
                        expected,
                        received: payload.name,
                    };
                }
                Some(_) => slot.take(),
            }
        };

        let Some(pending) = pending else {
            warn!(received = %payload.name, "discarding answer with no question pending");
            return DeliveryOutcome::NoPendingQuestion;
        };
        let question_id = pending.question_id;
        if pending.reply.send(payload).is_err() {
            // The asker gave up between the slot check and the send.
            return DeliveryOutcome::NoPendingQuestion;
        }
        self.signal.set();
        DeliveryOutcome::Delivered { question_id }
    }

    /// Abandon any pending question; its `ask` returns `Cancelled`.
    pub fn reset(&self) {
        if let Some(pending) = self.slot.lock().take() {
            info!(question = %pending.question_id, "pending question reset");
        }
    }
}

/// Frees the slot when an `ask` ends, including when its future is dropped.
struct SlotGuard<'a> {
    engine: &'a RendezvousEngine,
    ticket: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.engine.release(self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{AnswerOption, AnswerValue, QuestionType};
    use async_trait::async_trait;
    use ctl_common::http::CommunicationError;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingTransport {
        posted: Mutex<Vec<Question>>,
        fail: bool,
    }

    #[async_trait]
    impl FacadeTransport for RecordingTransport {
        async fn post_question(&self, question: &Question) -> Result<(), CommunicationError> {
            if self.fail {
                return Err(CommunicationError::Connect("connection refused".into()));
            }
            self.posted.lock().push(question.clone());
            Ok(())
        }

        async fn clear(&self) -> Result<(), CommunicationError> {
            Ok(())
        }
    }

    fn engine() -> (Arc<RendezvousEngine>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let engine = Arc::new(RendezvousEngine::new(
            transport.clone(),
            "http://127.0.0.1:5000/clientfacade_response",
        ));
        (engine, transport)
    }

    fn radio(id: &str) -> Question {
        Question::new(QuestionType::Radio, id, "Which sender is connected?").with_answers(vec![
            AnswerOption {
                answer_id: "answer_0".into(),
                label: "Test-node-1/sender/gilmour".into(),
                description: String::new(),
                resource_id: Some("s1".into()),
                answer_str: None,
            },
        ])
    }

    async fn wait_until_pending(engine: &RendezvousEngine) {
        while engine.pending_question().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn matching_answer_completes_wait() {
        let (engine, transport) = engine();
        let asker = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ask(radio("test_05"), Duration::from_secs(5)).await })
        };
        wait_until_pending(&engine).await;

        let outcome = engine.deliver(AnswerPayload::new("test_05", json!("answer_0")));
        assert_eq!(
            outcome,
            DeliveryOutcome::Delivered {
                question_id: "test_05".into()
            }
        );

        let answer = asker.await.unwrap().unwrap();
        assert_eq!(answer.value, AnswerValue::Single("answer_0".into()));
        assert!(engine.signal().is_set());
        assert!(engine.pending_question().is_none());

        let posted = transport.posted.lock();
        assert_eq!(posted[0].callback_url, "http://127.0.0.1:5000/clientfacade_response");
        assert_eq!(posted[0].timeout, 5);
        assert!(posted[0].time_sent > 0.0);
    }

    #[tokio::test]
    async fn answer_for_other_question_does_not_complete_wait() {
        let (engine, _) = engine();
        let asker = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ask(radio("test_05_2"), Duration::from_secs(5)).await })
        };
        wait_until_pending(&engine).await;

        let outcome = engine.deliver(AnswerPayload::new("test_05_1", json!("answer_0")));
        assert!(matches!(outcome, DeliveryOutcome::Mismatched { .. }));
        assert_eq!(engine.pending_question().as_deref(), Some("test_05_2"));
        assert!(!asker.is_finished());

        engine.deliver(AnswerPayload::new("test_05_2", json!("answer_0")));
        assert!(asker.await.unwrap().is_ok());
    }

    #[test]
    fn advertised_timeout_rounds_up() {
        assert_eq!(whole_seconds(Duration::from_millis(50)), 1);
        assert_eq!(whole_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(whole_seconds(Duration::from_secs(600)), 600);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }

    #[tokio::test]
    async fn sub_second_wait_is_not_advertised_as_zero() {
        let (engine, transport) = engine();
        let _ = engine.ask(radio("q1"), Duration::from_millis(50)).await;
        assert_eq!(transport.posted.lock()[0].timeout, 1);
    }

    #[tokio::test]
    async fn timeout_clears_slot_and_late_answer_is_ignored() {
        let (engine, _) = engine();
        let err = engine
            .ask(radio("q1"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Timeout { ref question_id, .. } if question_id == "q1"));
        assert!(engine.pending_question().is_none());

        let asker = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ask(radio("q2"), Duration::from_secs(5)).await })
        };
        wait_until_pending(&engine).await;
        assert!(matches!(
            engine.deliver(AnswerPayload::new("q1", json!("answer_0"))),
            DeliveryOutcome::Mismatched { .. }
        ));
        engine.deliver(AnswerPayload::new("q2", json!("answer_0")));
        let answer = asker.await.unwrap().unwrap();
        assert_eq!(answer.question_id, "q2");
    }

    #[tokio::test]
    async fn communication_failure_returns_without_waiting() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        });
        let engine = RendezvousEngine::new(transport, "http://127.0.0.1:5000/clientfacade_response");
        let started = std::time::Instant::now();
        let err = engine
            .ask(radio("q1"), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Communication(CommunicationError::Connect(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(engine.pending_question().is_none());
    }

    #[tokio::test]
    async fn second_ask_while_pending_is_busy() {
        let (engine, _) = engine();
        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ask(radio("q1"), Duration::from_secs(5)).await })
        };
        wait_until_pending(&engine).await;

        let err = engine
            .ask(radio("q2"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AskError::Busy {
                outstanding: "q1".into()
            }
        );

        engine.reset();
        assert_eq!(
            first.await.unwrap().unwrap_err(),
            AskError::Cancelled("q1".into())
        );
    }

    #[tokio::test]
    async fn malformed_answer_is_integrity_error() {
        let (engine, _) = engine();
        let asker = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ask(radio("q1"), Duration::from_secs(5)).await })
        };
        wait_until_pending(&engine).await;
        engine.deliver(AnswerPayload::new("q1", json!(["answer_0"])));
        assert!(matches!(
            asker.await.unwrap().unwrap_err(),
            AskError::Integrity(_)
        ));
    }

    #[tokio::test]
    async fn dropped_ask_frees_the_slot() {
        let (engine, _) = engine();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(30),
            engine.ask(radio("q1"), Duration::from_secs(60)),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(engine.pending_question().is_none());
    }

    #[test]
    fn answer_without_pending_question_is_dropped() {
        let (engine, _) = engine();
        assert_eq!(
            engine.deliver(AnswerPayload::new("q1", json!(null))),
            DeliveryOutcome::NoPendingQuestion
        );
        assert!(!engine.signal().is_set());
    }
}
