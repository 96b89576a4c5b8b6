//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "In-process testing facade used by tests and the CLI."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use ctl_common::http::{CommunicationError, OutboundClient};
use ctl_common::server::{spawn_router, ServerHandle};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::question::{AnswerPayload, Question};

#[derive(Debug, Default)]
struct StubState {
    current: Option<Question>,
    received: usize,
    clears: usize,
}

/// Minimal facade: stores the question it was sent, forgets it on the clear
/// message, and posts answers back to the question's callback URL.
#[derive(Debug)]
pub struct FacadeStub {
    state: Mutex<StubState>,
    arrivals: mpsc::UnboundedSender<Question>,
    queue: tokio::sync::Mutex<mpsc::UnboundedReceiver<Question>>,
    http: OutboundClient,
}

impl FacadeStub {
    pub fn new(http: OutboundClient) -> Self {
        let (arrivals, queue) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(StubState::default()),
            arrivals,
            queue: tokio::sync::Mutex::new(queue),
            http,
        }
    }

    pub fn current_question(&self) -> Option<Question> {
        self.state.lock().current.clone()
    }

    pub fn questions_received(&self) -> usize {
        self.state.lock().received
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().clears
    }

    /// Next question posted to the stub, in arrival order.
    pub async fn next_question(&self, timeout: Duration) -> Option<Question> {
        let mut queue = self.queue.lock().await;
        tokio::time::timeout(timeout, queue.recv()).await.ok().flatten()
    }

    /// Answer `question` by posting to its callback URL.
    pub async fn answer(&self, question: &Question, response: Value) -> Result<(), CommunicationError> {
        let payload = AnswerPayload::new(question.question_id.clone(), response);
        self.http
            .send_expecting_success(Method::POST, &question.callback_url, Some(&payload))
            .await?;
        debug!(question = %question.question_id, "stub posted answer");
        Ok(())
    }

    fn accept(&self, body: Value) -> Result<(), String> {
        if body.get("clear").is_some() {
            let mut state = self.state.lock();
            state.current = None;
            state.clears += 1;
            info!("facade cleared");
            return Ok(());
        }
        let question: Question = serde_json::from_value(body).map_err(|err| err.to_string())?;
        info!(question = %question.question_id, kind = %question.kind, text = %question.question, "question received");
        {
            let mut state = self.state.lock();
            state.current = Some(question.clone());
            state.received += 1;
        }
        let _ = self.arrivals.send(question);
        Ok(())
    }
}

fn handlers() -> MethodRouter<Arc<FacadeStub>> {
    get(show_question).post(receive)
}

/// Router serving the stub at `path` (with and without trailing slash).
pub fn router(stub: Arc<FacadeStub>, path: &str) -> Router {
    let trimmed = path.trim_end_matches('/');
    let mut router = Router::new();
    if trimmed.is_empty() {
        router = router.route("/", handlers());
    } else {
        router = router
            .route(trimmed, handlers())
            .route(&format!("{trimmed}/"), handlers());
    }
    router.with_state(stub)
}

pub async fn spawn_stub(listen: SocketAddr, path: &str, stub: Arc<FacadeStub>) -> Result<ServerHandle> {
    spawn_router("facade-stub", listen, router(stub, path)).await
}

async fn show_question(State(stub): State<Arc<FacadeStub>>) -> Json<Value> {
    match stub.current_question() {
        Some(question) => Json(json!({ "status": "Test", "question": question })),
        None => Json(json!({ "status": "Empty" })),
    }
}

async fn receive(
    State(stub): State<Arc<FacadeStub>>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    match stub.accept(body) {
        Ok(()) => (StatusCode::OK, "OK".to_owned()),
        Err(err) => {
            warn!(error = %err, "rejected malformed question");
            (StatusCode::BAD_REQUEST, err)
        }
    }
}
