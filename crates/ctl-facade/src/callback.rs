//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Inbound answer endpoint called by the testing facade."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use ctl_common::server::{spawn_router, ServerHandle};
use serde_json::Value;
use tracing::{debug, warn};

use crate::question::AnswerPayload;
use crate::rendezvous::RendezvousEngine;

pub const CALLBACK_PATH: &str = "/clientfacade_response";

pub fn router(engine: Arc<RendezvousEngine>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, post(receive_answer))
        .with_state(engine)
}

/// Bind the answer callback on `listen` and serve it in the background.
pub async fn spawn_callback(listen: SocketAddr, engine: Arc<RendezvousEngine>) -> Result<ServerHandle> {
    spawn_router("callback", listen, router(engine)).await
}

/// Acknowledge straight away; the waiting procedure evaluates the answer on
/// its own time.
async fn receive_answer(
    State(engine): State<Arc<RendezvousEngine>>,
    Json(body): Json<Value>,
) -> (StatusCode, &'static str) {
    let payload = match serde_json::from_value::<AnswerPayload>(body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "answer without a name received");
            return (StatusCode::BAD_REQUEST, "Invalid JSON received");
        }
    };
    let outcome = engine.deliver(payload);
    debug!(?outcome, "answer handed to rendezvous");
    (StatusCode::OK, "OK")
}
