//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Connection-management HTTP surface of the mock node."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use ctl_common::server::{spawn_router, ServerHandle};
use serde_json::{json, Value};
use tracing::debug;

use crate::emulator::ConnectionEmulator;
use crate::error::ConnectionError;
use crate::model::ResourceKind;
use crate::sdp::StreamType;

type SharedEmulator = Arc<ConnectionEmulator>;

const SINGLE: &str = "/x-nmos/connection/:version/single";

/// Register `path` with and without a trailing slash.
fn both(
    router: Router<SharedEmulator>,
    path: &str,
    handler: MethodRouter<SharedEmulator>,
) -> Router<SharedEmulator> {
    router
        .route(path, handler.clone())
        .route(&format!("{path}/"), handler)
}

/// Build the mock node router: connection API plus manifest files.
pub fn router(emulator: SharedEmulator) -> Router {
    let mut router = Router::new();
    router = both(router, SINGLE, get(single_root));
    router = both(router, &format!("{SINGLE}/:resources"), get(list_ids));
    router = both(router, &format!("{SINGLE}/:resources/:id"), get(resource_root));
    router = both(
        router,
        &format!("{SINGLE}/:resources/:id/constraints"),
        get(get_constraints),
    );
    router = both(
        router,
        &format!("{SINGLE}/:resources/:id/staged"),
        get(get_staged).patch(patch_staged),
    );
    router = both(router, &format!("{SINGLE}/:resources/:id/active"), get(get_active));
    router = both(
        router,
        &format!("{SINGLE}/:resources/:id/transporttype"),
        get(get_transport_type),
    );
    router = both(
        router,
        &format!("{SINGLE}/:resources/:id/transportfile"),
        get(get_transport_file),
    );
    router
        .route("/:manifest", get(get_manifest))
        .with_state(emulator)
}

/// Bind the mock node on `listen` and serve it in the background.
pub async fn spawn_node(listen: SocketAddr, emulator: SharedEmulator) -> Result<ServerHandle> {
    spawn_router("node", listen, router(emulator)).await
}

fn parse_kind(resources: &str) -> Result<ResourceKind, ConnectionError> {
    ResourceKind::from_plural(resources)
        .ok_or_else(|| ConnectionError::UnknownResourceType(resources.to_owned()))
}

async fn single_root() -> Json<Value> {
    Json(json!(["senders/", "receivers/"]))
}

async fn list_ids(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources)): Path<(String, String)>,
) -> Result<Json<Value>, ConnectionError> {
    let kind = parse_kind(&resources)?;
    let ids: Vec<String> = emulator
        .ids(kind)
        .into_iter()
        .map(|id| format!("{id}/"))
        .collect();
    Ok(Json(json!(ids)))
}

async fn resource_root(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, ConnectionError> {
    let kind = parse_kind(&resources)?;
    emulator.snapshot(kind, &id)?;
    let mut endpoints = vec!["constraints/", "staged/", "active/", "transporttype/"];
    if kind == ResourceKind::Sender {
        endpoints.push("transportfile/");
    }
    Ok(Json(json!(endpoints)))
}

async fn get_constraints(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, ConnectionError> {
    let kind = parse_kind(&resources)?;
    emulator.get_constraints(kind, &id).map(Json)
}

async fn get_staged(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, ConnectionError> {
    let kind = parse_kind(&resources)?;
    emulator.record_request("GET", kind, &id, None);
    emulator.get_staged(kind, &id).map(Json)
}

async fn patch_staged(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources, id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ConnectionError> {
    let kind = parse_kind(&resources)?;
    emulator.record_request("PATCH", kind, &id, Some(body.clone()));
    let outcome = emulator.patch_staged(kind, &id, &body).await?;
    debug!(%kind, %id, "staged patch answered");
    Ok(Json(outcome.response))
}

async fn get_active(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, ConnectionError> {
    let kind = parse_kind(&resources)?;
    emulator.get_active(kind, &id).map(Json)
}

async fn get_transport_type(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, ConnectionError> {
    let kind = parse_kind(&resources)?;
    emulator
        .transport_type(kind, &id)
        .map(|transport| Json(Value::String(transport)))
}

async fn get_transport_file(
    State(emulator): State<SharedEmulator>,
    Path((_version, resources, id)): Path<(String, String, String)>,
) -> Result<Response, ConnectionError> {
    let kind = parse_kind(&resources)?;
    if kind == ResourceKind::Receiver {
        return Err(ConnectionError::NotFound { kind, id });
    }
    let sdp = emulator.transport_file(&id)?;
    Ok(([(header::CONTENT_TYPE, "application/sdp")], sdp).into_response())
}

async fn get_manifest(
    State(emulator): State<SharedEmulator>,
    Path(manifest): Path<String>,
) -> Response {
    let stream = manifest
        .strip_suffix(".sdp")
        .and_then(StreamType::from_name);
    match stream {
        Some(stream) => (
            [(header::CONTENT_TYPE, "application/sdp")],
            emulator.stream_manifest(stream),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
