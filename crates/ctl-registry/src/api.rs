//! ---
//! ctl_section: "04-mock-registry"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Registration and query HTTP surfaces of the mock registry."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ctl_common::server::{spawn_router, ServerHandle};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::store::{Registration, RegistryError, RegistryStore, ResourceType};

/// Body of a registration POST.
#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::UnknownType(_) | RegistryError::MissingId => StatusCode::BAD_REQUEST,
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
        };
        (
            status,
            Json(json!({ "code": status.as_u16(), "error": self.to_string(), "debug": null })),
        )
            .into_response()
    }
}

/// Build the registry router (registration + query APIs).
pub fn router(store: Arc<RegistryStore>) -> Router {
    Router::new()
        .route("/x-nmos/registration/:version/resource", post(post_resource))
        .route("/x-nmos/registration/:version/resource/", post(post_resource))
        .route(
            "/x-nmos/registration/:version/resource/:types/:id",
            delete(delete_resource),
        )
        .route("/x-nmos/query/:version/:types", get(list_resources))
        .route("/x-nmos/query/:version/:types/", get(list_resources))
        .route("/x-nmos/query/:version/:types/:id", get(get_resource))
        .with_state(store)
}

/// Bind the registry on `listen` and serve it in the background.
pub async fn spawn_registry(listen: SocketAddr, store: Arc<RegistryStore>) -> Result<ServerHandle> {
    spawn_router("registry", listen, router(store)).await
}

fn ensure_enabled(store: &RegistryStore) -> Result<(), RegistryError> {
    if store.is_enabled() {
        Ok(())
    } else {
        Err(RegistryError::Disabled)
    }
}

fn parse_plural(types: &str) -> Result<ResourceType, RegistryError> {
    ResourceType::from_plural(types).ok_or_else(|| RegistryError::UnknownType(types.to_owned()))
}

async fn post_resource(
    State(store): State<Arc<RegistryStore>>,
    Path(version): Path<String>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Response, RegistryError> {
    ensure_enabled(&store)?;
    let kind: ResourceType = request.kind.parse()?;
    let id = request
        .data
        .get("id")
        .and_then(Value::as_str)
        .ok_or(RegistryError::MissingId)?
        .to_owned();
    let status = match store.register(kind, request.data.clone())? {
        Registration::Created => StatusCode::CREATED,
        Registration::Updated => StatusCode::OK,
    };
    let location = format!("/x-nmos/registration/{version}/resource/{}/{id}", kind.plural());
    Ok((status, [(header::LOCATION, location)], Json(request.data)).into_response())
}

async fn delete_resource(
    State(store): State<Arc<RegistryStore>>,
    Path((_version, types, id)): Path<(String, String, String)>,
) -> Result<StatusCode, RegistryError> {
    ensure_enabled(&store)?;
    let kind = parse_plural(&types)?;
    store.remove(kind, &id).map_err(|err| {
        warn!(%kind, resource = %id, "delete for unregistered resource");
        err
    })?;
    debug!(%kind, resource = %id, "resource deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_resources(
    State(store): State<Arc<RegistryStore>>,
    Path((_version, types)): Path<(String, String)>,
) -> Result<Json<Vec<Value>>, RegistryError> {
    ensure_enabled(&store)?;
    let kind = parse_plural(&types)?;
    store.mark_query();
    Ok(Json(store.list(kind)))
}

async fn get_resource(
    State(store): State<Arc<RegistryStore>>,
    Path((_version, types, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, RegistryError> {
    ensure_enabled(&store)?;
    let kind = parse_plural(&types)?;
    store.mark_query();
    let id = id.trim_end_matches('/');
    store
        .get(kind, id)
        .map(Json)
        .ok_or_else(|| RegistryError::NotFound {
            kind,
            id: id.to_owned(),
        })
}
