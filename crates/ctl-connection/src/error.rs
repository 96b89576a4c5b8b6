//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Connection emulator error taxonomy."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::model::ResourceKind;

pub type Result<T> = std::result::Result<T, ConnectionError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },
    /// The PATCH was well formed but names no transition the emulator defines.
    #[error("unsupported transition for {kind} {id}: {reason}")]
    UnsupportedTransition {
        kind: ResourceKind,
        id: String,
        reason: String,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),
}

impl ConnectionError {
    pub fn status(&self) -> StatusCode {
        match self {
            ConnectionError::NotFound { .. } | ConnectionError::UnknownResourceType(_) => {
                StatusCode::NOT_FOUND
            }
            ConnectionError::UnsupportedTransition { .. } | ConnectionError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for ConnectionError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(json!({ "code": status.as_u16(), "error": self.to_string(), "debug": null })),
        )
            .into_response()
    }
}
