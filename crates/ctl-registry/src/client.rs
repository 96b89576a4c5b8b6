//! ---
//! ctl_section: "04-mock-registry"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Registration API client used to seed fixtures."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use ctl_common::http::{CommunicationError, OutboundClient};
use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::store::ResourceType;

#[derive(Debug, thiserror::Error)]
pub enum RegistryClientError {
    #[error(transparent)]
    Communication(#[from] CommunicationError),
    #[error("registration API returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("registration API failed to return a 'Location' response header")]
    MissingLocation,
    #[error("registration API 'Location' response header is incorrect: {0}")]
    BadLocation(String),
    #[error("resource payload is missing a string 'id'")]
    MissingId,
}

/// Client for the registration API of a registry (normally the mock one).
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: OutboundClient,
    base: String,
    version: String,
}

impl RegistryClient {
    /// `base` is the registry root, e.g. `http://127.0.0.1:5102/`.
    pub fn new(http: OutboundClient, base: impl Into<String>, version: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            http,
            base,
            version: version.into(),
        }
    }

    fn resource_url(&self) -> String {
        format!("{}x-nmos/registration/{}/resource", self.base, self.version)
    }

    /// Register (or re-register) a resource and return its `Location`.
    pub async fn register(
        &self,
        kind: ResourceType,
        data: &Value,
    ) -> Result<String, RegistryClientError> {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or(RegistryClientError::MissingId)?;
        let body = json!({ "type": kind.singular(), "data": data });
        let response = self
            .http
            .send(Method::POST, &self.resource_url(), Some(&body))
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryClientError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(RegistryClientError::MissingLocation)?
            .to_owned();
        let expected = format!("resource/{}/{}", kind.plural(), id);
        if !location.contains(&expected) {
            return Err(RegistryClientError::BadLocation(location));
        }
        if !location.starts_with('/') && !location.starts_with("http") {
            return Err(RegistryClientError::BadLocation(location));
        }
        debug!(%kind, resource = id, %location, "resource registered via API");
        Ok(location)
    }

    pub async fn delete(&self, kind: ResourceType, id: &str) -> Result<(), RegistryClientError> {
        let url = format!("{}/{}/{}", self.resource_url(), kind.plural(), id);
        let response = self.http.send::<()>(Method::DELETE, &url, None).await?;
        if response.status() != StatusCode::NO_CONTENT {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryClientError::UnexpectedStatus { status, body });
        }
        Ok(())
    }
}
