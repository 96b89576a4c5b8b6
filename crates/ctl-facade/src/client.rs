//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Outbound transport to the testing facade."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use async_trait::async_trait;
use ctl_common::http::{CommunicationError, OutboundClient};
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use crate::question::Question;

/// Delivery of questions and control messages to a facade.
#[async_trait]
pub trait FacadeTransport: Send + Sync + 'static {
    async fn post_question(&self, question: &Question) -> Result<(), CommunicationError>;

    /// Tell the facade to drop whatever question it is showing.
    async fn clear(&self) -> Result<(), CommunicationError>;
}

/// HTTP transport posting to the facade's configured endpoint.
#[derive(Debug, Clone)]
pub struct FacadeClient {
    http: OutboundClient,
    url: String,
}

impl FacadeClient {
    pub fn new(http: OutboundClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FacadeTransport for FacadeClient {
    async fn post_question(&self, question: &Question) -> Result<(), CommunicationError> {
        self.http
            .send_expecting_success(Method::POST, &self.url, Some(question))
            .await?;
        debug!(question = %question.question_id, url = %self.url, "question posted to facade");
        Ok(())
    }

    async fn clear(&self) -> Result<(), CommunicationError> {
        self.http
            .send_expecting_success(Method::POST, &self.url, Some(&json!({ "clear": true })))
            .await?;
        Ok(())
    }
}
