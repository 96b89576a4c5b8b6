//! ---
//! ctl_section: "05-networking-external-interfaces"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Outbound HTTP helper with classified failures."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
//! Outbound requests made by the harness (to the facade, to the mock registry)
//! go through [`OutboundClient`], which turns every transport-level problem into
//! a [`CommunicationError`] instead of surfacing raw `reqwest` errors.

use std::time::Duration;

use reqwest::redirect::{Attempt, Policy};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use tracing::{debug, warn};

/// Classified failure of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommunicationError {
    #[error("connection timeout")]
    Timeout,
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("redirect changed protocol")]
    ProtocolDowngrade,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("malformed response body: {0}")]
    Decode(String),
    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
enum RedirectRejected {
    #[error("too many redirects")]
    TooMany,
    #[error("redirect changed protocol")]
    Downgrade,
}

impl From<&RedirectRejected> for CommunicationError {
    fn from(rejected: &RedirectRejected) -> Self {
        match rejected {
            RedirectRejected::TooMany => CommunicationError::TooManyRedirects,
            RedirectRejected::Downgrade => CommunicationError::ProtocolDowngrade,
        }
    }
}

/// Decide whether to follow the next redirect hop. `origin_scheme` is the scheme
/// of the first request in the chain, `hops` the number of URLs already visited.
fn check_redirect(
    origin_scheme: Option<&str>,
    next_scheme: &str,
    hops: usize,
    max_redirects: usize,
) -> Result<(), RedirectRejected> {
    if origin_scheme == Some("https") && next_scheme != "https" {
        Err(RedirectRejected::Downgrade)
    } else if hops > max_redirects {
        Err(RedirectRejected::TooMany)
    } else {
        Ok(())
    }
}

fn redirect_policy(max_redirects: usize) -> Policy {
    Policy::custom(move |attempt: Attempt<'_>| {
        let origin = attempt.previous().first().map(|url| url.scheme().to_owned());
        match check_redirect(
            origin.as_deref(),
            attempt.url().scheme(),
            attempt.previous().len(),
            max_redirects,
        ) {
            Ok(()) => attempt.follow(),
            Err(rejected) => attempt.error(rejected),
        }
    })
}

fn classify(err: reqwest::Error) -> CommunicationError {
    if err.is_timeout() {
        return CommunicationError::Timeout;
    }
    if err.is_redirect() {
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            if let Some(rejected) = cause.downcast_ref::<RedirectRejected>() {
                return rejected.into();
            }
            source = cause.source();
        }
        return CommunicationError::TooManyRedirects;
    }
    if err.is_connect() {
        return CommunicationError::Connect(err.to_string());
    }
    if err.is_decode() {
        return CommunicationError::Decode(err.to_string());
    }
    CommunicationError::Request(err.to_string())
}

/// Thin wrapper over a `reqwest` client with a fixed timeout and redirect policy.
#[derive(Debug, Clone)]
pub struct OutboundClient {
    inner: Client,
}

impl OutboundClient {
    /// Build a client whose requests time out after `timeout` and follow at most
    /// `max_redirects` redirects, refusing any https → http downgrade.
    pub fn new(timeout: Duration, max_redirects: usize) -> Result<Self, CommunicationError> {
        let inner = Client::builder()
            .timeout(timeout)
            .redirect(redirect_policy(max_redirects))
            .build()
            .map_err(|err| CommunicationError::Request(err.to_string()))?;
        Ok(Self { inner })
    }

    /// Send a request with an optional JSON body. Any HTTP status is returned as a
    /// response; only transport failures become errors.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, CommunicationError> {
        debug!(%method, url, "outbound request");
        let mut request = self.inner.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|err| {
            let classified = classify(err);
            warn!(%method, url, error = %classified, "outbound request failed");
            classified
        })?;

        // Redirect policy covers the hops; this catches a final response served over
        // plain http after a secure start that the policy did not see.
        if url.starts_with("https://") && response.url().scheme() != "https" {
            return Err(CommunicationError::ProtocolDowngrade);
        }
        Ok(response)
    }

    /// Send a JSON body and require a 2xx status.
    pub async fn send_expecting_success<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, CommunicationError> {
        let response = self.send(method, url, body).await?;
        if !response.status().is_success() {
            return Err(CommunicationError::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_owned(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::Router;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn reports_connection_failures() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OutboundClient::new(Duration::from_secs(1), 5).unwrap();
        let err = client
            .send::<()>(Method::GET, &format!("http://{addr}/"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommunicationError::Connect(_)), "{err:?}");
    }

    #[tokio::test]
    async fn classifies_slow_responses_as_timeout() {
        let base = serve(Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "late"
            }),
        ))
        .await;

        let client = OutboundClient::new(Duration::from_millis(50), 5).unwrap();
        let err = client
            .send::<()>(Method::GET, &format!("{base}/slow"), None)
            .await
            .unwrap_err();
        assert_eq!(err, CommunicationError::Timeout);
    }

    #[tokio::test]
    async fn stops_redirect_loops() {
        let base = serve(Router::new().route(
            "/loop",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/loop")]).into_response() }),
        ))
        .await;

        let client = OutboundClient::new(Duration::from_secs(1), 3).unwrap();
        let err = client
            .send::<()>(Method::GET, &format!("{base}/loop"), None)
            .await
            .unwrap_err();
        assert_eq!(err, CommunicationError::TooManyRedirects);
    }

    #[test]
    fn https_to_http_redirect_is_a_downgrade() {
        assert_eq!(
            check_redirect(Some("https"), "http", 1, 10),
            Err(RedirectRejected::Downgrade)
        );
        // downgrade wins over the hop limit
        assert_eq!(
            check_redirect(Some("https"), "http", 11, 10),
            Err(RedirectRejected::Downgrade)
        );
        assert_eq!(check_redirect(Some("https"), "https", 1, 10), Ok(()));
        assert_eq!(check_redirect(Some("http"), "https", 1, 10), Ok(()));
        assert_eq!(check_redirect(Some("http"), "http", 10, 10), Ok(()));
        assert_eq!(
            check_redirect(Some("http"), "http", 11, 10),
            Err(RedirectRejected::TooMany)
        );
    }

    #[test]
    fn rejected_redirect_maps_to_communication_error() {
        let rejected = check_redirect(Some("https"), "http", 1, 10).unwrap_err();
        assert_eq!(
            CommunicationError::from(&rejected),
            CommunicationError::ProtocolDowngrade
        );
        assert_eq!(
            CommunicationError::from(&RedirectRejected::TooMany),
            CommunicationError::TooManyRedirects
        );
    }

    #[tokio::test]
    async fn non_success_status_is_classified() {
        let base = serve(Router::new().route(
            "/fail",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;

        let client = OutboundClient::new(Duration::from_secs(1), 3).unwrap();
        let url = format!("{base}/fail");
        let err = client
            .send_expecting_success(Method::POST, &url, Some(&serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CommunicationError::UnexpectedStatus {
                status: 503,
                url
            }
        );
    }
}
