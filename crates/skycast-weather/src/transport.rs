//! HTTP transport abstraction and its reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::classify::{classify_http_response, classify_transport_error};
use crate::error::{DomainError, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const USER_AGENT: &str = concat!("SkyCast/", env!("CARGO_PKG_VERSION"));

/// Raw response as seen by the data layer: status, headers and the body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    /// `None` when the server sent no bytes
    pub body: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read-only HTTP access to the weather API.
///
/// Implementations return `Ok` for every response the server produced,
/// including non-2xx statuses; `Err` is reserved for failures where no
/// response is available.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, query), level = "debug")]
    async fn get(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<HttpResponse, TransportError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let text = response.text().await?;
        tracing::debug!("{} returned {} ({} bytes)", path, status, text.len());

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body: if text.is_empty() { None } else { Some(text) },
        })
    }
}

/// Issue a GET and decode a successful JSON body, classifying every failure.
///
/// Non-2xx responses go through the HTTP classifier. A 2xx response with no
/// body (or only whitespace) is `EmptyBody`; one that does not decode as `T`
/// is `Parsing`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    path: &str,
    query: &[(&'static str, String)],
) -> Result<T, DomainError> {
    let response = transport.get(path, query).await.map_err(|e| {
        tracing::warn!("Request to {} failed: {}", path, e);
        classify_transport_error(&e)
    })?;

    if !response.is_success() {
        let error = classify_http_response(
            response.status,
            response.reason.as_deref(),
            response.body.as_deref(),
        );
        tracing::warn!("{} returned {}: {}", path, response.status, error);
        return Err(error);
    }

    let body = response
        .body
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .ok_or(DomainError::EmptyBody)?;

    serde_json::from_str(body).map_err(|e| {
        tracing::warn!("Failed to decode {} response: {}", path, e);
        DomainError::Parsing
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_passes_query_and_returns_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", "London"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-cache-key", "abc")
                    .set_body_string("[]"),
            )
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let response = transport
            .get("geo/1.0/direct", &[("q", "London".to_string())])
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.body.as_deref(), Some("[]"));
        assert_eq!(response.header("X-Cache-Key"), Some("abc"));
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let response = transport.get("/anything", &[]).await.unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.reason.as_deref(), Some("Not Found"));
        assert_eq!(response.body, None);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let transport =
            ReqwestTransport::new(&mock_server.uri(), Duration::from_millis(50)).unwrap();
        let result = transport.get("slow", &[]).await;

        assert_eq!(result, Err(TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_io() {
        // Nothing listens on port 9 locally
        let transport =
            ReqwestTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = transport.get("x", &[]).await;

        assert!(matches!(result, Err(TransportError::Io(_))), "got {:?}", result);
    }

    struct CannedTransport(Result<HttpResponse, TransportError>);

    #[async_trait]
    impl Transport for CannedTransport {
        async fn get(
            &self,
            _path: &str,
            _query: &[(&'static str, String)],
        ) -> Result<HttpResponse, TransportError> {
            self.0.clone()
        }
    }

    fn canned(status: u16, body: Option<&str>) -> CannedTransport {
        CannedTransport(Ok(HttpResponse {
            status,
            reason: None,
            headers: Vec::new(),
            body: body.map(str::to_string),
        }))
    }

    #[tokio::test]
    async fn test_get_json_decodes_success() {
        let transport = canned(200, Some("[1, 2, 3]"));
        let values: Vec<u32> = get_json(&transport, "x", &[]).await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_get_json_empty_body() {
        for body in [None, Some(""), Some("  \n")] {
            let transport = canned(200, body);
            let result: Result<Vec<u32>, _> = get_json(&transport, "x", &[]).await;
            assert_eq!(result, Err(DomainError::EmptyBody));
        }
    }

    #[tokio::test]
    async fn test_get_json_malformed_body() {
        let transport = canned(200, Some("{\"lat\":"));
        let result: Result<Vec<u32>, _> = get_json(&transport, "x", &[]).await;
        assert_eq!(result, Err(DomainError::Parsing));
    }

    #[tokio::test]
    async fn test_get_json_classifies_error_status() {
        let transport = canned(404, Some(r#"{"cod":404,"message":"not found"}"#));
        let result: Result<Vec<u32>, _> = get_json(&transport, "x", &[]).await;
        assert_eq!(result, Err(DomainError::NotFound));
    }

    #[tokio::test]
    async fn test_get_json_classifies_transport_failure() {
        let transport = CannedTransport(Err(TransportError::Timeout));
        let result: Result<Vec<u32>, _> = get_json(&transport, "x", &[]).await;
        assert_eq!(result, Err(DomainError::Timeout));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let transport =
            ReqwestTransport::new("https://example.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.base_url(), "https://example.com");
    }
}
