//! HTTP transport shared by the HTTP-backed tool servers.

use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use toolhouse_core::{ToolError, ToolResult};
use tracing::{debug, error};

/// Transport-level failures, before they are attributed to a service.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Request timed out")]
    Timeout,

    #[error("API request failed: {status}")]
    Status { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HttpError {
    /// Attribute the failure to `service`.
    pub fn into_tool_error(self, service: &'static str) -> ToolError {
        match self {
            Self::Config(message) => ToolError::config(message),
            other => ToolError::upstream(service, other),
        }
    }
}

/// Thin reqwest wrapper with a fixed timeout, default headers and an
/// optional base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<url::Url>,
    service: &'static str,
}

impl HttpTransport {
    pub fn new(
        service: &'static str,
        base_url: Option<&str>,
        timeout: Duration,
        default_headers: &[(&'static str, String)],
    ) -> ToolResult<Self> {
        Self::build(service, base_url, timeout, default_headers)
            .map_err(|e| e.into_tool_error(service))
    }

    fn build(
        service: &'static str,
        base_url: Option<&str>,
        timeout: Duration,
        default_headers: &[(&'static str, String)],
    ) -> Result<Self, HttpError> {
        let mut headers = header::HeaderMap::new();
        for (name, value) in default_headers {
            headers.insert(
                header::HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| HttpError::Config(format!("Invalid header name {}", name)))?,
                header::HeaderValue::from_str(value)
                    .map_err(|_| HttpError::Config(format!("Invalid {} header value", name)))?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("toolhouse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = match base_url {
            Some(raw) => {
                let mut url = url::Url::parse(raw)?;
                // Keep the last path segment when joining relative paths.
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                Some(url)
            }
            None => None,
        };

        Ok(Self {
            client,
            base_url,
            service,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Resolve `path` against the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> ToolResult<url::Url> {
        let resolved = match &self.base_url {
            Some(base) => base.join(path.trim_start_matches('/')),
            None => url::Url::parse(path),
        };
        resolved.map_err(|e| HttpError::from(e).into_tool_error(self.service))
    }

    /// Start a request; callers add auth, query and body before sending.
    pub fn request(&self, method: Method, path: &str) -> ToolResult<RequestBuilder> {
        let url = self.url(path)?;
        debug!(service = self.service, method = %method, url = %url, "HTTP request");
        Ok(self.client.request(method, url))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, HttpError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else {
                HttpError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            service = self.service,
            status = status.as_u16(),
            body = %body,
            "HTTP error response"
        );
        Err(HttpError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ToolResult<T> {
        let result = async {
            let response = self.execute(request).await?;
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes).map_err(|e| HttpError::Decode(e.to_string()))
        }
        .await;
        result.map_err(|e| e.into_tool_error(self.service))
    }

    /// Send and discard the response body.
    pub async fn send_empty(&self, request: RequestBuilder) -> ToolResult<()> {
        self.execute(request)
            .await
            .map(|_| ())
            .map_err(|e| e.into_tool_error(self.service))
    }

    /// GET with query parameters.
    pub async fn get_json<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> ToolResult<T> {
        let request = self.request(Method::GET, path)?.query(query);
        self.send_json(request).await
    }

    /// POST a JSON body with query parameters.
    pub async fn post_json<T: DeserializeOwned, Q: Serialize + ?Sized, B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
        body: &B,
    ) -> ToolResult<T> {
        let request = self.request(Method::POST, path)?.query(query).json(body);
        self.send_json(request).await
    }
}
