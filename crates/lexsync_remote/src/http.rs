//! HTTP client abstraction.
//!
//! The actual HTTP library is abstracted behind [`HttpClient`] so the
//! embedding application can plug in whatever it already ships (reqwest,
//! hyper, a platform webview bridge...). The REST backend only needs
//! "execute this request, give me status and body".

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// HTTP method subset used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Create/upsert.
    Post,
    /// Delete.
    Delete,
}

impl Method {
    /// The method name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// A request to the backend.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the backend base URL.
    pub path: String,
    /// Query string parameters, unencoded.
    pub query: Vec<(String, String)>,
    /// Headers, including the auth context.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Creates a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    pub fn with_json(mut self, body: &impl serde::Serialize) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .push(("content-type".into(), "application/json".into()));
        Ok(self)
    }

    /// Sets a raw binary body.
    pub fn with_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self.headers
            .push(("content-type".into(), "application/octet-stream".into()));
        self
    }
}

/// A response from the backend.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport seam: executes one request against the backend.
///
/// Implementations report transport-level failures (unreachable host,
/// connection reset) as the `Err` string; HTTP error statuses come back as
/// a normal [`ApiResponse`] and are classified by the caller.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Executes the request and returns the raw response.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, String>;
}
