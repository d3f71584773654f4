//! Call-dispatch client
//!
//! The client holds no per-operation code. A [`Route`] accumulates the
//! segments of an operation name and derives its path with the same
//! [`route_path`] the router compiler uses, so every operation the server
//! registers is callable as soon as it exists.
//!
//! # Example
//!
//! ```rust,ignore
//! use typed_rpc::client::Client;
//!
//! let client = Client::new("http://127.0.0.1:3210")?.with_bearer_token(api_key);
//!
//! // Queries: every argument field is codec-encoded into the query string.
//! let usage = client.at("project").at("getUsage").fetch(()).await?;
//! let reset = usage.get("resetDate").and_then(RichValue::as_date);
//!
//! // Mutations: the body is a JSON object of codec-encoded fields.
//! client
//!     .at("project.setDiscordID")
//!     .send(RichValue::object([("discordId", "123456789")]))
//!     .await?;
//! ```
//!
//! A name that matches no operation is not an error here; the server answers
//! 404 and the call fails with [`ClientError::Http`].

use crate::codec::{self, CodecError, RichValue};
use crate::config::DEFAULT_BASE_PATH;
use crate::error::{ErrorBody, ErrorType};
use crate::procedure::STRUCTURED_CONTENT_TYPE;
use crate::router::route_path;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

/// Failure of a remote call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a failure status
    #[error("{status}: {} ({})", body.message, body.kind)]
    Http { status: StatusCode, body: ErrorBody },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot decode response: {0}")]
    Decode(#[from] CodecError),

    #[error("cannot deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("invalid base URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ClientError {
    /// HTTP status of a failed response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }

    /// Error envelope of a failed response.
    pub fn body(&self) -> Option<&ErrorBody> {
        match self {
            Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Entry point for calling a compiled router over HTTP.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    base_path: String,
    headers: Vec<(String, String)>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client for the server at `base_url`, using the default base path.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            base_path: DEFAULT_BASE_PATH.to_string(),
            headers: Vec::new(),
        })
    }

    /// Must match the `base_path` the router was compiled with.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Send `Authorization: Bearer <token>` with every call.
    #[must_use]
    pub fn with_bearer_token(self, token: impl fmt::Display) -> Self {
        self.with_header(AUTHORIZATION.as_str(), format!("Bearer {}", token))
    }

    /// Send an extra header with every call.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Use a preconfigured `reqwest` client (timeouts, proxies, TLS).
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Start a route at `name`; dotted names are split into segments.
    pub fn at(&self, name: &str) -> Route {
        Route {
            client: self.clone(),
            segments: Vec::new(),
        }
        .at(name)
    }
}

/// An operation path being accumulated on a [`Client`].
#[derive(Debug, Clone)]
pub struct Route {
    client: Client,
    segments: Vec<String>,
}

impl Route {
    /// Descend into `name`; dotted names are split into segments.
    #[must_use]
    pub fn at(mut self, name: &str) -> Self {
        self.segments
            .extend(name.split('.').filter(|s| !s.is_empty()).map(str::to_string));
        self
    }

    /// Dotted operation name
    pub fn name(&self) -> String {
        self.segments.join(".")
    }

    /// Path of the route, as the router compiler names it
    pub fn path(&self) -> String {
        route_path(&self.client.base_path, &self.segments)
    }

    /// Absolute URL of the route.
    pub fn url(&self) -> Result<Url, ClientError> {
        let mut url = self.client.base_url.clone();
        let path = self.path();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.client.base_url.to_string()))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Call a query: GET with every argument field codec-encoded into the
    /// query string.
    pub async fn fetch(&self, args: impl Into<RichValue>) -> Result<RichValue, ClientError> {
        let mut url = self.url()?;
        match args.into() {
            RichValue::Undefined | RichValue::Null => {}
            RichValue::Object(fields) => {
                let mut pairs = url.query_pairs_mut();
                for (name, value) in &fields {
                    pairs.append_pair(name, &codec::encode(value));
                }
            }
            other => {
                return Err(ClientError::InvalidArguments(format!(
                    "query arguments must be an object, got {}",
                    other.kind()
                )));
            }
        }
        self.dispatch(Method::GET, url, None).await
    }

    /// Call a mutation: POST with a JSON object body whose fields are each
    /// codec-encoded.
    pub async fn send(&self, args: impl Into<RichValue>) -> Result<RichValue, ClientError> {
        let body = match args.into() {
            RichValue::Undefined => Value::Object(serde_json::Map::new()),
            RichValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(codec::encode(value))))
                    .collect(),
            ),
            other => Value::String(codec::encode(&other)),
        };
        let url = self.url()?;
        self.dispatch(Method::POST, url, Some(body.to_string())).await
    }

    /// [`fetch`](Self::fetch) and deserialize the plain projection.
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        args: impl Into<RichValue>,
    ) -> Result<T, ClientError> {
        let value = self.fetch(args).await?;
        Ok(serde_json::from_value(value.to_plain_json())?)
    }

    /// [`send`](Self::send) and deserialize the plain projection.
    pub async fn send_as<T: DeserializeOwned>(
        &self,
        args: impl Into<RichValue>,
    ) -> Result<T, ClientError> {
        let value = self.send(args).await?;
        Ok(serde_json::from_value(value.to_plain_json())?)
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<RichValue, ClientError> {
        trace!(operation = %self.name(), method = %method, url = %url, "Dispatching call");

        let mut request = self.client.http.request(method, url);
        for (name, value) in &self.client.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let structured = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(STRUCTURED_CONTENT_TYPE));
        let text = response.text().await?;

        if !status.is_success() {
            debug!(operation = %self.name(), status = status.as_u16(), "Call failed");
            return Err(ClientError::Http {
                status,
                body: error_body(status, &text),
            });
        }

        if structured {
            return Ok(codec::decode(&text)?);
        }
        if text.trim().is_empty() {
            return Ok(RichValue::Undefined);
        }
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ClientError::Decode(CodecError::InvalidJson(e.to_string())))?;
        Ok(RichValue::from(json))
    }
}

/// Parse the error envelope, or synthesize one when the body is not one.
fn error_body(status: StatusCode, text: &str) -> ErrorBody {
    serde_json::from_str(text).unwrap_or_else(|_| ErrorBody {
        error: status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string(),
        message: text.to_string(),
        kind: if status.is_server_error() {
            ErrorType::UnknownError
        } else {
            ErrorType::HttpException
        },
        issues: Vec::new(),
        cause: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new("http://127.0.0.1:3210").unwrap()
    }

    #[test]
    fn test_paths_mirror_the_compiler() {
        let route = client().at("project").at("getUsage");
        assert_eq!(route.name(), "project.getUsage");
        assert_eq!(route.path(), route_path("/api", &["project", "getUsage"]));
        assert_eq!(
            route.url().unwrap().as_str(),
            "http://127.0.0.1:3210/api/project/getUsage"
        );
    }

    #[test]
    fn test_dotted_names_split() {
        let dotted = client().at("category.getEventCategories");
        let nested = client().at("category").at("getEventCategories");
        assert_eq!(dotted.path(), nested.path());
    }

    #[test]
    fn test_base_url_with_prefix() {
        let route = Client::new("http://localhost:8080/gateway/")
            .unwrap()
            .with_base_path("/rpc")
            .at("health");
        assert_eq!(
            route.url().unwrap().as_str(),
            "http://localhost:8080/gateway/rpc/health"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            Client::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            Client::new("mailto:ops@example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_body_fallback() {
        let body = error_body(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(body.error, "Bad Gateway");
        assert_eq!(body.message, "upstream down");
        assert_eq!(body.kind, ErrorType::UnknownError);

        let body = error_body(
            StatusCode::FORBIDDEN,
            r#"{"error":"Forbidden","message":"Upgrade your plan","type":"HTTPException"}"#,
        );
        assert_eq!(body.message, "Upgrade your plan");
        assert_eq!(body.kind, ErrorType::HttpException);
    }
}
