//! HTTP transport to the LiteLLM proxy.
//!
//! The resource kinds only see the [`Transport`] trait: a method, path segments,
//! query pairs and an optional JSON body go in, a status code and decoded body
//! come out. [`HttpTransport`] is the reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Proxy base URL, e.g. `http://localhost:4000`.
    pub base_url: String,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Accept invalid TLS certificates.
    pub insecure_skip_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            insecure_skip_verify: false,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// One request against the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Slash-joined path, e.g. `/model/info`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// How a resource kind spells "absent" in proxy responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFoundSignal {
    /// Message carried by the resulting [`Error::NotFound`].
    pub sentinel: &'static str,
    /// Substrings of an error message that mean the resource is absent.
    pub markers: &'static [&'static str],
}

/// Status code and decoded body of a proxy response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a successful response, or the error it stands for.
    ///
    /// A 404, or an error message containing one of the kind's markers, is
    /// tagged [`Error::NotFound`]; every other failure is an [`Error::Api`].
    pub fn into_result(self, signal: &NotFoundSignal) -> Result<Value> {
        if self.is_success() {
            return Ok(self.body);
        }
        if self.status == 404 {
            return Err(Error::NotFound(signal.sentinel));
        }

        let message = error_message(&self.body);
        if signal.markers.iter().any(|m| message.contains(m)) {
            return Err(Error::NotFound(signal.sentinel));
        }
        Err(Error::Api {
            status: self.status,
            message,
        })
    }
}

/// Pull a human-readable message out of a proxy error body.
fn error_message(body: &Value) -> String {
    let candidates = [
        body.pointer("/error/message"),
        body.get("error"),
        body.pointer("/detail/error"),
        body.get("detail"),
        body.get("message"),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Some(s) = candidate.as_str() {
            return s.to_string();
        }
    }
    match body {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sends requests to the proxy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Only failing to get a response at all is an error.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] over a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {}: {}", config.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base URL {} cannot carry a path",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()?;

        Ok(Self {
            http,
            base,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn url(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("base URL {} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(&request.segments);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url(&request)?;
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        debug!(method = %request.method, path = %request.path(), status, "Received response");

        Ok(ApiResponse::new(status, decode_body(&bytes)))
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MODEL: NotFoundSignal = NotFoundSignal {
        sentinel: "model_not_found",
        markers: &["not found", "Model id =", "model_not_found"],
    };

    #[test]
    fn test_success_returns_body() {
        let body = json!({"credential_name": "aws"});
        let resp = ApiResponse::new(200, body.clone());
        assert_eq!(resp.into_result(&MODEL).unwrap(), body);
    }

    #[test]
    fn test_404_is_not_found() {
        let err = ApiResponse::new(404, Value::Null)
            .into_result(&MODEL)
            .unwrap_err();
        assert!(err.is_target_missing());
        assert_eq!(err.to_string(), "model_not_found");
    }

    #[test]
    fn test_marker_in_message_is_not_found() {
        let body = json!({"error": {"message": "Model id = abc does not exist", "code": "400"}});
        let err = ApiResponse::new(400, body).into_result(&MODEL).unwrap_err();
        assert!(matches!(err, Error::NotFound("model_not_found")));

        let body = json!({"detail": {"error": "model_not_found"}});
        let err = ApiResponse::new(400, body).into_result(&MODEL).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_other_failures_are_api_errors() {
        let body = json!({"error": "internal server error"});
        let err = ApiResponse::new(500, body).into_result(&MODEL).unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal server error");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_request_url_building() {
        let transport = HttpTransport::new(&ClientConfig::new("http://proxy.local:4000/")).unwrap();
        let request = ApiRequest::new(Method::GET, ["credentials", "by_name", "my cred"])
            .query("model_id", "m-1");
        let url = transport.url(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://proxy.local:4000/credentials/by_name/my%20cred?model_id=m-1"
        );
        assert_eq!(request.path(), "/credentials/by_name/my cred");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpTransport::new(&ClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_decode_body_tolerates_plain_text() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(b"{\"a\":1}"), json!({"a": 1}));
        assert_eq!(decode_body(b"Bad Gateway"), json!("Bad Gateway"));
    }
}
