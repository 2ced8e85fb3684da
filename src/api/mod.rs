pub mod documents;
pub mod pagination;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub use pagination::{fetch_all, Connection, PageExtractor, PageInfo};
pub use queries::LinearApi;

pub const DEFAULT_ENDPOINT: &str = "https://api.linear.app/graphql";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON body POSTed to the GraphQL endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    pub variables: Map<String, Value>,
    #[serde(rename = "operationName")]
    pub operation_name: String,
}

/// An HTTP response before any GraphQL-level interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carries one GraphQL request to the remote service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: &GraphqlRequest) -> Result<RawResponse>;
}

/// Options for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub endpoint: url::Url,
    pub timeout: Duration,
}

impl HttpOptions {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint {endpoint}: {e}")))?;
        match endpoint.scheme() {
            "https" | "http" => Ok(Self { endpoint, timeout }),
            other => Err(Error::Config(format!(
                "unsupported endpoint scheme: {other}"
            ))),
        }
    }
}

/// `reqwest`-backed transport. The credential is sent verbatim in the
/// `Authorization` header.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpTransport {
    pub fn new(token: &str, options: &HttpOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(token.trim())
            .map_err(|_| Error::Config("API token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("linealyzer/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: options.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &GraphqlRequest) -> Result<RawResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// Executes GraphQL operations and turns transport or GraphQL failures into errors.
#[derive(Clone)]
pub struct GraphqlClient {
    transport: Arc<dyn Transport>,
}

impl GraphqlClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Run one operation and return its `data` member.
    pub async fn execute(
        &self,
        operation: &str,
        query: &str,
        variables: Map<String, Value>,
    ) -> Result<Value> {
        let request = GraphqlRequest {
            query: query.to_string(),
            variables,
            operation_name: operation.to_string(),
        };
        let response = self.transport.post(&request).await?;
        if !response.is_success() {
            return Err(Error::Transport {
                status: response.status,
                reason: response.reason,
            });
        }

        let parsed: GraphqlResponse = serde_json::from_str(&response.body)
            .map_err(|e| Error::Decode(format!("{operation}: {e}")))?;
        if let Some(errors) = parsed.errors.filter(|errs| !errs.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(Error::Remote(messages.join(", ")));
        }
        Ok(parsed.data.unwrap_or(Value::Null))
    }
}
