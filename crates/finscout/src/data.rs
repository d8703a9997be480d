//! Remote data capabilities used by the tools.
//!
//! A [`DataSource`] answers "GET this endpoint with these parameters" and
//! knows nothing about what the payload means. Tools decide which endpoint
//! to ask and how to present the result.

use std::fmt::{self, Debug};

use async_trait::async_trait;
use finscout_core::credentials::CredentialResolver;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;

/// Credential holding the financial data API key.
pub const FINANCIAL_DATA_API_KEY: &str = "FINANCIAL_DATA_API_KEY";

/// Credential holding the web search API key.
pub const SEARCH_API_KEY: &str = "SEARCH_API_KEY";

/// A request to a data source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataQuery {
    /// Path relative to the source's base URL.
    pub endpoint: String,
    /// Query parameters, in order.
    pub params: Vec<(String, String)>,
}

impl DataQuery {
    /// Creates a query without parameters.
    #[inline]
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: vec![],
        }
    }

    /// Appends a parameter.
    #[inline]
    pub fn param<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Appends a parameter if `value` is present.
    #[inline]
    pub fn param_opt<K: Into<String>, V: ToString>(
        self,
        key: K,
        value: Option<V>,
    ) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }
}

/// What a data source returned.
#[derive(Clone, Debug, PartialEq)]
pub struct DataPayload {
    /// The decoded JSON body.
    pub data: Value,
    /// Where the data came from. Never contains credentials.
    pub source_url: String,
}

/// Errors from a data source.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The credential the source needs is not configured.
    #[error("{0} is not configured")]
    MissingCredential(String),
    /// The endpoint could not be turned into a URL.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    /// The request did not complete.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// The body is not JSON.
    #[error("response is not valid JSON: {0}")]
    Decode(String),
}

/// A remote source of JSON data.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetches `query`, authenticating with whatever `credentials` hold.
    async fn fetch(
        &self,
        query: DataQuery,
        credentials: &dyn CredentialResolver,
    ) -> Result<DataPayload, DataSourceError>;
}

/// A [`DataSource`] that issues `GET {base_url}/{endpoint}?{params}` with
/// the API key in a request header.
#[derive(Clone)]
pub struct HttpDataSource {
    client: Client,
    base_url: String,
    credential: String,
    api_key_header: String,
}

impl HttpDataSource {
    /// Creates a source for the financial data API. The key is read from
    /// [`FINANCIAL_DATA_API_KEY`] and sent as `X-API-KEY`.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: Client::new(),
            base_url,
            credential: FINANCIAL_DATA_API_KEY.to_owned(),
            api_key_header: "X-API-KEY".to_owned(),
        }
    }

    /// Reads the key from another credential.
    #[inline]
    pub fn with_credential<S: Into<String>>(mut self, credential: S) -> Self {
        self.credential = credential.into();
        self
    }

    /// Sends the key in another header.
    #[inline]
    pub fn with_api_key_header<S: Into<String>>(mut self, header: S) -> Self {
        self.api_key_header = header.into();
        self
    }

    /// Uses a preconfigured HTTP client.
    #[inline]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

impl Debug for HttpDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDataSource")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .field("api_key_header", &self.api_key_header)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch(
        &self,
        query: DataQuery,
        credentials: &dyn CredentialResolver,
    ) -> Result<DataPayload, DataSourceError> {
        let key = credentials
            .resolve(&self.credential)
            .ok_or_else(|| DataSourceError::MissingCredential(self.credential.clone()))?;

        let endpoint = query.endpoint.trim_start_matches('/');
        let raw_url = format!("{}/{endpoint}", self.base_url);
        let url = if query.params.is_empty() {
            Url::parse(&raw_url)
        } else {
            Url::parse_with_params(&raw_url, &query.params)
        }
        .map_err(|err| DataSourceError::InvalidUrl(err.to_string()))?;
        debug!("fetching {url}");

        let resp = self
            .client
            .get(url.clone())
            .header(self.api_key_header.as_str(), key.expose())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DataSourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let data = resp
            .json::<Value>()
            .await
            .map_err(|err| DataSourceError::Decode(err.to_string()))?;

        Ok(DataPayload {
            data,
            source_url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use finscout_core::credentials::Credentials;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn credentials() -> Credentials {
        Credentials::new().with(FINANCIAL_DATA_API_KEY, "fd-test")
    }

    #[tokio::test]
    async fn test_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prices/snapshot"))
            .and(query_param("ticker", "AAPL"))
            .and(header("x-api-key", "fd-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "snapshot": { "ticker": "AAPL", "price": 190.5 }
            })))
            .mount(&server)
            .await;

        let source = HttpDataSource::new(format!("{}/", server.uri()));
        let payload = source
            .fetch(
                DataQuery::new("prices/snapshot").param("ticker", "AAPL"),
                &credentials(),
            )
            .await
            .unwrap();

        assert_eq!(payload.data["snapshot"]["price"], json!(190.5));
        assert_eq!(
            payload.source_url,
            format!("{}/prices/snapshot?ticker=AAPL", server.uri())
        );
        assert!(!payload.source_url.contains("fd-test"));
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpDataSource::new(server.uri());
        let err = source
            .fetch(DataQuery::new("news").param("ticker", "ZZZZ"), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let source = HttpDataSource::new(server.uri());
        let err = source
            .fetch(DataQuery::new("prices"), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Decode(_)));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let source = HttpDataSource::new("http://127.0.0.1:9")
            .with_credential(SEARCH_API_KEY);
        let err = source
            .fetch(DataQuery::new("search"), &credentials())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "SEARCH_API_KEY is not configured");
    }
}
