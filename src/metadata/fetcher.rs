//! Conditional HTTP retrieval of the remote metadata document.

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, ETAG,
    IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::MetadataError;

/// Encodings advertised to the metadata source.
pub const ACCEPTED_ENCODINGS: &str = "gzip,deflate";

/// Default time to wait for the metadata server to respond.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP basic auth credentials for the metadata source.
#[derive(Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the metadata lives. Fixed once a provider is built.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    url: Url,
    credentials: Option<BasicCredentials>,
    timeout: Duration,
}

impl RemoteSource {
    /// Create a source for an HTTP(S) URL.
    pub fn new(url: &str) -> Result<Self, MetadataError> {
        let url = Url::parse(url)
            .map_err(|e| MetadataError::Configuration(format!("Illegal URL syntax '{}': {}", url, e)))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(MetadataError::Configuration(format!(
                "metadata URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if url.host_str().is_none() {
            return Err(MetadataError::Configuration(
                "metadata URL has no host".to_string(),
            ));
        }

        Ok(Self {
            url,
            credentials: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Send HTTP basic auth credentials with every request to this source.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(BasicCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Identifier recorded on cached documents.
    pub fn identifier(&self) -> &str {
        self.url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Validators from the last applied response, replayed as conditional request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalToken {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ConditionalToken {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Merge validators captured from a 200 response. A header the server
    /// omitted keeps the previously stored value.
    pub fn apply(&mut self, update: &TokenUpdate) {
        if let Some(ref etag) = update.etag {
            self.etag = Some(etag.clone());
        }
        if let Some(ref last_modified) = update.last_modified {
            self.last_modified = Some(last_modified.clone());
        }
    }

    pub fn clear(&mut self) {
        self.etag = None;
        self.last_modified = None;
    }

    /// Conditional request headers for this token. Values that are not legal
    /// header values are skipped.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, IF_NONE_MATCH, self.etag.as_deref());
        insert_header(&mut headers, IF_MODIFIED_SINCE, self.last_modified.as_deref());
        headers
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: Option<&str>) {
    if let Some(value) = value {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, "Cached validator is not a valid header value, skipping"),
        }
    }
}

/// Validators carried by a 200 response. `None` means the header was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// A 200 response body together with the headers the pipeline needs.
#[derive(Debug, Clone)]
pub struct FetchedMetadata {
    /// Body exactly as received (possibly compressed).
    pub body: Vec<u8>,
    /// Content-Encoding reported by the server.
    pub content_encoding: Option<String>,
    pub token: TokenUpdate,
}

/// Result of one conditional retrieval attempt.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 304: the cached document is still current.
    NotModified,
    Fetched(FetchedMetadata),
}

/// Performs conditional GETs against a [`RemoteSource`].
#[derive(Debug)]
pub struct HttpFetcher {
    source: RemoteSource,
    http_client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher for the given source.
    pub fn new(source: RemoteSource) -> Result<Self, MetadataError> {
        let http_client = reqwest::Client::builder()
            .timeout(source.timeout())
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| MetadataError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            source,
            http_client,
        })
    }

    pub fn source(&self) -> &RemoteSource {
        &self.source
    }

    /// Issue one conditional GET. Shared state is never touched here; the
    /// caller decides whether to commit the returned validators.
    pub async fn fetch(&self, token: &ConditionalToken) -> Result<FetchOutcome, MetadataError> {
        let url = self.source.identifier();

        let mut request = self
            .http_client
            .get(self.source.url().clone())
            .header(CONNECTION, "close")
            .header(ACCEPT_ENCODING, ACCEPTED_ENCODINGS)
            .headers(token.headers());

        if let Some(ref credentials) = self.source.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        debug!(url = %url, conditional = !token.is_empty(), "Attempting to fetch metadata document");

        let response = request.send().await.map_err(|e| MetadataError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(url = %url, "Metadata document has not changed since last retrieval");
            return Ok(FetchOutcome::NotModified);
        }

        if status != StatusCode::OK {
            return Err(MetadataError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let token = TokenUpdate {
            etag: header_string(headers, ETAG),
            last_modified: header_string(headers, LAST_MODIFIED),
        };
        let content_encoding = header_string(headers, CONTENT_ENCODING);

        let body = response.bytes().await.map_err(|e| MetadataError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        debug!(url = %url, bytes = body.len(), "Fetched metadata document");

        Ok(FetchOutcome::Fetched(FetchedMetadata {
            body: body.to_vec(),
            content_encoding,
            token,
        }))
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
