//! Shared fixtures for metadata provider integration tests.

#![allow(dead_code)]

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

use zentinel_agent_metadata::metadata::{RefreshPolicy, RemoteSource};

pub const METADATA_PATH: &str = "/federation.xml";

/// Mock metadata publisher.
pub struct MockMetadataServer {
    pub server: MockServer,
}

impl MockMetadataServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), METADATA_PATH)
    }

    pub fn source(&self) -> RemoteSource {
        RemoteSource::new(&self.url()).unwrap()
    }

    /// Serve `response` for every GET of the metadata document.
    pub async fn mock_response(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Serve `response` for the next `times` GETs only.
    pub async fn mock_response_times(&self, response: ResponseTemplate, times: u64) {
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(response)
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Serve a plain XML document.
    pub async fn mock_document(&self, xml: &str) {
        self.mock_response(xml_response(xml)).await;
    }

    /// Serve `documents` in turn, one per request, starting over at the end.
    pub async fn mock_rotating(&self, documents: Vec<String>) {
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(RotatingDocuments {
                documents,
                served: AtomicUsize::new(0),
            })
            .mount(&self.server)
            .await;
    }

    /// Answer 304 when the client presents `etag`.
    pub async fn mock_not_modified(&self, etag: &str) {
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .and(header("If-None-Match", etag))
            .respond_with(ResponseTemplate::new(304))
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    pub async fn requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Raw value of `name` on the `index`th request received.
    pub async fn request_header(&self, index: usize, name: &str) -> Option<String> {
        self.requests()
            .await
            .get(index)
            .and_then(|r| r.headers.get(name))
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }
}

struct RotatingDocuments {
    documents: Vec<String>,
    served: AtomicUsize,
}

impl Respond for RotatingDocuments {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.served.fetch_add(1, Ordering::SeqCst);
        xml_response(&self.documents[n % self.documents.len()])
    }
}

pub fn xml_response(xml: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "application/samlmetadata+xml")
        .set_body_string(xml)
}

/// Minimal entity metadata with optional root attributes.
pub fn entity_xml(entity_id: &str, attributes: &str) -> String {
    format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}" {}>
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="{}/sso"/>
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
        entity_id, attributes, entity_id
    )
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Policy that refreshes every few tens of milliseconds.
pub fn fast_policy() -> RefreshPolicy {
    RefreshPolicy {
        min_refresh_delay: Duration::from_millis(50),
        max_refresh_delay: Duration::from_millis(100),
        refresh_delay_factor: 0.5,
        require_valid_metadata: false,
        failure_backoff: Some(Duration::from_millis(50)),
    }
}
