//! HTTP mocking for delivery tests.

use bytes::Bytes;
use http::HeaderMap;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer as WiremockServer, ResponseTemplate,
};

/// Mock usage endpoint on a random local port.
pub struct MockServer {
    server: WiremockServer,
}

impl MockServer {
    /// Starts a new mock server.
    pub async fn start() -> Self {
        Self { server: WiremockServer::start().await }
    }

    /// Base URL of the server.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// URL for `path` on this server.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Answers every POST to `route` with `status`.
    pub async fn respond(&self, route: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers every POST to `route` with `status` and a text body.
    pub async fn respond_with_body(&self, route: &str, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answers every POST, on any path, with `status`.
    pub async fn respond_always(&self, status: u16) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers successive POSTs with `statuses` in order; later requests
    /// fall through to any mocks mounted afterwards.
    pub async fn respond_sequence(&self, statuses: &[u16]) {
        for &status in statuses {
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
    }

    /// Every request received so far.
    pub async fn received_requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| RecordedRequest {
                method: request.method.to_string(),
                path: request.url.path().to_string(),
                headers: request.headers,
                body: Bytes::from(request.body),
            })
            .collect()
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await.len();
        assert_eq!(received, expected, "expected {expected} requests, received {received}");
    }
}

/// A request captured by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method, e.g. `POST`.
    pub method: String,
    /// Request path without the query.
    pub path: String,
    /// Request headers as received.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Bytes,
}

impl RecordedRequest {
    /// Header value as text, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Body as UTF-8 text.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_server_starts() {
        let server = MockServer::start().await;
        assert!(server.url().starts_with("http://"));
        assert!(server.endpoint("/nova").ends_with("/nova"));
        server.assert_request_count(0).await;
    }
}
