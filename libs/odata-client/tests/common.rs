#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]
use http::{HeaderMap, StatusCode};
use odata_client::{BoxError, ODataClient, Transport, TransportRequest, TransportResponse};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const BASE_URL: &str = "https://services.example.com/odata/";

/// Transport replaying scripted responses in order and recording every request.
#[derive(Clone, Default)]
pub struct FakeTransport {
    responses: Arc<Mutex<VecDeque<TransportResponse>>>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
}

impl FakeTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a 200 response with the given body.
    #[must_use]
    pub fn reply(self, body: &str) -> Self {
        self.reply_with(StatusCode::OK, HeaderMap::new(), body)
    }

    #[must_use]
    pub fn reply_with(self, status: StatusCode, headers: HeaderMap, body: &str) -> Self {
        self.responses.lock().unwrap().push_back(TransportResponse {
            status,
            headers,
            body: body.to_owned(),
        });
        self
    }

    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.uri).collect()
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, BoxError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "no scripted response left".into())
    }
}

/// Client over `transport` rooted at [`BASE_URL`].
#[must_use]
pub fn client(transport: &FakeTransport) -> ODataClient {
    ODataClient::builder(transport.clone())
        .base_url(BASE_URL)
        .build()
        .unwrap()
}

/// `BASE_URL` followed by `relative`, percent-encoded the way requests are.
#[must_use]
pub fn absolute(relative: &str) -> String {
    url::Url::parse(BASE_URL)
        .unwrap()
        .join(relative)
        .unwrap()
        .to_string()
}

/// Absolute URL for `path` with `params` percent-encoded the way the client
/// sends them.
#[must_use]
pub fn request(path: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        absolute(path)
    } else {
        absolute(&format!("{path}?{query}"))
    }
}
