use crate::builder::QueryBuilder;
use crate::config::ODataClientConfig;
use crate::error::Error;
use crate::grammar::Grammar;
use crate::pager::{BoxedPageFetcher, BoxedPageFuture};
use crate::response::DecodedResponse;
use crate::transport::{Authenticator, Transport, TransportRequest};
use http::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Method};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const ODATA_VERSION_HEADER: &str = "odata-version";
const ODATA_MAX_VERSION_HEADER: &str = "odata-maxversion";
const PREFER_HEADER: &str = "prefer";

/// Entry point: owns the collaborators every query built from it shares.
///
/// `ODataClient` is cheap to clone; clones share the transport, the grammar
/// and the page-size preference.
///
/// # Example
///
/// ```ignore
/// use odata_client::{ODataClient, SortDir};
///
/// let client = ODataClient::builder(my_transport)
///     .base_url("https://services.odata.org/V4/TripPinService/")
///     .build()?;
///
/// let people = client
///     .from("People")
///     .where_op("Age", ">", 30)
///     .order_by("LastName", SortDir::Asc)
///     .take(10)
///     .get()?;
/// ```
#[derive(Clone)]
pub struct ODataClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: Url,
    config: ODataClientConfig,
    grammar: Grammar,
    transport: Arc<dyn Transport>,
    authenticator: Option<Arc<dyn Authenticator>>,
    headers: HeaderMap,
    page_size: RwLock<Option<u64>>,
}

impl fmt::Debug for ODataClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ODataClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("page_size", &*self.inner.page_size.read())
            .field("authenticated", &self.inner.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl ODataClient {
    /// Start building a client around `transport`.
    pub fn builder(transport: impl Transport + 'static) -> ODataClientBuilder {
        ODataClientBuilder::new(transport)
    }

    /// Client with the given config and the default grammar.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the base URL is empty or invalid, or
    /// if a default header is not a valid HTTP header.
    pub fn new(config: ODataClientConfig, transport: impl Transport + 'static) -> Result<Self, Error> {
        ODataClientBuilder::new(transport).config(config).build()
    }

    /// Query targeting `entity_set`.
    pub fn from(&self, entity_set: impl Into<String>) -> QueryBuilder {
        self.query().from(entity_set)
    }

    /// Query with no entity set yet.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.clone())
    }

    #[must_use]
    pub fn grammar(&self) -> &Grammar {
        &self.inner.grammar
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    #[must_use]
    pub fn config(&self) -> &ODataClientConfig {
        &self.inner.config
    }

    /// Current `Prefer: odata.maxpagesize` value.
    #[must_use]
    pub fn page_size(&self) -> Option<u64> {
        *self.inner.page_size.read()
    }

    /// Set the page size sent with every later request from this client.
    pub fn set_page_size(&self, page_size: u64) {
        *self.inner.page_size.write() = Some(page_size);
    }

    /// Strip the service root from a continuation link.
    ///
    /// Links that point elsewhere, and relative links, are returned unchanged.
    #[must_use]
    pub fn relative_link(&self, link: &str) -> String {
        link.strip_prefix(self.inner.base_url.as_str())
            .unwrap_or(link)
            .to_owned()
    }

    /// Execute one request for a relative URI and decode the response.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if `uri` cannot be resolved against the base URL
    /// - `Error::Transport` if the transport fails
    /// - `Error::HttpStatus` for a non-2xx response
    #[tracing::instrument(skip_all, fields(method = %method, uri = %uri))]
    pub fn execute(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
    ) -> Result<DecodedResponse, Error> {
        let url = self
            .inner
            .base_url
            .join(uri)
            .map_err(|e| Error::invalid_argument(format!("invalid request URI '{uri}': {e}")))?;

        let mut request = TransportRequest::new(method, url.as_str());
        request.headers = self.request_headers(body.is_some());
        request.body = body;
        request.timeout = Some(self.inner.config.timeout);

        if let Some(auth) = &self.inner.authenticator {
            auth.authenticate(&mut request);
        }

        tracing::debug!(url = %request.uri, "sending request");
        let response = self
            .inner
            .transport
            .send(request)
            .map_err(Error::Transport)?;
        tracing::debug!(status = %response.status, "received response");

        if !response.status.is_success() {
            return Err(Error::HttpStatus {
                status: response.status,
                body_preview: body_preview(&response.body, self.inner.config.body_preview_limit),
            });
        }

        Ok(DecodedResponse::decode(
            response.body,
            response.status,
            response.headers,
        ))
    }

    /// [`execute`](Self::execute) on the tokio blocking pool.
    ///
    /// Dropping the future abandons the result; the in-flight round-trip is
    /// bounded by the transport's own timeout.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute), plus `Error::Task` if the
    /// background task panicked.
    pub async fn execute_async(
        &self,
        method: Method,
        uri: String,
        body: Option<String>,
    ) -> Result<DecodedResponse, Error> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.execute(method, &uri, body)).await?
    }

    /// Fetcher used by the async pagers: resolves continuation links and
    /// executes them off the async runtime.
    pub(crate) fn page_fetcher(&self) -> BoxedPageFetcher {
        let client = self.clone();
        Box::new(move |uri: String| -> BoxedPageFuture {
            let client = client.clone();
            Box::pin(async move {
                let relative = client.relative_link(&uri);
                client.execute_async(Method::GET, relative, None).await
            })
        })
    }

    fn request_headers(&self, has_body: bool) -> HeaderMap {
        let mut headers = self.inner.headers.clone();
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Some(size) = self.page_size() {
            headers.insert(
                HeaderName::from_static(PREFER_HEADER),
                max_page_size_header(size),
            );
        }
        headers
    }
}

fn max_page_size_header(size: u64) -> HeaderValue {
    // ASCII only, cannot fail
    HeaderValue::try_from(format!("odata.maxpagesize={size}"))
        .unwrap_or_else(|_| HeaderValue::from_static("odata.maxpagesize"))
}

fn body_preview(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_owned();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Builder for [`ODataClient`].
#[must_use]
pub struct ODataClientBuilder {
    config: ODataClientConfig,
    grammar: Grammar,
    transport: Arc<dyn Transport>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl ODataClientBuilder {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            config: ODataClientConfig::default(),
            grammar: Grammar::default(),
            transport: Arc::new(transport),
            authenticator: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ODataClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn page_size(mut self, page_size: u64) -> Self {
        self.config.page_size = Some(page_size);
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .insert(name.into(), value.into());
        self
    }

    pub fn grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Hook called with every outgoing request.
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the base URL is empty or invalid, or
    /// if a default header is not a valid HTTP header.
    pub fn build(self) -> Result<ODataClient, Error> {
        let base_url = self.config.base_url()?;
        let headers = base_headers(&self.config)?;
        let page_size = RwLock::new(self.config.page_size);

        Ok(ODataClient {
            inner: Arc::new(ClientInner {
                base_url,
                config: self.config,
                grammar: self.grammar,
                transport: self.transport,
                authenticator: self.authenticator,
                headers,
                page_size,
            }),
        })
    }
}

fn base_headers(config: &ODataClientConfig) -> Result<HeaderMap, Error> {
    let header_value = |name: &str, value: &str| {
        HeaderValue::from_str(value)
            .map_err(|e| Error::configuration(format!("invalid value for header {name}: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static(ODATA_VERSION_HEADER),
        header_value("OData-Version", &config.odata_version)?,
    );
    headers.insert(
        HeaderName::from_static(ODATA_MAX_VERSION_HEADER),
        header_value("OData-MaxVersion", &config.odata_version)?,
    );
    headers.insert(USER_AGENT, header_value("User-Agent", &config.user_agent)?);

    for (name, value) in &config.default_headers {
        let header = HeaderName::try_from(name.as_str())
            .map_err(|e| Error::configuration(format!("invalid header name {name}: {e}")))?;
        headers.insert(header, header_value(name, value)?);
    }
    Ok(headers)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::transport::TransportResponse;
    use http::StatusCode;
    use parking_lot::Mutex;

    fn echo(req: TransportRequest) -> Result<TransportResponse, BoxError> {
        Ok(TransportResponse::ok(
            serde_json::json!({ "uri": req.uri }).to_string(),
        ))
    }

    #[test]
    fn test_empty_base_url_is_configuration_error() {
        let err = ODataClient::builder(echo).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_invalid_default_header_is_configuration_error() {
        let err = ODataClient::builder(echo)
            .base_url("https://svc/")
            .default_header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_relative_link() {
        let client = ODataClient::builder(echo)
            .base_url("https://svc/odata")
            .build()
            .unwrap();
        assert_eq!(
            client.relative_link("https://svc/odata/People?$skiptoken=2"),
            "People?$skiptoken=2"
        );
        assert_eq!(client.relative_link("People?$skip=2"), "People?$skip=2");
        assert_eq!(
            client.relative_link("https://other/People"),
            "https://other/People"
        );
    }

    #[test]
    fn test_request_carries_protocol_headers_and_auth() {
        let seen: Arc<Mutex<Vec<TransportRequest>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let client = ODataClient::builder(move |req: TransportRequest| -> Result<TransportResponse, BoxError> {
            sink.lock().push(req);
            Ok(TransportResponse::ok("{}"))
        })
        .base_url("https://svc/odata/")
        .timeout(Duration::from_secs(5))
        .default_header("x-tenant", "acme")
        .authenticator(|req: &mut TransportRequest| {
            req.headers
                .insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        })
        .build()
        .unwrap();

        client.set_page_size(25);
        client
            .execute(Method::POST, "People", Some("{}".to_owned()))
            .unwrap();

        let seen = seen.lock();
        let req = &seen[0];
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.uri, "https://svc/odata/People");
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
        assert_eq!(req.headers["odata-version"], "4.0");
        assert_eq!(req.headers["prefer"], "odata.maxpagesize=25");
        assert_eq!(req.headers["content-type"], "application/json");
        assert_eq!(req.headers["x-tenant"], "acme");
        assert_eq!(req.headers["authorization"], "Bearer t");
    }

    #[test]
    fn test_query_string_is_percent_encoded() {
        let client = ODataClient::builder(echo)
            .base_url("https://svc/odata/")
            .build()
            .unwrap();
        let resp = client
            .execute(Method::GET, "People?$filter=Name eq 'x'", None)
            .unwrap();
        assert_eq!(
            resp.items()[0]["uri"],
            "https://svc/odata/People?$filter=Name%20eq%20%27x%27"
        );
    }

    #[test]
    fn test_non_success_status_is_error() {
        let client = ODataClient::builder(|_req: TransportRequest| -> Result<TransportResponse, BoxError> {
            Ok(TransportResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: "x".repeat(1000),
            })
        })
        .base_url("https://svc/")
        .build()
        .unwrap();

        let err = client.execute(Method::GET, "People", None).unwrap_err();
        let Error::HttpStatus {
            status,
            body_preview,
        } = err
        else {
            panic!("expected HttpStatus, got {err:?}");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body_preview.len(), 256 + 3);
    }

    #[test]
    fn test_body_preview_respects_char_boundary() {
        assert_eq!(body_preview("h\u{e9}llo", 2), "h...");
        assert_eq!(body_preview("short", 10), "short");
    }
}
