use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Default User-Agent string for requests
pub const DEFAULT_USER_AGENT: &str = concat!("odata-client/", env!("CARGO_PKG_VERSION"));

/// Protocol version sent in `OData-Version` / `OData-MaxVersion`
pub const DEFAULT_ODATA_VERSION: &str = "4.0";

/// Client configuration.
///
/// Deserializable from any serde source; durations use humantime syntax:
///
/// ```yaml
/// base_url: "https://services.odata.org/V4/TripPinService/"
/// timeout: "15s"
/// page_size: 50
/// default_headers:
///   x-tenant: acme
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ODataClientConfig {
    /// Service root; every compiled query is resolved against it.
    pub base_url: String,

    /// Per-request timeout handed to the transport.
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Initial `Prefer: odata.maxpagesize` value.
    pub page_size: Option<u64>,

    pub odata_version: String,

    pub user_agent: String,

    /// Extra headers added to every request.
    pub default_headers: BTreeMap<String, String>,

    /// Bytes of an error body kept in `Error::HttpStatus`.
    pub body_preview_limit: usize,
}

impl Default for ODataClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: default_timeout(),
            page_size: None,
            odata_version: DEFAULT_ODATA_VERSION.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: BTreeMap::new(),
            body_preview_limit: default_body_preview_limit(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_body_preview_limit() -> usize {
    256
}

impl ODataClientConfig {
    /// Config with the given service root and defaults elsewhere.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parse and normalize the base URL so relative paths join beneath it.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the base URL is empty or not an
    /// absolute URL.
    pub fn base_url(&self) -> Result<Url, Error> {
        let raw = self.base_url.trim();
        if raw.is_empty() {
            return Err(Error::configuration("base URL must not be empty"));
        }
        let mut url = Url::parse(raw)
            .map_err(|e| Error::configuration(format!("invalid base URL '{raw}': {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "base URL '{raw}' cannot be used as a base"
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}
