//! Response decoding.
//!
//! Decoding never fails: a body that is not JSON is salvaged by extracting the
//! first balanced `{...}` object, and if that fails too the body is treated as
//! an empty object (no items, no next link).

use crate::error::Error;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

/// Envelope key holding a collection.
pub const ODATA_VALUE: &str = "value";
/// Continuation link key.
pub const ODATA_NEXT_LINK: &str = "@odata.nextLink";
/// Inline total count key (`$count=true`).
pub const ODATA_COUNT: &str = "@odata.count";
/// Entity id key in an insert response body.
pub const ODATA_ID: &str = "@odata.id";
/// Header carrying the id of a created entity.
pub const ODATA_ENTITY_ID_HEADER: &str = "odata-entityid";

/// Normalized view of one response.
#[derive(Clone, Debug)]
pub struct DecodedResponse {
    items: Vec<Json>,
    next_link: Option<String>,
    body: Json,
    raw_body: String,
    status: StatusCode,
    headers: HeaderMap,
}

impl DecodedResponse {
    /// Decode a raw response body.
    #[must_use]
    pub fn decode(raw_body: String, status: StatusCode, headers: HeaderMap) -> Self {
        let body = decode_body(&raw_body);

        let next_link = body
            .get(ODATA_NEXT_LINK)
            .and_then(Json::as_str)
            .map(str::to_owned);

        let items = match &body {
            Json::Object(map) => match map.get(ODATA_VALUE) {
                Some(Json::Array(values)) => values.clone(),
                _ if map.is_empty() => Vec::new(),
                _ => vec![body.clone()],
            },
            Json::Null => Vec::new(),
            other => vec![other.clone()],
        };

        Self {
            items,
            next_link,
            body,
            raw_body,
            status,
            headers,
        }
    }

    /// Payload items, whether or not the server wrapped them in an envelope.
    #[must_use]
    pub fn items(&self) -> &[Json] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<Json> {
        self.items
    }

    #[must_use]
    pub fn next_link(&self) -> Option<&str> {
        self.next_link.as_deref()
    }

    /// `$skiptoken` parameter of the next link, if any.
    #[must_use]
    pub fn skip_token(&self) -> Option<String> {
        let link = self.next_link.as_deref()?;
        let (_, query) = link.split_once('?')?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k.trim_start_matches('$').eq_ignore_ascii_case("skiptoken"))
            .map(|(_, v)| v.into_owned())
    }

    /// Id of an inserted entity: `OData-EntityId` header, else `@odata.id`.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        if let Some(value) = self
            .headers
            .get(ODATA_ENTITY_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            return Some(value.to_owned());
        }
        self.body
            .get(ODATA_ID)
            .and_then(Json::as_str)
            .map(str::to_owned)
    }

    /// Inline total count (`@odata.count`), when requested.
    #[must_use]
    pub fn total_count(&self) -> Option<u64> {
        match self.body.get(ODATA_COUNT)? {
            Json::Number(n) => n.as_u64(),
            Json::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Number parsed from a `/$count` body: non-digits are stripped, an empty
    /// body counts as zero.
    ///
    /// # Errors
    /// Returns `Error::ParseResponse` if the digits do not fit in a `u64`.
    pub fn count(&self) -> Result<u64, Error> {
        let digits: String = self.raw_body.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Ok(0);
        }
        digits
            .parse()
            .map_err(|e| Error::ParseResponse(format!("count {digits}: {e}")))
    }

    /// Map every item onto `T`.
    ///
    /// # Errors
    /// Returns `Error::ParseResponse` if an item does not have the shape of `T`.
    pub fn hydrate<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.items
            .iter()
            .map(|item| {
                T::deserialize(item).map_err(|e| Error::ParseResponse(e.to_string()))
            })
            .collect()
    }

    /// Decoded body as a whole.
    #[must_use]
    pub fn body(&self) -> &Json {
        &self.body
    }

    #[must_use]
    pub fn raw_body(&self) -> &str {
        &self.raw_body
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn decode_body(raw: &str) -> Json {
    if raw.trim().is_empty() {
        return Json::Object(Map::new());
    }
    if let Ok(body) = serde_json::from_str(raw) {
        return body;
    }
    if let Some(body) = extract_first_object(raw).and_then(|s| serde_json::from_str(s).ok()) {
        tracing::warn!("response body is not plain JSON, decoded embedded object");
        return body;
    }
    tracing::warn!(
        body_len = raw.len(),
        "response body is not JSON, treating it as empty"
    );
    Json::Object(Map::new())
}

/// First top-level balanced `{...}` substring, honoring JSON string literals.
fn extract_first_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tracing_test::traced_test;

    fn decode(body: &str) -> DecodedResponse {
        DecodedResponse::decode(body.to_owned(), StatusCode::OK, HeaderMap::new())
    }

    #[test]
    fn test_collection_with_next_link() {
        let resp = decode(
            r#"{"value":[{"id":1},{"id":2}],"@odata.nextLink":"Things?$skiptoken=abc"}"#,
        );
        assert_eq!(resp.items().len(), 2);
        assert_eq!(resp.next_link(), Some("Things?$skiptoken=abc"));
        assert_eq!(resp.skip_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_single_entity_is_one_item() {
        let resp = decode(r#"{"@odata.context":"$metadata#People/$entity","UserName":"bob"}"#);
        assert_eq!(resp.items().len(), 1);
        assert_eq!(resp.items()[0]["UserName"], "bob");
        assert!(resp.next_link().is_none());
        assert!(resp.skip_token().is_none());
    }

    #[test]
    #[traced_test]
    fn test_malformed_body_degrades_to_empty() {
        let resp = decode("<html>502 Bad Gateway</html>");
        assert!(resp.items().is_empty());
        assert!(resp.next_link().is_none());
        assert!(logs_contain("treating it as empty"));
    }

    #[test]
    #[traced_test]
    fn test_embedded_object_is_recovered() {
        let resp = decode(r#")]}' {"value":[{"name":"a}b"}]} trailing"#);
        assert_eq!(resp.items().len(), 1);
        assert_eq!(resp.items()[0]["name"], "a}b");
        assert!(logs_contain("decoded embedded object"));
    }

    #[test]
    fn test_unbalanced_object_degrades_to_empty() {
        let resp = decode(r#"garbage {"value":[1,2"#);
        assert!(resp.items().is_empty());
    }

    #[test]
    fn test_empty_body() {
        let resp = decode("");
        assert!(resp.items().is_empty());
        assert_eq!(resp.count().unwrap(), 0);
    }

    #[test]
    fn test_count_strips_non_digits() {
        assert_eq!(decode("42").count().unwrap(), 42);
        assert_eq!(decode("\u{feff}1,204\r\n").count().unwrap(), 1204);
    }

    #[test]
    fn test_skip_token_percent_decoded() {
        let resp = decode(
            r#"{"value":[],"@odata.nextLink":"https://svc/People?%24filter=a&%24skiptoken=x%2B1"}"#,
        );
        assert_eq!(resp.skip_token().as_deref(), Some("x+1"));
    }

    #[test]
    fn test_next_link_without_skip_token() {
        let resp = decode(r#"{"value":[],"@odata.nextLink":"People?$skip=20"}"#);
        assert!(resp.skip_token().is_none());
    }

    #[test]
    fn test_total_count() {
        let resp = decode(r#"{"@odata.count":17,"value":[{"a":1}]}"#);
        assert_eq!(resp.total_count(), Some(17));
    }

    #[test]
    fn test_id_from_header_then_body() {
        let mut headers = HeaderMap::new();
        headers.insert("odata-entityid", "https://svc/People('x')".parse().unwrap());
        let resp = DecodedResponse::decode(
            r#"{"@odata.id":"People('y')"}"#.to_owned(),
            StatusCode::CREATED,
            headers,
        );
        assert_eq!(resp.id().as_deref(), Some("https://svc/People('x')"));

        let resp = decode(r#"{"@odata.id":"People('y')"}"#);
        assert_eq!(resp.id().as_deref(), Some("People('y')"));
        assert!(decode("{}").id().is_none());
    }

    #[test]
    fn test_hydrate() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Thing {
            id: i64,
        }

        let resp = decode(r#"{"value":[{"id":1},{"id":2}]}"#);
        let things: Vec<Thing> = resp.hydrate().unwrap();
        assert_eq!(things, vec![Thing { id: 1 }, Thing { id: 2 }]);

        let resp = decode(r#"{"value":[{"id":"nope"}]}"#);
        assert!(matches!(
            resp.hydrate::<Thing>(),
            Err(Error::ParseResponse(_))
        ));
    }

    #[test]
    fn test_body_accessors() {
        let resp = decode(r#"{"value":[]}"#);
        assert_eq!(resp.body(), &json!({"value": []}));
        assert_eq!(resp.raw_body(), r#"{"value":[]}"#);
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
