//! Fluent query builder.
//!
//! Chaining methods never fail: the first misuse is remembered and reported
//! by whichever terminal operation (`get`, `count`, `compile`, ...) runs next.
//! Terminal operations work on a copy of the query, so an overridden
//! `$select`, `$top` or `/$count` never leaks into later calls.

use crate::client::ODataClient;
use crate::error::Error;
use crate::grammar::Grammar;
use crate::pager::{Cursor, CursorStream, ItemsStream, PageStream, Pages, PagesStream};
use crate::query::{
    BindingKind, Bindings, Connector, OrderKey, Predicate, PredicateNode, Query, SortDir,
};
use crate::response::DecodedResponse;
use crate::value::{EntityKey, IntoODataValue, Value};
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

/// Per-call overrides for read operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Used only when the query has no `$select` of its own.
    pub properties: Option<Vec<String>>,
    /// Request `$count=true` alongside the results.
    pub include_count: bool,
}

impl GetOptions {
    #[must_use]
    pub fn select<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: Some(properties.into_iter().map(Into::into).collect()),
            include_count: false,
        }
    }

    #[must_use]
    pub fn with_count(mut self) -> Self {
        self.include_count = true;
        self
    }
}

#[derive(Clone, Debug)]
#[must_use]
pub struct QueryBuilder {
    client: ODataClient,
    query: Query,
    // first usage error, surfaced by the next terminal operation
    error: Option<String>,
}

impl QueryBuilder {
    pub(crate) fn new(client: ODataClient) -> Self {
        Self {
            client,
            query: Query::new(),
            error: None,
        }
    }

    /// Fresh, empty builder on the same client.
    pub fn new_query(&self) -> Self {
        Self::new(self.client.clone())
    }

    #[must_use]
    pub fn client(&self) -> &ODataClient {
        &self.client
    }

    /// Query built so far.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.query.bindings
    }

    pub fn from(mut self, entity_set: impl Into<String>) -> Self {
        self.query.entity_set = Some(entity_set.into());
        self
    }

    /// Replace the `$select` list.
    pub fn select<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.properties = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Address a single entity. Clears any `$top`.
    pub fn where_key(mut self, key: impl Into<EntityKey>) -> Self {
        self.query.entity_key = Some(key.into());
        self.query.take = None;
        self
    }

    /// `column eq value`
    pub fn where_eq(self, column: impl Into<String>, value: impl IntoODataValue) -> Self {
        self.push_where(Connector::And, column.into(), "=", value.into_odata_value())
    }

    /// `column <operator> value`, or `operator(column,value)` for a registered
    /// function.
    ///
    /// An `operator` that is neither a known operator nor a registered
    /// function is taken as the value itself, compared with `eq`; `value` is
    /// then ignored. A null value is only valid with an equality operator and
    /// becomes `eq null` / `ne null`.
    pub fn where_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl IntoODataValue,
    ) -> Self {
        self.push_where(Connector::And, column.into(), operator, value.into_odata_value())
    }

    pub fn or_where_eq(self, column: impl Into<String>, value: impl IntoODataValue) -> Self {
        self.push_where(Connector::Or, column.into(), "=", value.into_odata_value())
    }

    pub fn or_where_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl IntoODataValue,
    ) -> Self {
        self.push_where(Connector::Or, column.into(), operator, value.into_odata_value())
    }

    /// Parenthesized group of `column eq value` conditions joined with `and`.
    pub fn where_map<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoODataValue,
    {
        self.push_map(Connector::And, pairs)
    }

    pub fn or_where_map<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoODataValue,
    {
        self.push_map(Connector::Or, pairs)
    }

    /// Parenthesized group built by `f` on a child builder scoped to the same
    /// entity set. A group with no conditions is dropped.
    pub fn where_nested<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_nested(Connector::And, f)
    }

    pub fn or_where_nested<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_nested(Connector::Or, f)
    }

    /// Compare two properties: `first <operator> second`.
    ///
    /// An unrecognized `operator` is taken as the second property and the
    /// comparison becomes equality; `second` is then ignored.
    pub fn where_column(
        self,
        first: impl Into<String>,
        operator: &str,
        second: impl Into<String>,
    ) -> Self {
        self.push_column(Connector::And, first.into(), operator, second.into())
    }

    pub fn or_where_column(
        self,
        first: impl Into<String>,
        operator: &str,
        second: impl Into<String>,
    ) -> Self {
        self.push_column(Connector::Or, first.into(), operator, second.into())
    }

    /// `first eq second` for two properties.
    pub fn where_column_eq(self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.push_column(Connector::And, first.into(), "=", second.into())
    }

    pub fn or_where_column_eq(self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.push_column(Connector::Or, first.into(), "=", second.into())
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push(
            Connector::And,
            Predicate::Null {
                column: column.into(),
                negated: false,
            },
        )
    }

    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push(
            Connector::And,
            Predicate::Null {
                column: column.into(),
                negated: true,
            },
        )
    }

    pub fn or_where_null(self, column: impl Into<String>) -> Self {
        self.push(
            Connector::Or,
            Predicate::Null {
                column: column.into(),
                negated: false,
            },
        )
    }

    pub fn or_where_not_null(self, column: impl Into<String>) -> Self {
        self.push(
            Connector::Or,
            Predicate::Null {
                column: column.into(),
                negated: true,
            },
        )
    }

    /// `column in (v1,v2,...)`
    pub fn where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        self.push_in(Connector::And, column.into(), values, false)
    }

    /// `not(column in (v1,v2,...))`
    pub fn where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        self.push_in(Connector::And, column.into(), values, true)
    }

    pub fn or_where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        self.push_in(Connector::Or, column.into(), values, false)
    }

    pub fn or_where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        self.push_in(Connector::Or, column.into(), values, true)
    }

    /// Filter text used verbatim.
    pub fn where_raw(self, text: impl Into<String>) -> Self {
        self.push(Connector::And, Predicate::Raw { text: text.into() })
    }

    pub fn or_where_raw(self, text: impl Into<String>) -> Self {
        self.push(Connector::Or, Predicate::Raw { text: text.into() })
    }

    /// Record literal values under `kind` (`select`, `where`, `expand` or `order`).
    pub fn add_binding<I, V>(mut self, values: I, kind: &str) -> Self
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        let Some(kind) = BindingKind::parse(kind) else {
            return self.fail(format!("invalid binding type: {kind}"));
        };
        self.query
            .bindings
            .extend(kind, values.into_iter().map(IntoODataValue::into_odata_value));
        self
    }

    /// Append navigation properties to `$expand`.
    pub fn expand<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .expansions
            .extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, dir: SortDir) -> Self {
        self.query.orders.push(OrderKey::from((column, dir)));
        self
    }

    /// Append several order keys; bare column names sort ascending.
    pub fn order<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<OrderKey>,
    {
        self.query.orders.extend(keys.into_iter().map(Into::into));
        self
    }

    /// `$orderby` text used verbatim, replacing any order keys.
    pub fn order_by_raw(mut self, text: impl Into<String>) -> Self {
        self.query.raw_order = Some(text.into());
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.query.skip = Some(n);
        self
    }

    pub fn skip_token(mut self, token: impl Into<String>) -> Self {
        self.query.skip_token = Some(token.into());
        self
    }

    /// `$top`; ignored while a key is set.
    pub fn take(mut self, n: u64) -> Self {
        self.query.take = Some(n);
        self
    }

    /// Ask the server for pages of at most `n` items.
    ///
    /// The preference is stored on the client and applies to every request
    /// made through it from now on.
    pub fn page_size(self, n: u64) -> Self {
        self.client.set_page_size(n);
        self
    }

    /// Finished query model.
    ///
    /// # Errors
    /// Returns the first usage error recorded while chaining.
    pub fn build(self) -> Result<Query, Error> {
        match self.error {
            Some(msg) => Err(Error::InvalidArgument(msg)),
            None => Ok(self.query),
        }
    }

    /// Relative request URI for a plain read of this query, unencoded.
    ///
    /// # Errors
    /// Returns the first usage error recorded while chaining.
    pub fn compile(&self) -> Result<String, Error> {
        let query = self.checked()?;
        Ok(self.client.grammar().compile(query))
    }

    /// Number of matching entities, read from `/$count`.
    ///
    /// # Errors
    /// Usage errors, transport and status errors, or a count that does not
    /// fit in a `u64`.
    pub fn count(&self) -> Result<u64, Error> {
        let uri = self.count_uri()?;
        self.client.execute(Method::GET, &uri, None)?.count()
    }

    /// All items of the first page.
    ///
    /// # Errors
    /// Usage errors (including a missing entity set), transport and status
    /// errors.
    pub fn get(&self) -> Result<Vec<Json>, Error> {
        self.get_with(&GetOptions::default())
    }

    /// [`get`](Self::get) with per-call overrides.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn get_with(&self, options: &GetOptions) -> Result<Vec<Json>, Error> {
        Ok(self.fetch(options)?.into_items())
    }

    /// Full decoded response of a read, for callers that need the next link
    /// or the inline count.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn fetch(&self, options: &GetOptions) -> Result<DecodedResponse, Error> {
        let uri = self.read_uri(options, None)?;
        self.client.execute(Method::GET, &uri, None)
    }

    /// Items of the first page mapped onto `T`.
    ///
    /// # Errors
    /// Same as [`get`](Self::get), plus `Error::ParseResponse` if an item
    /// does not have the shape of `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.fetch(&GetOptions::default())?.hydrate()
    }

    /// First matching item, if any.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn first(&self) -> Result<Option<Json>, Error> {
        self.first_with(&GetOptions::default())
    }

    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn first_with(&self, options: &GetOptions) -> Result<Option<Json>, Error> {
        let uri = self.read_uri(options, Some(1))?;
        let page = self.client.execute(Method::GET, &uri, None)?;
        Ok(page.into_items().into_iter().next())
    }

    /// Entity with the given key.
    ///
    /// # Errors
    /// `Error::Configuration` if no entity set was chosen, otherwise same as
    /// [`get`](Self::get).
    pub fn find(&self, key: impl Into<EntityKey>) -> Result<Option<Json>, Error> {
        self.find_with(key, &GetOptions::default())
    }

    /// # Errors
    /// Same as [`find`](Self::find).
    pub fn find_with(
        &self,
        key: impl Into<EntityKey>,
        options: &GetOptions,
    ) -> Result<Option<Json>, Error> {
        if self.query.entity_set.is_none() {
            return Err(Error::configuration("entity set must be set before find"));
        }
        self.clone().where_key(key).first_with(options)
    }

    /// Create an entity: `POST` the serialized body to the entity set.
    ///
    /// # Errors
    /// Usage errors, an unserializable body, transport and status errors.
    pub fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<Vec<Json>, Error> {
        Ok(self.submit(Method::POST, Some(body))?.into_items())
    }

    /// Update the addressed entity with `PATCH`.
    ///
    /// # Errors
    /// Same as [`post`](Self::post).
    pub fn patch<B: Serialize + ?Sized>(&self, body: &B) -> Result<Vec<Json>, Error> {
        Ok(self.submit(Method::PATCH, Some(body))?.into_items())
    }

    /// Delete the addressed entity.
    ///
    /// # Errors
    /// Usage errors, transport and status errors.
    pub fn delete(&self) -> Result<Vec<Json>, Error> {
        Ok(self.submit::<()>(Method::DELETE, None)?.into_items())
    }

    /// Write request against the resource path (entity set and key); query
    /// options are not sent. Returns the full response, e.g. for
    /// [`DecodedResponse::id`].
    ///
    /// # Errors
    /// Same as [`post`](Self::post).
    pub fn submit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        body: Option<&B>,
    ) -> Result<DecodedResponse, Error> {
        let query = self.checked()?;
        require_entity_set(query)?;
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::invalid_argument(format!("request body is not serializable: {e}")))?;
        let uri = Grammar::compile_request_path(query);
        self.client.execute(method, &uri, body)
    }

    /// Lazy iterator over every item of every page, following next links.
    ///
    /// # Errors
    /// Usage errors; request failures are yielded by the iterator.
    pub fn cursor(&self) -> Result<Cursor, Error> {
        Ok(Cursor::new(self.pages()?))
    }

    /// Lazy iterator over whole pages.
    ///
    /// # Errors
    /// Usage errors; request failures are yielded by the iterator.
    pub fn pages(&self) -> Result<Pages, Error> {
        let uri = self.read_uri(&GetOptions::default(), None)?;
        Ok(Pages::new(self.client.clone(), uri))
    }

    /// Async [`get`](Self::get).
    ///
    /// # Errors
    /// Same as [`get`](Self::get), plus `Error::Task`.
    pub async fn get_async(&self) -> Result<Vec<Json>, Error> {
        let uri = self.read_uri(&GetOptions::default(), None)?;
        Ok(self
            .client
            .execute_async(Method::GET, uri, None)
            .await?
            .into_items())
    }

    /// Async [`count`](Self::count).
    ///
    /// # Errors
    /// Same as [`count`](Self::count), plus `Error::Task`.
    pub async fn count_async(&self) -> Result<u64, Error> {
        let uri = self.count_uri()?;
        self.client
            .execute_async(Method::GET, uri, None)
            .await?
            .count()
    }

    /// Async [`first`](Self::first).
    ///
    /// # Errors
    /// Same as [`first`](Self::first), plus `Error::Task`.
    pub async fn first_async(&self) -> Result<Option<Json>, Error> {
        let uri = self.read_uri(&GetOptions::default(), Some(1))?;
        let page = self.client.execute_async(Method::GET, uri, None).await?;
        Ok(page.into_items().into_iter().next())
    }

    /// Stream of every item of every page.
    ///
    /// # Errors
    /// Usage errors; request failures are yielded by the stream.
    pub fn cursor_stream(&self) -> Result<ItemsStream, Error> {
        let uri = self.read_uri(&GetOptions::default(), None)?;
        Ok(CursorStream::new(uri, self.client.page_fetcher()))
    }

    /// Stream of whole pages.
    ///
    /// # Errors
    /// Usage errors; request failures are yielded by the stream.
    pub fn pages_stream(&self) -> Result<PageStream, Error> {
        let uri = self.read_uri(&GetOptions::default(), None)?;
        Ok(PagesStream::new(uri, self.client.page_fetcher()))
    }

    fn checked(&self) -> Result<&Query, Error> {
        match &self.error {
            Some(msg) => Err(Error::InvalidArgument(msg.clone())),
            None => Ok(&self.query),
        }
    }

    fn read_uri(&self, options: &GetOptions, take: Option<u64>) -> Result<String, Error> {
        let mut query = self.checked()?.clone();
        require_entity_set(&query)?;
        if query.properties.is_none() {
            query.properties.clone_from(&options.properties);
        }
        if options.include_count {
            query.aggregate.wants_total_count = true;
        }
        if take.is_some() {
            query.take = take;
        }
        Ok(self.client.grammar().compile_request(&query))
    }

    fn count_uri(&self) -> Result<String, Error> {
        let mut query = self.checked()?.clone();
        require_entity_set(&query)?;
        query.aggregate.is_count = true;
        Ok(self.client.grammar().compile_request(&query))
    }

    fn fail(mut self, msg: String) -> Self {
        if self.error.is_none() {
            tracing::debug!(error = %msg, "query builder misuse recorded");
            self.error = Some(msg);
        }
        self
    }

    fn push(mut self, connector: Connector, predicate: Predicate) -> Self {
        let bindings = &mut self.query.bindings;
        match &predicate {
            Predicate::Basic { value, .. } | Predicate::Function { value, .. } => {
                bindings.push(BindingKind::Where, value.clone());
            }
            Predicate::In { values, .. } => {
                bindings.extend(BindingKind::Where, values.iter().cloned());
            }
            Predicate::Nested { query } => {
                bindings.extend(BindingKind::Where, query.bindings.wheres.iter().cloned());
            }
            Predicate::Column { .. } | Predicate::Raw { .. } | Predicate::Null { .. } => {}
        }
        self.query
            .predicates
            .push(PredicateNode::new(connector, predicate));
        self
    }

    fn push_where(self, connector: Connector, column: String, operator: &str, value: Value) -> Self {
        let grammar = self.client.grammar();
        let is_function = grammar.is_function(operator);
        let (operator, value) = if is_function || grammar.is_operator(operator) {
            (operator.to_owned(), value)
        } else {
            ("=".to_owned(), Value::String(operator.to_owned()))
        };

        if value.is_null() {
            return match null_negation(&operator) {
                Some(negated) => self.push(connector, Predicate::Null { column, negated }),
                None => self.fail(format!(
                    "illegal operator and value combination: {operator} null"
                )),
            };
        }

        let predicate = if is_function {
            Predicate::Function {
                name: operator,
                column,
                value,
            }
        } else {
            Predicate::Basic {
                column,
                operator,
                value,
            }
        };
        self.push(connector, predicate)
    }

    fn push_column(self, connector: Connector, first: String, operator: &str, second: String) -> Self {
        // Unknown operator: it is the second column, compared for equality.
        let (operator, second) = if self.client.grammar().is_operator(operator) {
            (operator.to_owned(), second)
        } else {
            ("=".to_owned(), operator.to_owned())
        };
        self.push(
            connector,
            Predicate::Column {
                first,
                operator,
                second,
            },
        )
    }

    fn push_in<I, V>(self, connector: Connector, column: String, values: I, negated: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        let values = values
            .into_iter()
            .map(IntoODataValue::into_odata_value)
            .collect();
        self.push(
            connector,
            Predicate::In {
                column,
                values,
                negated,
            },
        )
    }

    fn push_map<I, K, V>(self, connector: Connector, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoODataValue,
    {
        self.push_nested(connector, |group| {
            pairs
                .into_iter()
                .fold(group, |group, (column, value)| group.where_eq(column, value))
        })
    }

    fn push_nested<F>(self, connector: Connector, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let mut child = self.new_query();
        child.query.entity_set.clone_from(&self.query.entity_set);
        let child = f(child);

        if let Some(msg) = child.error {
            return self.fail(msg);
        }
        if !child.query.has_predicates() {
            return self;
        }
        self.push(
            connector,
            Predicate::Nested {
                query: Box::new(child.query),
            },
        )
    }
}

fn require_entity_set(query: &Query) -> Result<(), Error> {
    if query.entity_set.is_none() {
        return Err(Error::invalid_argument(
            "entity set must be set before executing a query",
        ));
    }
    Ok(())
}

/// `Some(negated)` for equality operators, `None` otherwise.
fn null_negation(operator: &str) -> Option<bool> {
    match operator.to_ascii_lowercase().as_str() {
        "=" | "eq" => Some(false),
        "!=" | "<>" | "ne" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::transport::{TransportRequest, TransportResponse};

    fn client() -> ODataClient {
        ODataClient::builder(|_req: TransportRequest| -> Result<TransportResponse, BoxError> {
            Ok(TransportResponse::ok("{}"))
        })
        .base_url("https://svc/odata/")
        .build()
        .unwrap()
    }

    fn compiled(builder: &QueryBuilder) -> String {
        builder.compile().unwrap()
    }

    #[test]
    fn test_value_shortcut_defaults_to_eq() {
        let c = client();
        let shortcut = c.from("People").where_op("name", "bob", Value::Null);
        let explicit = c.from("People").where_eq("name", "bob");
        assert_eq!(compiled(&shortcut), compiled(&explicit));
        assert_eq!(compiled(&shortcut), "People?$filter=name eq 'bob'");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let q = client()
            .from("People")
            .where_in("id", [1, 2])
            .or_where_nested(|g| g.where_null("a"))
            .order(["b"]);
        assert_eq!(compiled(&q), compiled(&q));
    }

    #[test]
    fn test_or_chain() {
        let q = client()
            .from("People")
            .where_eq("a", 1)
            .or_where_eq("b", 2);
        assert_eq!(compiled(&q), "People?$filter=a eq 1 or b eq 2");
    }

    #[test]
    fn test_function_operator() {
        let q = client()
            .from("People")
            .where_op("FirstName", "contains", "an")
            .where_op("LastName", "startswith", "S");
        assert_eq!(
            compiled(&q),
            "People?$filter=contains(FirstName,'an') and startswith(LastName,'S')"
        );
    }

    #[test]
    fn test_null_comparisons() {
        let q = client()
            .from("People")
            .where_op("a", "=", Value::Null)
            .or_where_op("b", "!=", Option::<i64>::None);
        assert_eq!(compiled(&q), "People?$filter=a eq null or b ne null");
    }

    #[test]
    fn test_null_with_ordering_operator_is_deferred_error() {
        let q = client()
            .from("People")
            .where_op("a", ">", Value::Null)
            .where_op("b", "<", Value::Null)
            .take(3);
        let err = q.compile().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument: illegal operator and value combination: > null"
        );
        assert!(q.get().is_err());
        assert!(q.build().is_err());
    }

    #[test]
    fn test_nested_group() {
        let q = client()
            .from("People")
            .where_eq("a", 1)
            .where_nested(|g| g.where_eq("b", 2).or_where_eq("c", 3));
        assert_eq!(
            compiled(&q),
            "People?$filter=a eq 1 and (b eq 2 or c eq 3)"
        );
        assert_eq!(
            q.bindings().wheres,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_empty_nested_group_dropped() {
        let q = client().from("People").where_eq("a", 1).or_where_nested(|g| g);
        assert_eq!(compiled(&q), "People?$filter=a eq 1");
    }

    #[test]
    fn test_nested_group_error_propagates() {
        let q = client()
            .from("People")
            .where_nested(|g| g.add_binding([1], "having"));
        assert!(matches!(q.compile(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_where_map_groups_conditions() {
        let q = client()
            .from("People")
            .where_eq("x", 0)
            .or_where_map([("a", 1), ("b", 2)]);
        assert_eq!(
            compiled(&q),
            "People?$filter=x eq 0 or (a eq 1 and b eq 2)"
        );
    }

    #[test]
    fn test_key_suppresses_take() {
        let q = client().from("People").take(5).where_key(7);
        assert_eq!(compiled(&q), "People(7)");

        let q = client().from("People").where_key(7).take(5);
        assert_eq!(compiled(&q), "People(7)");
    }

    #[test]
    fn test_uuid_key_unquoted() {
        let id = uuid::Uuid::new_v4();
        let q = client().from("Orders").where_key(id);
        assert_eq!(compiled(&q), format!("Orders({id})"));
    }

    #[test]
    fn test_where_in_and_not_in() {
        let q = client()
            .from("People")
            .where_in("id", [1, 2])
            .where_not_in("name", ["x"]);
        assert_eq!(
            compiled(&q),
            "People?$filter=id in (1,2) and not(name in ('x'))"
        );
    }

    #[test]
    fn test_where_column_and_raw() {
        let q = client()
            .from("Products")
            .where_column("Price", ">", "Cost")
            .or_where_raw("Discontinued eq true");
        assert_eq!(
            compiled(&q),
            "Products?$filter=Price gt Cost or Discontinued eq true"
        );

        let q = client().from("P").where_column("a", "b", "ignored");
        assert_eq!(compiled(&q), "P?$filter=a eq b");

        let q = client()
            .from("P")
            .where_column_eq("a", "b")
            .or_where_column_eq("c", "d");
        assert_eq!(compiled(&q), "P?$filter=a eq b or c eq d");
    }

    #[test]
    fn test_null_helpers() {
        let q = client()
            .from("People")
            .where_null("a")
            .or_where_not_null("b");
        assert_eq!(compiled(&q), "People?$filter=a eq null or b ne null");
    }

    #[test]
    fn test_add_binding() {
        let q = client()
            .from("People")
            .add_binding([1, 2], "order")
            .add_binding(["x"], "select");
        assert_eq!(q.bindings().order, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(q.bindings().select, vec![Value::String("x".to_owned())]);

        let err = q.add_binding([3], "having").build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument: invalid binding type: having"
        );
    }

    #[test]
    fn test_ordering_expand_paging() {
        let q = client()
            .from("People")
            .select(["FirstName", "LastName"])
            .expand(["Friends"])
            .order(["LastName"])
            .order_by("Age", SortDir::Desc)
            .skip(20)
            .take(10);
        assert_eq!(
            compiled(&q),
            "People?$select=FirstName,LastName&$expand=Friends&$orderby=LastName asc,Age desc&$skip=20&$top=10"
        );
    }

    #[test]
    fn test_read_uri_does_not_mutate_query() {
        let q = client().from("People").take(50);
        let options = GetOptions::select(["Id"]).with_count();
        let uri = q.read_uri(&options, Some(1)).unwrap();
        assert_eq!(uri, "People?$select=Id&$top=1&$count=true");
        assert_eq!(compiled(&q), "People?$top=50");
        assert_eq!(q.count_uri().unwrap(), "People/$count?$top=50");
        assert_eq!(compiled(&q), "People?$top=50");
    }

    #[test]
    fn test_query_select_wins_over_options() {
        let q = client().from("People").select(["Name"]);
        let uri = q.read_uri(&GetOptions::select(["Id"]), None).unwrap();
        assert_eq!(uri, "People?$select=Name");
    }

    #[test]
    fn test_missing_entity_set() {
        let q = client().query().where_eq("a", 1);
        assert!(matches!(q.get(), Err(Error::InvalidArgument(_))));
        assert!(matches!(q.find(1), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_build_returns_model() {
        let query = client()
            .from("People")
            .where_eq("a", 1)
            .skip_token("abc")
            .build()
            .unwrap();
        assert_eq!(query.entity_set.as_deref(), Some("People"));
        assert_eq!(query.predicates.len(), 1);
        assert_eq!(query.skip_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_page_size_is_shared_with_client() {
        let c = client();
        let _q = c.from("People").page_size(20);
        assert_eq!(c.page_size(), Some(20));
    }
}
