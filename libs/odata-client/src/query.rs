//! In-memory query model.
//!
//! A [`Query`] is plain data: the builder fills it, the grammar reads it.
//! Nested predicate groups own their child `Query`, so the tree never points
//! back at its parent.

use crate::error::Error;
use crate::value::{EntityKey, Value};
use std::fmt;
use std::str::FromStr;

/// Boolean connector relating a predicate to the one before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Connector::And => "and",
            Connector::Or => "or",
        }
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Connector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("and") {
            Ok(Connector::And)
        } else if s.eq_ignore_ascii_case("or") {
            Ok(Connector::Or)
        } else {
            Err(Error::invalid_argument(format!("unknown connector: {s}")))
        }
    }
}

/// One filter condition or group.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `column <op> value`
    Basic {
        column: String,
        operator: String,
        value: Value,
    },
    /// `name(column,value)`
    Function {
        name: String,
        column: String,
        value: Value,
    },
    /// `first <op> second`, both sides are property references
    Column {
        first: String,
        operator: String,
        second: String,
    },
    /// Opaque text, rendered as-is
    Raw { text: String },
    /// `column eq null` / `column ne null`
    Null { column: String, negated: bool },
    /// `column in (...)` / `not(column in (...))`
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// Parenthesized group of the child's predicates
    Nested { query: Box<Query> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PredicateNode {
    /// Ignored for the first node of a sequence.
    pub connector: Connector,
    pub predicate: Predicate,
}

impl PredicateNode {
    #[must_use]
    pub fn new(connector: Connector, predicate: Predicate) -> Self {
        Self {
            connector,
            predicate,
        }
    }
}

// Ordering primitives
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SortDir {
    #[default]
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

impl SortDir {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }
}

impl FromStr for SortDir {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(Error::invalid_argument(format!(
                "invalid order direction: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub column: String,
    pub dir: SortDir,
}

impl From<&str> for OrderKey {
    fn from(column: &str) -> Self {
        Self {
            column: column.to_owned(),
            dir: SortDir::Asc,
        }
    }
}

impl From<String> for OrderKey {
    fn from(column: String) -> Self {
        Self {
            column,
            dir: SortDir::Asc,
        }
    }
}

impl<C: Into<String>> From<(C, SortDir)> for OrderKey {
    fn from((column, dir): (C, SortDir)) -> Self {
        Self {
            column: column.into(),
            dir,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Compile to `/$count` and read the number from the raw body.
    pub is_count: bool,
    /// Ask for `$count=true` alongside the page of results.
    pub wants_total_count: bool,
}

/// Kind of value accumulated in [`Bindings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Select,
    Where,
    Expand,
    Order,
}

impl BindingKind {
    /// Parse a component name; names are case-sensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "select" => Some(BindingKind::Select),
            "where" => Some(BindingKind::Where),
            "expand" => Some(BindingKind::Expand),
            "order" => Some(BindingKind::Order),
            _ => None,
        }
    }
}

impl FromStr for BindingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::invalid_argument(format!("invalid binding type: {s}")))
    }
}

/// Literal values referenced by the query, grouped by component.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    pub select: Vec<Value>,
    pub wheres: Vec<Value>,
    pub expand: Vec<Value>,
    pub order: Vec<Value>,
}

impl Bindings {
    pub fn push(&mut self, kind: BindingKind, value: Value) {
        self.slot_mut(kind).push(value);
    }

    pub fn extend<I: IntoIterator<Item = Value>>(&mut self, kind: BindingKind, values: I) {
        self.slot_mut(kind).extend(values);
    }

    #[must_use]
    pub fn get(&self, kind: BindingKind) -> &[Value] {
        match kind {
            BindingKind::Select => &self.select,
            BindingKind::Where => &self.wheres,
            BindingKind::Expand => &self.expand,
            BindingKind::Order => &self.order,
        }
    }

    /// All values flattened in component order.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Value> {
        self.select
            .iter()
            .chain(&self.wheres)
            .chain(&self.expand)
            .chain(&self.order)
            .collect()
    }

    fn slot_mut(&mut self, kind: BindingKind) -> &mut Vec<Value> {
        match kind {
            BindingKind::Select => &mut self.select,
            BindingKind::Where => &mut self.wheres,
            BindingKind::Expand => &mut self.expand,
            BindingKind::Order => &mut self.order,
        }
    }
}

/// One logical query against an entity set.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct Query {
    pub entity_set: Option<String>,
    pub entity_key: Option<EntityKey>,
    /// `None` selects all properties.
    pub properties: Option<Vec<String>>,
    pub predicates: Vec<PredicateNode>,
    pub orders: Vec<OrderKey>,
    /// Overrides `orders` when set.
    pub raw_order: Option<String>,
    pub expansions: Vec<String>,
    pub take: Option<u64>,
    pub skip: Option<u64>,
    pub skip_token: Option<String>,
    pub aggregate: Aggregate,
    pub bindings: Bindings,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty query scoped to the same entity set.
    pub fn sibling(&self) -> Self {
        Self {
            entity_set: self.entity_set.clone(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_predicates(&self) -> bool {
        !self.predicates.is_empty()
    }

    #[must_use]
    pub fn has_key(&self) -> bool {
        self.entity_key.is_some()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_connector_parse() {
        assert_eq!("AND".parse::<Connector>().unwrap(), Connector::And);
        assert_eq!("or".parse::<Connector>().unwrap(), Connector::Or);
        assert!(matches!(
            "xor".parse::<Connector>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_sort_dir_parse() {
        assert_eq!("Desc".parse::<SortDir>().unwrap(), SortDir::Desc);
        assert_eq!(" asc ".parse::<SortDir>().unwrap(), SortDir::Asc);
        assert!("down".parse::<SortDir>().is_err());
    }

    #[test]
    fn test_order_key_defaults_to_asc() {
        let key = OrderKey::from("name");
        assert_eq!(key.dir, SortDir::Asc);

        let key = OrderKey::from(("age", SortDir::Desc));
        assert_eq!(key.column, "age");
        assert_eq!(key.dir, SortDir::Desc);
    }

    #[test]
    fn test_unknown_binding_kind() {
        let err = "having".parse::<BindingKind>().unwrap_err();
        assert_eq!(err.to_string(), "invalid argument: invalid binding type: having");
    }

    #[test]
    fn test_bindings_flatten_in_component_order() {
        let mut b = Bindings::default();
        b.push(BindingKind::Order, Value::Int(3));
        b.push(BindingKind::Where, Value::Int(2));
        b.push(BindingKind::Select, Value::Int(1));

        let flat: Vec<_> = b.flatten().into_iter().cloned().collect();
        assert_eq!(flat, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_sibling_keeps_only_entity_set() {
        let mut q = Query::new();
        q.entity_set = Some("People".to_owned());
        q.take = Some(5);

        let s = q.sibling();
        assert_eq!(s.entity_set.as_deref(), Some("People"));
        assert_eq!(s.take, None);
    }
}
