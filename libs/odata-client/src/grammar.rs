//! Query model -> `OData` v4 URI compiler.
//!
//! Components are compiled in a fixed order and joined by [`concatenate`]:
//!
//! entity set, entity key, `/$count`, `?`, `$select`, `$filter`, `$expand`,
//! `$orderby`, `$skip`, `$skiptoken`, `$top`, `$count=true`.
//!
//! Every component contributes zero or one segment; empty segments are
//! dropped. [`Grammar::compile`] returns the readable, unencoded form.
//! [`Grammar::compile_request`] percent-encodes every parameter value and
//! string key literal so that `&`, `#`, `+` or `%` inside a literal cannot
//! split the query string; that form is what goes on the wire.

use crate::query::{Predicate, PredicateNode, Query};
use crate::value::{EntityKey, Value};
use regex::Regex;
use std::sync::LazyLock;

/// Operator symbol -> protocol keyword.
const OPERATOR_MAP: &[(&str, &str)] = &[
    ("=", "eq"),
    ("<", "lt"),
    (">", "gt"),
    ("<=", "le"),
    (">=", "ge"),
    ("!<", "not lt"),
    ("!>", "not gt"),
    ("<>", "ne"),
    ("!=", "ne"),
];

/// Protocol keywords accepted verbatim as operators.
const NATIVE_OPERATORS: &[&str] = &["eq", "ne", "gt", "ge", "lt", "le", "has"];

/// Functions recognized by the default grammar.
pub const DEFAULT_FUNCTIONS: &[&str] = &["contains", "startswith", "endswith"];

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static ENUM_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)+'[^']*'$")
        .expect("static regex should not panic")
});

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static SPECIAL_PRIMITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:binary|datetime|guid|time|datetimeoffset)'[^']*'$")
        .expect("static regex should not panic")
});

// Unanchored on purpose: the first "and "/"or " anywhere is removed, which is
// always the first node's connector because every node renders one.
#[allow(clippy::expect_used)] // good regex, it doesn't panic
static LEADING_CONNECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)and |or ").expect("static regex should not panic"));

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static INTEGER_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+$").expect("static regex should not panic"));

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static UUID_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex should not panic")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Raw,
    Percent,
}

/// Stateless `OData` grammar: operator table, function registry, compile order.
#[derive(Clone, Debug)]
pub struct Grammar {
    functions: Vec<String>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self {
            functions: DEFAULT_FUNCTIONS.iter().map(|f| (*f).to_owned()).collect(),
        }
    }
}

impl Grammar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional filter function (e.g. `matchesPattern`).
    #[must_use]
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.is_function(&name) {
            self.functions.push(name);
        }
        self
    }

    /// Registered function names.
    #[must_use]
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    #[must_use]
    pub fn is_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.eq_ignore_ascii_case(name))
    }

    /// Whether `op` is a known operator symbol or protocol keyword.
    #[must_use]
    pub fn is_operator(&self, op: &str) -> bool {
        OPERATOR_MAP.iter().any(|(symbol, _)| *symbol == op)
            || NATIVE_OPERATORS.iter().any(|k| k.eq_ignore_ascii_case(op))
    }

    /// Map an operator symbol to its protocol keyword; unknown input passes through.
    #[must_use]
    pub fn map_operator(op: &str) -> &str {
        OPERATOR_MAP
            .iter()
            .find(|(symbol, _)| *symbol == op)
            .map_or(op, |(_, keyword)| *keyword)
    }

    /// Render a literal the way it must appear in a filter expression.
    #[must_use]
    pub fn prepare_value(&self, value: &Value) -> String {
        match value {
            Value::String(s) => {
                if ENUM_LITERAL.is_match(s) || SPECIAL_PRIMITIVE.is_match(s) || is_timestamp(s) {
                    s.clone()
                } else {
                    quote(s)
                }
            }
            Value::Bool(true) => "true".to_owned(),
            Value::Bool(false) => "false".to_owned(),
            other => other.to_string(),
        }
    }

    /// Compile the whole query to a relative request URI, unencoded.
    #[must_use]
    pub fn compile(&self, query: &Query) -> String {
        self.render(query, Encoding::Raw)
    }

    /// Compile the whole query to a relative request URI with parameter
    /// values and key literals percent-encoded, ready to be sent.
    #[must_use]
    pub fn compile_request(&self, query: &Query) -> String {
        self.render(query, Encoding::Percent)
    }

    /// Compile only the resource path (entity set and key), without options.
    #[must_use]
    pub fn compile_path(query: &Query) -> String {
        Self::render_path(query, Encoding::Raw)
    }

    /// [`Grammar::compile_path`] with key literals percent-encoded.
    #[must_use]
    pub fn compile_request_path(query: &Query) -> String {
        Self::render_path(query, Encoding::Percent)
    }

    fn render(&self, query: &Query, encoding: Encoding) -> String {
        let mut params = [
            Self::compile_properties(query),
            self.compile_wheres(query),
            Self::compile_expands(query),
            Self::compile_orders(query),
            Self::compile_skip(query),
            Self::compile_skip_token(query),
            Self::compile_take(query),
            Self::compile_total_count(query),
        ];
        if encoding == Encoding::Percent {
            for param in &mut params {
                *param = encode_param(param);
            }
        }
        let query_string = if params.iter().any(|p| !p.is_empty()) {
            "?".to_owned()
        } else {
            String::new()
        };

        let mut segments = vec![
            Self::compile_entity_set(query),
            Self::compile_entity_key(query, encoding),
            Self::compile_count(query),
            query_string,
        ];
        segments.extend(params);

        let uri = concatenate(&segments);
        tracing::trace!(uri = %uri, ?encoding, "compiled query");
        uri
    }

    fn render_path(query: &Query, encoding: Encoding) -> String {
        concatenate(&[
            Self::compile_entity_set(query),
            Self::compile_entity_key(query, encoding),
        ])
    }

    /// Compile the predicate sequence without the `$filter=` prefix.
    #[must_use]
    pub fn compile_predicates(&self, query: &Query) -> String {
        let joined = query
            .predicates
            .iter()
            .filter_map(|node| self.compile_node(node))
            .collect::<Vec<_>>()
            .join(" ");
        LEADING_CONNECTOR.replace(&joined, "").into_owned()
    }

    fn compile_node(&self, node: &PredicateNode) -> Option<String> {
        let rendered = match &node.predicate {
            Predicate::Basic {
                column,
                operator,
                value,
            } => format!(
                "{column} {} {}",
                Self::map_operator(operator),
                self.prepare_value(value)
            ),
            Predicate::Function {
                name,
                column,
                value,
            } => format!("{name}({column},{})", self.prepare_value(value)),
            Predicate::Column {
                first,
                operator,
                second,
            } => format!("{first} {} {second}", Self::map_operator(operator)),
            Predicate::Raw { text } => text.clone(),
            Predicate::Null { column, negated } => {
                format!("{column} {} null", if *negated { "ne" } else { "eq" })
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                let list = values
                    .iter()
                    .map(|v| self.prepare_value(v))
                    .collect::<Vec<_>>()
                    .join(",");
                if *negated {
                    format!("not({column} in ({list}))")
                } else {
                    format!("{column} in ({list})")
                }
            }
            Predicate::Nested { query } => {
                let inner = self.compile_predicates(query);
                if inner.is_empty() {
                    return None;
                }
                format!("({inner})")
            }
        };
        Some(format!("{} {rendered}", node.connector))
    }

    fn compile_entity_set(query: &Query) -> String {
        query.entity_set.clone().unwrap_or_default()
    }

    fn compile_entity_key(query: &Query, encoding: Encoding) -> String {
        match &query.entity_key {
            None => String::new(),
            Some(EntityKey::Int(id)) => format!("({id})"),
            Some(EntityKey::Uuid(id)) => format!("({})", id.hyphenated()),
            Some(EntityKey::String(id)) => format!("({})", key_literal(id, encoding)),
            Some(EntityKey::Composite(parts)) => {
                let rendered = parts
                    .iter()
                    .map(|(name, value)| format!("{name}={}", key_value(value, encoding)))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("({rendered})")
            }
        }
    }

    fn compile_count(query: &Query) -> String {
        if query.aggregate.is_count {
            "/$count".to_owned()
        } else {
            String::new()
        }
    }

    fn compile_properties(query: &Query) -> String {
        if query.aggregate.is_count {
            return String::new();
        }
        match query.properties.as_deref() {
            Some(props) if !props.is_empty() => format!("$select={}", props.join(",")),
            _ => String::new(),
        }
    }

    fn compile_wheres(&self, query: &Query) -> String {
        let body = self.compile_predicates(query);
        if body.is_empty() {
            body
        } else {
            format!("$filter={body}")
        }
    }

    fn compile_expands(query: &Query) -> String {
        if query.expansions.is_empty() {
            String::new()
        } else {
            format!("$expand={}", query.expansions.join(","))
        }
    }

    fn compile_orders(query: &Query) -> String {
        if let Some(raw) = &query.raw_order {
            return format!("$orderby={raw}");
        }
        if query.orders.is_empty() {
            return String::new();
        }
        let rendered = query
            .orders
            .iter()
            .map(|k| format!("{} {}", k.column, k.dir.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        format!("$orderby={rendered}")
    }

    fn compile_skip(query: &Query) -> String {
        query
            .skip
            .map(|n| format!("$skip={n}"))
            .unwrap_or_default()
    }

    fn compile_skip_token(query: &Query) -> String {
        query
            .skip_token
            .as_ref()
            .map(|t| format!("$skiptoken={t}"))
            .unwrap_or_default()
    }

    fn compile_take(query: &Query) -> String {
        if query.has_key() {
            return String::new();
        }
        query.take.map(|n| format!("$top={n}")).unwrap_or_default()
    }

    fn compile_total_count(query: &Query) -> String {
        if query.aggregate.wants_total_count && !query.has_key() {
            "$count=true".to_owned()
        } else {
            String::new()
        }
    }
}

/// Join non-empty segments.
///
/// A segment is prefixed with `&` only once the accumulated string contains
/// `?$`, i.e. once a `$` parameter has been opened. Path pieces such as the
/// key parenthetical or the bare `?` are appended as-is.
#[must_use]
pub fn concatenate(segments: &[String]) -> String {
    let mut uri = String::new();
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        if uri.contains("?$") {
            uri.push('&');
        }
        uri.push_str(segment);
    }
    uri
}

/// `$name=value` with the value percent-encoded; the name is left as is.
fn encode_param(param: &str) -> String {
    match param.split_once('=') {
        Some((name, value)) => format!("{name}={}", urlencoding::encode(value)),
        None => param.to_owned(),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn is_timestamp(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn key_literal(s: &str, encoding: Encoding) -> String {
    if INTEGER_LITERAL.is_match(s) || UUID_LITERAL.is_match(s) {
        return s.to_owned();
    }
    match encoding {
        Encoding::Raw => quote(s),
        Encoding::Percent => format!("'{}'", urlencoding::encode(&s.replace('\'', "''"))),
    }
}

fn key_value(value: &Value, encoding: Encoding) -> String {
    match value {
        Value::String(s) => key_literal(s, encoding),
        other => other.to_string(),
    }
}
