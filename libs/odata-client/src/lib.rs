#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Client-side `OData` v4 query compiler
//!
//! This crate turns fluent, SQL-like query building into `OData` request URIs
//! and decodes the responses:
//! - Query model with nested predicate groups, ordering, expansion and paging
//! - Grammar compiling the model to a relative URI in a fixed component order
//! - Response decoder that tolerates malformed bodies
//! - Lazy pagination over `@odata.nextLink`, blocking or as a `Stream`
//!
//! The HTTP round-trip is delegated to a caller-supplied [`Transport`].
//!
//! # Example
//!
//! ```ignore
//! use odata_client::{ODataClient, SortDir};
//!
//! let client = ODataClient::builder(my_transport)
//!     .base_url("https://services.odata.org/V4/TripPinService/")
//!     .build()?;
//!
//! let uri = client
//!     .from("People")
//!     .select(["FirstName", "LastName"])
//!     .where_op("FirstName", "startswith", "S")
//!     .or_where_nested(|q| q.where_eq("Gender", "Female").where_op("Age", ">", 30))
//!     .order_by("LastName", SortDir::Asc)
//!     .take(10)
//!     .compile()?;
//!
//! let total = client.from("People").count()?;
//! ```

mod builder;
mod client;
mod config;
mod error;
pub mod grammar;
pub mod pager;
pub mod query;
pub mod response;
pub mod transport;
mod value;

pub use builder::{GetOptions, QueryBuilder};
pub use client::{ODataClient, ODataClientBuilder};
pub use config::{DEFAULT_ODATA_VERSION, DEFAULT_USER_AGENT, ODataClientConfig};
pub use error::{BoxError, Error};
pub use grammar::Grammar;
pub use pager::{Cursor, CursorStream, ItemsStream, PageStream, Pages, PagesStream};
pub use query::{Connector, OrderKey, Query, SortDir};
pub use response::DecodedResponse;
pub use transport::{Authenticator, Transport, TransportRequest, TransportResponse};
pub use value::{EntityKey, IntoODataValue, Value};
