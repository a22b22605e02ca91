//! Graph Explorer: turn nested JSON, XML and Turtle data into a property graph
//! and narrow it with text search and typed attribute filters.

pub mod coerce;
pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod query;
pub mod server;
pub mod turtle;
pub mod workspace;

pub use config::Config;
pub use error::{GraphError, Result};
pub use graph::{AttributeValue, Attributes, Graph, Link, Node};
pub use query::{filter, search, FilterOp, Query};
