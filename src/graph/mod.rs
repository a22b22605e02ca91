//! Property graph model: nodes with typed attributes and directed links.
//!
//! A [`Graph`] keeps nodes and links in insertion order. Node ids are unique;
//! link endpoints may dangle, because the ingesters deliberately produce links
//! to ids that never get a node of their own.

mod model;
mod value;

pub use model::Graph;
pub use value::{AttributeValue, Attributes, Number};

use serde::{Deserialize, Serialize};

/// A graph vertex: a unique id plus its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Node {
    pub fn new(id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// A directed connection between two node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Only RDF predicate links carry attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

impl Link {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            attributes: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}
