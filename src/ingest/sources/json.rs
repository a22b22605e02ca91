//! Hierarchical JSON ingestion.
//!
//! Expected shape:
//!
//! ```json
//! {
//!     "@id": "28dd",
//!     "name": "I'm parent",
//!     "children": [
//!         { "@id": "6616", "name": "I'm first child", "parent": "28dd" }
//!     ]
//! }
//! ```
//!
//! The document may also be an array of such objects.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use super::{lenient_usize, merge_options, DataSource, ParameterSpec, SourceOptions};
use crate::coerce::coerce_lenient;
use crate::error::{GraphError, Result};
use crate::graph::{AttributeValue, Attributes, Graph, Link};
use crate::ingest::reader::SourceReader;

/// Options of the JSON data source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    pub id_field: String,
    pub children_field: String,
    pub parent_field: String,
    #[serde(deserialize_with = "lenient_usize")]
    pub max_depth: usize,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            id_field: "@id".to_string(),
            children_field: "children".to_string(),
            parent_field: "parent".to_string(),
            max_depth: 10,
        }
    }
}

/// Data source for JSON trees with optional parent back-references
pub struct JsonDataSource {
    defaults: JsonOptions,
    reader: SourceReader,
}

impl JsonDataSource {
    pub fn new(defaults: JsonOptions, reader: SourceReader) -> Self {
        Self { defaults, reader }
    }
}

impl Default for JsonDataSource {
    fn default() -> Self {
        Self::new(JsonOptions::default(), SourceReader::default())
    }
}

impl DataSource for JsonDataSource {
    fn id(&self) -> &'static str {
        "json_data_source"
    }

    fn name(&self) -> &'static str {
        "JSON Data Source"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".json"]
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::source(),
            ParameterSpec::optional("id_field", "string", "Field name for node ID", json!(self.defaults.id_field)),
            ParameterSpec::optional(
                "children_field",
                "string",
                "Field name for children array",
                json!(self.defaults.children_field),
            ),
            ParameterSpec::optional(
                "parent_field",
                "string",
                "Field name for parent reference",
                json!(self.defaults.parent_field),
            ),
            ParameterSpec::optional("max_depth", "integer", "Maximum parsing depth", json!(self.defaults.max_depth)),
        ]
    }

    fn reader(&self) -> &SourceReader {
        &self.reader
    }

    fn load_str(&self, content: &str, options: &SourceOptions) -> Result<Graph> {
        let options: JsonOptions = merge_options(&self.defaults, options)?;
        let data: JsonValue =
            serde_json::from_str(content).map_err(|e| GraphError::malformed("JSON", e))?;
        Ok(build_graph(&data, &options))
    }
}

/// Walk the document depth-first from every top-level object.
pub fn build_graph(data: &JsonValue, options: &JsonOptions) -> Graph {
    let mut walker = TreeWalker {
        options,
        graph: Graph::new(),
        visited: HashSet::new(),
    };
    match data {
        JsonValue::Object(obj) => walker.visit(obj, 0, None),
        JsonValue::Array(items) => {
            for item in items {
                if let JsonValue::Object(obj) = item {
                    walker.visit(obj, 0, None);
                }
            }
        }
        _ => log::warn!("JSON document is neither an object nor an array; graph is empty"),
    }
    walker.graph
}

struct TreeWalker<'a> {
    options: &'a JsonOptions,
    graph: Graph,
    /// First visit of an id wins; later occurrences are not descended.
    visited: HashSet<String>,
}

impl<'a> TreeWalker<'a> {
    fn visit(&mut self, obj: &Map<String, JsonValue>, depth: usize, parent_id: Option<&str>) {
        if depth > self.options.max_depth {
            return;
        }

        let Some(node_id) = obj.get(&self.options.id_field).and_then(id_string) else {
            log::debug!("Skipping object without '{}' at depth {}", self.options.id_field, depth);
            return;
        };
        if !self.visited.insert(node_id.clone()) {
            log::debug!("Node {} already visited, not descending again", node_id);
            return;
        }

        self.graph.add_node(node_id.clone(), self.attributes(obj));

        if let Some(parent_id) = parent_id {
            self.graph
                .add_link(format!("{}_to_{}", parent_id, node_id), parent_id, node_id.as_str());
        }

        if let Some(JsonValue::Array(children)) = obj.get(&self.options.children_field) {
            for child in children {
                if let JsonValue::Object(child) = child {
                    self.visit(child, depth + 1, Some(node_id.as_str()));
                }
            }
        }

        let parent_ref = obj.get(&self.options.parent_field).and_then(id_string);
        if let Some(parent_ref) = parent_ref {
            if parent_id != Some(parent_ref.as_str()) {
                // the referenced node may never appear; the link is kept dangling
                self.graph.push_link(Link::new(
                    format!("{}_to_{}", node_id, parent_ref),
                    node_id.as_str(),
                    parent_ref,
                ));
            }
        }
    }

    fn attributes(&self, obj: &Map<String, JsonValue>) -> Attributes {
        let opts = self.options;
        obj.iter()
            .filter(|(key, _)| {
                **key != opts.id_field && **key != opts.children_field && **key != opts.parent_field
            })
            .map(|(key, value)| {
                let value = match value {
                    JsonValue::String(s) => coerce_lenient(s),
                    other => AttributeValue::from(other.clone()),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Identifier text of a JSON scalar. Empty strings, null and containers are not ids.
fn id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
