use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::{Attributes, Link, Node};
use crate::error::{GraphError, Result};

/// Insertion-ordered node and link collections with a unique-id index over nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphData")]
pub struct Graph {
    nodes: Vec<Node>,
    links: Vec<Link>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Wire shape of a graph; the id index is rebuilt on conversion.
#[derive(Deserialize)]
struct GraphData {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    links: Vec<Link>,
}

impl From<GraphData> for Graph {
    fn from(data: GraphData) -> Self {
        let mut graph = Graph::new();
        for node in data.nodes {
            graph.add_node(node.id, node.attributes);
        }
        graph.links = data.links;
        graph
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.links == other.links
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        match self.index.get(id) {
            Some(&i) => self.nodes.get_mut(i),
            None => None,
        }
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    /// Add a node. Returns `false` and leaves the graph untouched if the id exists.
    pub fn add_node(&mut self, id: impl Into<String>, attributes: Attributes) -> bool {
        let id = id.into();
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node::new(id, attributes));
        true
    }

    /// Strict link insertion: both endpoints must already be nodes.
    pub fn add_link(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> bool {
        self.add_checked(Link::new(id, source, target))
    }

    /// Strict link insertion for a link carrying attributes.
    pub fn add_link_with_attributes(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        attributes: Attributes,
    ) -> bool {
        self.add_checked(Link::new(id, source, target).with_attributes(attributes))
    }

    fn add_checked(&mut self, link: Link) -> bool {
        if !self.contains_node(&link.source) || !self.contains_node(&link.target) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Relaxed link insertion: missing endpoints are created with empty attributes.
    pub fn add_link_relaxed(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> bool {
        let link = Link::new(id, source, target);
        self.add_node(link.source.clone(), Attributes::new());
        self.add_node(link.target.clone(), Attributes::new());
        self.links.push(link);
        true
    }

    /// Append a link without checking its endpoints.
    pub fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Links whose source or target is `id`.
    pub fn links_touching<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links
            .iter()
            .filter(move |l| l.source == id || l.target == id)
    }

    /// Remove a node by id. Links are left alone; callers decide how to treat them.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let pos = self.index.remove(id)?;
        let node = self.nodes.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(node)
    }

    /// Remove every link with the given id. Returns how many were removed.
    pub fn remove_link(&mut self, id: &str) -> usize {
        let before = self.links.len();
        self.links.retain(|l| l.id != id);
        before - self.links.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.index.clear();
    }

    /// Serialize to `{"nodes": [...], "links": [...]}` with dates as ISO strings.
    pub fn to_dict(&self) -> JsonValue {
        let nodes: Vec<JsonValue> = self
            .nodes
            .iter()
            .map(|n| {
                let attributes: serde_json::Map<String, JsonValue> = n
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                json!({"id": n.id, "attributes": attributes})
            })
            .collect();
        let links: Vec<JsonValue> = self
            .links
            .iter()
            .map(|l| {
                let mut value = json!({"id": l.id, "source": l.source, "target": l.target});
                if let Some(attrs) = &l.attributes {
                    let attributes: serde_json::Map<String, JsonValue> = attrs
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json()))
                        .collect();
                    value["attributes"] = JsonValue::Object(attributes);
                }
                value
            })
            .collect();
        json!({"nodes": nodes, "links": links})
    }

    /// Rebuild a graph from [`Graph::to_dict`] output. `null` and `{}` give an empty graph.
    pub fn from_dict(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(map) if map.is_empty() => Ok(Self::new()),
            JsonValue::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| GraphError::InvalidInput(format!("invalid graph data: {}", e))),
            other => Err(GraphError::InvalidInput(format!(
                "graph data must be an object, got {}",
                other
            ))),
        }
    }
}
