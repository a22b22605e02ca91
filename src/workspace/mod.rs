//! Workspaces: a loaded graph, the view narrowed by its query chain, and the
//! service keeping track of open workspaces.

pub mod store;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::command::Command;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::query::Query;

pub use store::WorkspaceStore;

pub const DEFAULT_VISUALIZER: &str = "simple_visualizer";

/// One working session over a graph.
///
/// `graph` is what was loaded (plus edits), `filtered_graph` is `graph` with
/// every query of `applied_filters` applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(rename = "graph_data", default, deserialize_with = "nullable_graph")]
    graph: Graph,
    #[serde(rename = "filtered_graph_data", default, deserialize_with = "nullable_graph")]
    filtered_graph: Graph,
    #[serde(default)]
    applied_filters: Vec<Query>,
    #[serde(default)]
    pub current_data_source_id: Option<String>,
    #[serde(default = "default_visualizer")]
    pub current_visualizer_id: String,
    /// Opaque per-plugin settings, kept as JSON text
    #[serde(default = "default_extensions")]
    pub plugin_extensions_json: String,
}

fn default_visualizer() -> String {
    DEFAULT_VISUALIZER.to_string()
}

fn default_extensions() -> String {
    "{}".to_string()
}

fn nullable_graph<'de, D>(deserializer: D) -> std::result::Result<Graph, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Graph>::deserialize(deserializer)?.unwrap_or_default())
}

impl Workspace {
    /// Empty workspace with a fresh id. The name defaults to `Workspace-<first 8 id chars>`.
    pub fn new(name: Option<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Workspace-{}", &id[..8]));
        Self {
            id,
            name,
            graph: Graph::new(),
            filtered_graph: Graph::new(),
            applied_filters: Vec::new(),
            current_data_source_id: None,
            current_visualizer_id: default_visualizer(),
            plugin_extensions_json: default_extensions(),
        }
    }

    pub fn with_graph(graph: Graph, name: Option<String>) -> Self {
        let mut ws = Self::new(name);
        ws.load_graph(graph, None);
        ws
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn filtered_graph(&self) -> &Graph {
        &self.filtered_graph
    }

    pub fn applied_filters(&self) -> &[Query] {
        &self.applied_filters
    }

    /// Replace the loaded graph. The query chain is dropped.
    pub fn load_graph(&mut self, graph: Graph, data_source_id: Option<String>) {
        self.filtered_graph = graph.clone();
        self.graph = graph;
        self.applied_filters.clear();
        if data_source_id.is_some() {
            self.current_data_source_id = data_source_id;
        }
    }

    /// Narrow the current view with `query`. Queries that leave the view
    /// untouched (blank search, unusable filter) are not recorded; returns
    /// whether the query was recorded.
    pub fn apply_query(&mut self, query: Query) -> Result<bool> {
        let narrowed = match query.apply(&self.filtered_graph)? {
            std::borrow::Cow::Borrowed(_) => return Ok(false),
            std::borrow::Cow::Owned(graph) => graph,
        };
        log::debug!(
            "Workspace {}: '{}' kept {} of {} nodes",
            self.id,
            query,
            narrowed.node_count(),
            self.filtered_graph.node_count()
        );
        self.filtered_graph = narrowed;
        self.applied_filters.push(query);
        Ok(true)
    }

    /// Parse and apply a query expression (`age > 30`, `alice`).
    pub fn apply_expression(&mut self, expression: &str) -> Result<bool> {
        self.apply_query(Query::parse(expression))
    }

    /// Drop every query and show the whole graph again.
    pub fn reset(&mut self) {
        self.filtered_graph = self.graph.clone();
        self.applied_filters.clear();
    }

    /// Remove the query at `index` and rebuild the view from the remaining chain.
    pub fn remove_filter(&mut self, index: usize) -> Result<Query> {
        if index >= self.applied_filters.len() {
            return Err(GraphError::InvalidInput(format!(
                "no applied query at position {}",
                index
            )));
        }
        let mut remaining = self.applied_filters.clone();
        let removed = remaining.remove(index);
        self.filtered_graph = replay(&self.graph, &remaining)?;
        self.applied_filters = remaining;
        Ok(removed)
    }

    /// Run a shell command. Search and filter extend the query chain, `clear`
    /// empties the workspace, edits change the loaded graph and the chain is
    /// replayed over the result.
    pub fn run_command(&mut self, line: &str) -> Result<String> {
        let command = Command::parse(line)?;
        match &command {
            Command::Search(text) => {
                self.apply_query(Query::search(text.as_str()))?;
                Ok(format!("Searched for: {}", text))
            }
            Command::Filter(query) => {
                self.apply_query(query.clone())?;
                Ok(format!("Applied filter: {}", query))
            }
            Command::Clear => {
                self.load_graph(Graph::new(), None);
                Ok("Graph cleared".to_string())
            }
            _ => {
                let mut graph = self.graph.clone();
                let message = command.execute(&mut graph)?;
                self.filtered_graph = replay(&graph, &self.applied_filters)?;
                self.graph = graph;
                Ok(message)
            }
        }
    }
}

fn replay(graph: &Graph, queries: &[Query]) -> Result<Graph> {
    let mut view = graph.clone();
    for query in queries {
        view = query.apply(&view)?.into_owned();
    }
    Ok(view)
}

/// In-memory list of open workspaces and the current selection
#[derive(Debug)]
pub struct WorkspaceService {
    workspaces: Vec<Workspace>,
    current: Option<String>,
    default_visualizer: String,
}

impl Default for WorkspaceService {
    fn default() -> Self {
        Self::new(DEFAULT_VISUALIZER)
    }
}

impl WorkspaceService {
    pub fn new(default_visualizer: impl Into<String>) -> Self {
        Self {
            workspaces: Vec::new(),
            current: None,
            default_visualizer: default_visualizer.into(),
        }
    }

    /// Add previously saved workspaces, skipping ids already open.
    pub fn restore(&mut self, workspaces: impl IntoIterator<Item = Workspace>) {
        for ws in workspaces {
            if self.workspaces.iter().all(|w| w.id != ws.id) {
                self.workspaces.push(ws);
            }
        }
    }

    /// Create a workspace and make it current.
    pub fn create(&mut self, graph: Option<Graph>, name: Option<String>) -> &mut Workspace {
        let mut ws = match graph {
            Some(graph) => Workspace::with_graph(graph, name),
            None => Workspace::new(name),
        };
        ws.current_visualizer_id = self.default_visualizer.clone();
        log::info!("Created workspace {} ({})", ws.name, ws.id);
        self.current = Some(ws.id.clone());
        self.workspaces.push(ws);
        let last = self.workspaces.len() - 1;
        &mut self.workspaces[last]
    }

    pub fn current(&self) -> Option<&Workspace> {
        let id = self.current.as_deref()?;
        self.workspaces.iter().find(|w| w.id == id)
    }

    pub fn current_mut(&mut self) -> Option<&mut Workspace> {
        let id = self.current.clone()?;
        self.workspaces.iter_mut().find(|w| w.id == id)
    }

    pub fn select(&mut self, id: &str) -> Result<&Workspace> {
        let pos = self.position(id)?;
        self.current = Some(id.to_string());
        Ok(&self.workspaces[pos])
    }

    pub fn list(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn get(&self, id: &str) -> Result<&Workspace> {
        let pos = self.position(id)?;
        Ok(&self.workspaces[pos])
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Workspace> {
        let pos = self.position(id)?;
        Ok(&mut self.workspaces[pos])
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::InvalidInput("workspace name must not be empty".to_string()));
        }
        self.get_mut(id)?.name = name.to_string();
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.workspaces
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| GraphError::WorkspaceNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttributeValue, Attributes};

    fn people() -> Graph {
        let mut g = Graph::new();
        for (id, age, city) in [("1", 25, "Rome"), ("2", 35, "Oslo"), ("3", 45, "Rome")] {
            let mut attrs = Attributes::new();
            attrs.insert("age".into(), AttributeValue::Int(age));
            attrs.insert("city".into(), AttributeValue::from(city));
            g.add_node(id, attrs);
        }
        g.add_link("a", "1", "2");
        g
    }

    fn view_ids(ws: &Workspace) -> Vec<&str> {
        ws.filtered_graph().nodes().iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_new_workspace_defaults() {
        let ws = Workspace::new(None);
        assert_eq!(ws.name, format!("Workspace-{}", &ws.id[..8]));
        assert_eq!(ws.current_visualizer_id, "simple_visualizer");
        assert_eq!(ws.plugin_extensions_json, "{}");
        assert!(ws.graph().is_empty());
        assert_eq!(Workspace::new(Some("Mine".into())).name, "Mine");
    }

    #[test]
    fn test_query_chain_and_reset() {
        let mut ws = Workspace::with_graph(people(), None);
        assert!(ws.apply_expression("age > 30").unwrap());
        assert!(ws.apply_expression("rome").unwrap());
        assert_eq!(view_ids(&ws), vec!["3"]);
        assert_eq!(
            ws.applied_filters().iter().map(|q| q.to_string()).collect::<Vec<_>>(),
            vec!["age > 30", "search: rome"]
        );
        // the loaded graph is untouched
        assert_eq!(ws.graph().node_count(), 3);

        ws.reset();
        assert_eq!(view_ids(&ws), vec!["1", "2", "3"]);
        assert!(ws.applied_filters().is_empty());
    }

    #[test]
    fn test_noop_queries_are_not_recorded() {
        let mut ws = Workspace::with_graph(people(), None);
        assert!(!ws.apply_expression("   ").unwrap());
        assert!(!ws.apply_query(Query::filter("age", crate::query::FilterOp::Eq, " ")).unwrap());
        assert!(ws.applied_filters().is_empty());
    }

    #[test]
    fn test_type_mismatch_leaves_view_alone() {
        let mut ws = Workspace::with_graph(people(), None);
        assert!(matches!(
            ws.apply_expression("age > old"),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert_eq!(ws.filtered_graph().node_count(), 3);
        assert!(ws.applied_filters().is_empty());
    }

    #[test]
    fn test_remove_filter_replays_remaining() {
        let mut ws = Workspace::with_graph(people(), None);
        ws.apply_expression("age > 30").unwrap();
        ws.apply_expression("rome").unwrap();

        let removed = ws.remove_filter(0).unwrap();
        assert_eq!(removed.to_string(), "age > 30");
        assert_eq!(view_ids(&ws), vec!["1", "3"]);
        assert!(ws.remove_filter(5).is_err());
    }

    #[test]
    fn test_commands_edit_graph_and_replay_chain() {
        let mut ws = Workspace::with_graph(people(), None);
        ws.run_command("filter age >= 35").unwrap();
        assert_eq!(view_ids(&ws), vec!["2", "3"]);

        ws.run_command("create node --id=4 --property=age=50").unwrap();
        assert_eq!(view_ids(&ws), vec!["2", "3", "4"]);
        assert_eq!(ws.graph().node_count(), 4);

        assert!(ws.run_command("delete node --id=1").is_err());
        assert_eq!(ws.graph().node_count(), 4);

        ws.run_command("clear").unwrap();
        assert!(ws.graph().is_empty());
        assert!(ws.applied_filters().is_empty());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut ws = Workspace::with_graph(people(), Some("People".into()));
        ws.apply_expression("city == oslo").unwrap();
        let json = serde_json::to_value(&ws).unwrap();
        assert_eq!(json["applied_filters"], serde_json::json!(["city == oslo"]));
        assert!(json["graph_data"]["nodes"].is_array());

        let back: Workspace = serde_json::from_value(json).unwrap();
        assert_eq!(back, ws);
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let ws: Workspace = serde_json::from_value(serde_json::json!({
            "id": "abc", "name": "n", "graph_data": null
        }))
        .unwrap();
        assert!(ws.graph().is_empty());
        assert_eq!(ws.current_visualizer_id, "simple_visualizer");
    }

    #[test]
    fn test_service_lifecycle() {
        let mut service = WorkspaceService::new("block_visualizer");
        assert!(service.current().is_none());

        let first = service.create(Some(people()), None).id.clone();
        let second = service.create(None, Some("Empty".into())).id.clone();
        assert_eq!(service.current().unwrap().id, second);
        assert_eq!(service.current().unwrap().current_visualizer_id, "block_visualizer");

        service.select(&first).unwrap();
        assert_eq!(service.current().unwrap().graph().node_count(), 3);
        assert!(matches!(
            service.select("missing"),
            Err(GraphError::WorkspaceNotFound(_))
        ));

        service.rename(&second, "Renamed").unwrap();
        assert_eq!(service.get(&second).unwrap().name, "Renamed");
        assert!(service.rename(&second, "  ").is_err());
        assert!(service.rename("missing", "x").is_err());
        assert_eq!(service.list().len(), 2);

        service.restore(vec![Workspace::new(None), service.list()[0].clone()]);
        assert_eq!(service.list().len(), 3);
    }
}
