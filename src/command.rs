//! Text commands that edit or narrow a graph.
//!
//! ```text
//! create node --id=1 --property=Name=Ann --property=Age=30
//! create edge --id=e1 1 2 --property=since=2020
//! edit node --id=1 --property=Age=31
//! delete node --id=1
//! delete edge --id=e1
//! search ann
//! filter Age >= 30
//! clear
//! ```

use crate::coerce::coerce_strict;
use crate::error::{GraphError, Result};
use crate::graph::{Attributes, Graph};
use crate::query::Query;

/// A parsed shell command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateNode {
        id: String,
        properties: Vec<(String, String)>,
    },
    CreateEdge {
        id: Option<String>,
        source: String,
        target: String,
        properties: Vec<(String, String)>,
    },
    EditNode {
        id: String,
        properties: Vec<(String, String)>,
    },
    DeleteNode {
        id: String,
    },
    DeleteEdge {
        id: String,
    },
    Search(String),
    Filter(Query),
    Clear,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let tokens = tokenize(line)?;
        let Some((cmd, args)) = tokens.split_first() else {
            return Err(GraphError::Command("No command entered".to_string()));
        };

        match cmd.as_str() {
            "create" => parse_create(args),
            "edit" => {
                expect_kind(args, "node", "edit")?;
                let parsed = Args::parse(&args[1..])?;
                Ok(Command::EditNode {
                    id: parsed.require_id("Node")?,
                    properties: parsed.properties,
                })
            }
            "delete" => match args.first().map(String::as_str) {
                Some("node") => Ok(Command::DeleteNode {
                    id: Args::parse(&args[1..])?.require_id("Node")?,
                }),
                Some("edge") => Ok(Command::DeleteEdge {
                    id: Args::parse(&args[1..])?.require_id("Edge")?,
                }),
                _ => Err(GraphError::Command("Usage: delete node|edge --id=<id>".to_string())),
            },
            "search" => Ok(Command::Search(args.join(" "))),
            "filter" => {
                let expression = args.join(" ");
                match Query::parse(&expression) {
                    query @ Query::Filter { .. } => Ok(Command::Filter(query)),
                    Query::Search(_) => Err(GraphError::Command(format!(
                        "Invalid filter expression: {}",
                        expression
                    ))),
                }
            }
            "clear" => Ok(Command::Clear),
            other => Err(GraphError::Command(format!("Unknown command: {}", other))),
        }
    }

    /// Whether the command changes the loaded data rather than the current view.
    pub fn is_edit(&self) -> bool {
        !matches!(self, Command::Search(_) | Command::Filter(_) | Command::Clear)
    }

    /// Run the command against `graph` and describe the outcome.
    pub fn execute(&self, graph: &mut Graph) -> Result<String> {
        match self {
            Command::CreateNode { id, properties } => {
                if !graph.add_node(id.clone(), to_attributes(properties)) {
                    return Err(GraphError::Command(format!("Node {} already exists", id)));
                }
                Ok(format!("Node {} created", id))
            }
            Command::CreateEdge {
                id,
                source,
                target,
                properties,
            } => {
                let id = id
                    .clone()
                    .unwrap_or_else(|| format!("{}_to_{}", source, target));
                let added = if properties.is_empty() {
                    graph.add_link(id.clone(), source.as_str(), target.as_str())
                } else {
                    graph.add_link_with_attributes(
                        id.clone(),
                        source.as_str(),
                        target.as_str(),
                        to_attributes(properties),
                    )
                };
                if !added {
                    return Err(GraphError::Command(format!(
                        "Edge {} needs existing nodes {} and {}",
                        id, source, target
                    )));
                }
                Ok(format!("Edge {} created between {} and {}", id, source, target))
            }
            Command::EditNode { id, properties } => {
                let node = graph
                    .node_mut(id)
                    .ok_or_else(|| GraphError::Command(format!("Node {} not found", id)))?;
                node.attributes.extend(to_attributes(properties));
                Ok(format!("Node {} updated", id))
            }
            Command::DeleteNode { id } => {
                if !graph.contains_node(id) {
                    return Err(GraphError::Command(format!("Node {} not found", id)));
                }
                if graph.links_touching(id).next().is_some() {
                    return Err(GraphError::Command(format!(
                        "Cannot delete node {}, it still has edges",
                        id
                    )));
                }
                graph.remove_node(id);
                Ok(format!("Node {} deleted", id))
            }
            Command::DeleteEdge { id } => match graph.remove_link(id) {
                0 => Err(GraphError::Command(format!("Edge {} not found", id))),
                _ => Ok(format!("Edge {} deleted", id)),
            },
            Command::Search(text) => {
                let query = Query::search(text.as_str());
                replace_with(graph, &query)?;
                Ok(format!("Searched for: {}", text))
            }
            Command::Filter(query) => {
                replace_with(graph, query)?;
                Ok(format!("Applied filter: {}", query))
            }
            Command::Clear => {
                graph.clear();
                Ok("Graph cleared".to_string())
            }
        }
    }
}

fn replace_with(graph: &mut Graph, query: &Query) -> Result<()> {
    let result = query.apply(graph)?.into_owned();
    *graph = result;
    Ok(())
}

fn to_attributes(properties: &[(String, String)]) -> Attributes {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), coerce_strict(v)))
        .collect()
}

fn expect_kind(args: &[String], kind: &str, cmd: &str) -> Result<()> {
    match args.first() {
        Some(k) if k == kind => Ok(()),
        _ => Err(GraphError::Command(format!("Usage: {} {} --id=<id> ...", cmd, kind))),
    }
}

fn parse_create(args: &[String]) -> Result<Command> {
    match args.first().map(String::as_str) {
        Some("node") => {
            let parsed = Args::parse(&args[1..])?;
            if !parsed.positional.is_empty() {
                return Err(GraphError::Command(format!(
                    "Unexpected argument: {}",
                    parsed.positional[0]
                )));
            }
            Ok(Command::CreateNode {
                id: parsed.require_id("Node")?,
                properties: parsed.properties,
            })
        }
        Some("edge") => {
            let parsed = Args::parse(&args[1..])?;
            let [source, target] = parsed.positional.as_slice() else {
                return Err(GraphError::Command(
                    "Edge requires source and target node IDs".to_string(),
                ));
            };
            Ok(Command::CreateEdge {
                id: parsed.id.clone(),
                source: source.clone(),
                target: target.clone(),
                properties: parsed.properties.clone(),
            })
        }
        _ => Err(GraphError::Command("Usage: create node|edge ...".to_string())),
    }
}

/// `--id=`, `--property=Key=Value` and positional arguments of one command
#[derive(Debug, Default)]
struct Args {
    id: Option<String>,
    properties: Vec<(String, String)>,
    positional: Vec<String>,
}

impl Args {
    fn parse(tokens: &[String]) -> Result<Self> {
        let mut args = Args::default();
        for token in tokens {
            if let Some(id) = token.strip_prefix("--id=") {
                args.id = Some(id.to_string());
            } else if let Some(property) = token.strip_prefix("--property=") {
                let (key, value) = property
                    .split_once('=')
                    .filter(|(k, _)| !k.is_empty())
                    .ok_or_else(|| {
                        GraphError::Command(format!(
                            "Invalid property format: {}. Use --property=Key=Value",
                            token
                        ))
                    })?;
                args.properties.push((key.to_string(), value.to_string()));
            } else if token.starts_with("--") {
                return Err(GraphError::Command(format!("Unknown flag: {}", token)));
            } else {
                args.positional.push(token.clone());
            }
        }
        Ok(args)
    }

    fn require_id(&self, what: &str) -> Result<String> {
        match &self.id {
            Some(id) if !id.is_empty() => Ok(id.clone()),
            _ => Err(GraphError::Command(format!("{} requires --id", what))),
        }
    }
}

/// Split a command line into words, honoring single quotes, double quotes and
/// backslash escapes.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(GraphError::Command("No closing quotation".to_string())),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => {
                                return Err(GraphError::Command("No closing quotation".to_string()))
                            }
                        },
                        Some(c) => current.push(c),
                        None => return Err(GraphError::Command("No closing quotation".to_string())),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err(GraphError::Command("No escaped character".to_string())),
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
