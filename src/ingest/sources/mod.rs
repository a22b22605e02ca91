pub mod json;
pub mod rdf;
pub mod xml;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::reader::{source_extension, SourceReader};
use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::graph::Graph;

pub use json::{JsonDataSource, JsonOptions};
pub use rdf::RdfDataSource;
pub use xml::{XmlDataSource, XmlOptions};

/// Per-call options handed to a data source, keyed by parameter name.
pub type SourceOptions = serde_json::Map<String, JsonValue>;

/// Description of one parameter a data source accepts.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    pub required: bool,
}

impl ParameterSpec {
    fn source() -> Self {
        Self {
            name: "source",
            kind: "string",
            description: "Path to the file or an http(s) URL",
            default: None,
            required: true,
        }
    }

    fn optional(
        name: &'static str,
        kind: &'static str,
        description: &'static str,
        default: JsonValue,
    ) -> Self {
        Self {
            name,
            kind,
            description,
            default: Some(default),
            required: false,
        }
    }
}

/// A format-specific ingester turning a source into a [`Graph`].
pub trait DataSource: Send + Sync {
    /// Unique identifier, e.g. `json_data_source`
    fn id(&self) -> &'static str;

    /// Human readable name
    fn name(&self) -> &'static str;

    /// Extensions (with leading dot) this source handles
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Parameters accepted by [`DataSource::load_data`]
    fn parameters(&self) -> Vec<ParameterSpec>;

    /// Reader used to fetch the raw source
    fn reader(&self) -> &SourceReader;

    /// Build a graph from already loaded source text.
    fn load_str(&self, content: &str, options: &SourceOptions) -> Result<Graph>;

    /// Read `source` (path or URL) and build a graph from it.
    fn load_data(&self, source: &str, options: &SourceOptions) -> Result<Graph> {
        let content = self.reader().read(source)?;
        let graph = self.load_str(&content, options)?;
        log::info!(
            "{} loaded {}: {} nodes, {} links",
            self.name(),
            source,
            graph.node_count(),
            graph.link_count()
        );
        Ok(graph)
    }

    fn can_load(&self, source: &str) -> bool {
        source_extension(source)
            .map(|ext| self.supported_extensions().contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

/// Parse a `key=value` option from the command line. Values that read as JSON
/// (`3`, `false`, `["a"]`) keep that type, anything else is a string.
pub fn parse_option(raw: &str) -> Result<(String, JsonValue)> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(k, _)| !k.trim().is_empty())
        .ok_or_else(|| GraphError::InvalidOptions(format!("expected key=value, got '{}'", raw)))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

/// Overlay call options onto a source's configured defaults.
pub(crate) fn merge_options<T>(defaults: &T, overrides: &SourceOptions) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = match serde_json::to_value(defaults) {
        Ok(JsonValue::Object(map)) => map,
        Ok(_) => SourceOptions::new(),
        Err(e) => return Err(GraphError::InvalidOptions(e.to_string())),
    };
    for (key, value) in overrides {
        if !merged.contains_key(key) {
            log::warn!("Ignoring unknown option '{}'", key);
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(JsonValue::Object(merged))
        .map_err(|e| GraphError::InvalidOptions(e.to_string()))
}

/// Accept either a JSON list of strings or one comma/space separated string.
pub(crate) fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        OneOrMany::Many(items) => items,
    })
}

/// Accept a JSON number or a numeric string.
pub(crate) fn lenient_usize<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrText {
        Num(usize),
        Text(String),
    }

    match NumOrText::deserialize(deserializer)? {
        NumOrText::Num(n) => Ok(n),
        NumOrText::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Accept a JSON bool or the strings `true`/`false` in any case.
pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrText {
        Bool(bool),
        Text(String),
    }

    match BoolOrText::deserialize(deserializer)? {
        BoolOrText::Bool(b) => Ok(b),
        BoolOrText::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean '{}'", other))),
        },
    }
}

/// Registry selecting a data source by id or by the source's extension
pub struct DataSourceRegistry {
    sources: Vec<Box<dyn DataSource>>,
}

impl DataSourceRegistry {
    /// Registry with the JSON, XML and RDF sources configured from `config`
    pub fn new(config: &Config) -> Self {
        let reader = SourceReader::new(config.sources.http_timeout());
        let mut registry = Self::empty();
        registry.register(Box::new(JsonDataSource::new(config.json.clone(), reader.clone())));
        registry.register(Box::new(XmlDataSource::new(config.xml.clone(), reader.clone())));
        registry.register(Box::new(RdfDataSource::new(reader)));
        registry
    }

    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: Box<dyn DataSource>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> impl Iterator<Item = &dyn DataSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&dyn DataSource> {
        self.sources().find(|s| s.id() == id)
    }

    pub fn find_for_source(&self, source: &str) -> Option<&dyn DataSource> {
        self.sources().find(|s| s.can_load(source))
    }

    /// The data source named by `data_source_id`, or else the one matching the
    /// extension of `source`.
    pub fn resolve(&self, source: &str, data_source_id: Option<&str>) -> Result<&dyn DataSource> {
        match data_source_id {
            Some(id) => self
                .find_by_id(id)
                .ok_or_else(|| GraphError::UnsupportedSource(format!("unknown data source '{}'", id))),
            None => self.find_for_source(source).ok_or_else(|| {
                GraphError::UnsupportedSource(format!("no data source handles '{}'", source))
            }),
        }
    }

    /// Load `source` with the named data source, or the one matching its extension.
    pub fn load(
        &self,
        source: &str,
        data_source_id: Option<&str>,
        options: &SourceOptions,
    ) -> Result<Graph> {
        self.resolve(source, data_source_id)?
            .load_data(source, options)
    }
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_registry_lookup() {
        let registry = DataSourceRegistry::default();
        assert_eq!(registry.find_for_source("a.json").unwrap().id(), "json_data_source");
        assert_eq!(registry.find_for_source("a.XML").unwrap().id(), "xml_data_source");
        assert_eq!(
            registry.find_for_source("https://example.org/x.ttl").unwrap().id(),
            "rdf_data_source"
        );
        assert!(registry.find_for_source("a.csv").is_none());
        assert!(registry.find_by_id("xml_data_source").is_some());
    }

    #[test]
    fn test_registry_load_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.json");
        fs::write(&path, r#"{"@id": "A", "children": [{"@id": "B"}]}"#).unwrap();

        let registry = DataSourceRegistry::default();
        let graph = registry
            .load(path.to_str().unwrap(), None, &SourceOptions::new())
            .unwrap();
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_registry_unsupported() {
        let registry = DataSourceRegistry::default();
        let err = registry.load("data.csv", None, &SourceOptions::new()).unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedSource(_)));
        let err = registry
            .load("data.json", Some("nope"), &SourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedSource(_)));
    }

    #[test]
    fn test_merge_options_overrides_and_coerces() {
        let defaults = XmlOptions::default();
        let mut overrides = SourceOptions::new();
        overrides.insert("max_depth".into(), json!("3"));
        overrides.insert("directed".into(), json!("False"));
        overrides.insert("ref_attributes".into(), json!("ref, next"));
        overrides.insert("unknown".into(), json!(1));

        let merged: XmlOptions = merge_options(&defaults, &overrides).unwrap();
        assert_eq!(merged.max_depth, 3);
        assert!(!merged.directed);
        assert_eq!(merged.ref_attributes, vec!["ref".to_string(), "next".to_string()]);
        assert_eq!(merged.id_field, "id");
    }

    #[test]
    fn test_parse_option() {
        assert_eq!(parse_option("max_depth=3").unwrap(), ("max_depth".to_string(), json!(3)));
        assert_eq!(parse_option("directed=false").unwrap().1, json!(false));
        assert_eq!(parse_option("id_field=@id").unwrap().1, json!("@id"));
        assert_eq!(parse_option("ref_attributes=a=b").unwrap().1, json!("a=b"));
        assert!(parse_option("novalue").is_err());
        assert!(parse_option("=x").is_err());
    }

    #[test]
    fn test_merge_options_rejects_bad_types() {
        let mut overrides = SourceOptions::new();
        overrides.insert("max_depth".into(), json!("deep"));
        let err = merge_options(&JsonOptions::default(), &overrides).unwrap_err();
        assert!(matches!(err, GraphError::InvalidOptions(_)));
    }
}
