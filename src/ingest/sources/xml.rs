//! XML ingestion: every element becomes a node.
//!
//! Parent/child nesting becomes structural edges, reference attributes
//! (`ref`, `href`, ...) become edges to the ids they name. Optional cycle
//! prevention checks reachability in the edges added so far, so it depends on
//! document order and does not guarantee a globally acyclic result.

use std::collections::{HashMap, HashSet};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{lenient_bool, lenient_usize, merge_options, string_or_list, DataSource, ParameterSpec, SourceOptions};
use crate::coerce::coerce_strict;
use crate::error::{GraphError, Result};
use crate::graph::{Attributes, Graph};
use crate::ingest::reader::SourceReader;

/// Options of the XML data source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XmlOptions {
    /// Attribute holding an explicit node id
    pub id_field: String,
    /// Attributes whose values name other node ids
    #[serde(deserialize_with = "string_or_list")]
    pub ref_attributes: Vec<String>,
    #[serde(deserialize_with = "lenient_usize")]
    pub max_depth: usize,
    /// Overridden by a `directed` attribute on the root element
    #[serde(deserialize_with = "lenient_bool")]
    pub directed: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub allow_cycles: bool,
}

impl Default for XmlOptions {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            ref_attributes: ["ref", "href", "link", "target"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_depth: 50,
            directed: true,
            allow_cycles: true,
        }
    }
}

/// Data source for arbitrary XML documents
pub struct XmlDataSource {
    defaults: XmlOptions,
    reader: SourceReader,
}

impl XmlDataSource {
    pub fn new(defaults: XmlOptions, reader: SourceReader) -> Self {
        Self { defaults, reader }
    }
}

impl Default for XmlDataSource {
    fn default() -> Self {
        Self::new(XmlOptions::default(), SourceReader::default())
    }
}

impl DataSource for XmlDataSource {
    fn id(&self) -> &'static str {
        "xml_data_source"
    }

    fn name(&self) -> &'static str {
        "XML Data Source"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".xml"]
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::source(),
            ParameterSpec::optional(
                "id_field",
                "string",
                "XML attribute to use as node ID",
                json!(self.defaults.id_field),
            ),
            ParameterSpec::optional(
                "ref_attributes",
                "list",
                "Attributes treated as references to other node IDs",
                json!(self.defaults.ref_attributes),
            ),
            ParameterSpec::optional(
                "directed",
                "boolean",
                "Produce a directed graph",
                json!(self.defaults.directed),
            ),
            ParameterSpec::optional(
                "allow_cycles",
                "boolean",
                "Allow cycles in the produced graph",
                json!(self.defaults.allow_cycles),
            ),
            ParameterSpec::optional(
                "max_depth",
                "integer",
                "Maximum element nesting depth to parse",
                json!(self.defaults.max_depth),
            ),
        ]
    }

    fn reader(&self) -> &SourceReader {
        &self.reader
    }

    fn load_str(&self, content: &str, options: &SourceOptions) -> Result<Graph> {
        let options: XmlOptions = merge_options(&self.defaults, options)?;
        let root = parse_document(content)?;
        Ok(build_graph(&root, &options))
    }
}

/// Parsed element: tag, attributes in document order, text before the first child.
#[derive(Debug, Default)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_document(content: &str) -> Result<Element> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.is_empty() && root.is_some() {
                    return Err(GraphError::malformed("XML", "multiple root elements"));
                }
                stack.push(start_element(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let element = start_element(&e)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| GraphError::malformed("XML", "unexpected closing tag"))?;
                close_element(element, &mut stack, &mut root)?;
            }
            Ok(Event::Text(e)) => {
                let raw = String::from_utf8_lossy(e.as_ref()).to_string();
                let text = quick_xml::escape::unescape(&raw)
                    .map(|t| t.into_owned())
                    .unwrap_or(raw);
                push_text(&mut stack, &text)?;
            }
            Ok(Event::CData(e)) => {
                push_text(&mut stack, &String::from_utf8_lossy(e.as_ref()))?;
            }
            Ok(Event::GeneralRef(e)) => {
                let name = String::from_utf8_lossy(&e).to_string();
                push_text(&mut stack, &resolve_entity(&name))?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(GraphError::malformed("XML", e)),
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(GraphError::malformed(
            "XML",
            format!("unclosed element <{}>", open.tag),
        ));
    }
    root.ok_or_else(|| GraphError::malformed("XML", "no root element"))
}

fn start_element(e: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element {
        tag: String::from_utf8_lossy(e.name().as_ref()).to_string(),
        ..Element::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| GraphError::malformed("XML", err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw = String::from_utf8_lossy(&attr.value).to_string();
        let value = quick_xml::escape::unescape(&raw)
            .map(|v| v.into_owned())
            .unwrap_or(raw);
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(GraphError::malformed("XML", "multiple root elements"))
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> Result<()> {
    match stack.last_mut() {
        // only text before the first child counts as the element's text
        Some(current) if current.children.is_empty() => current.text.push_str(text),
        Some(_) => {}
        None if text.trim().is_empty() => {}
        None => return Err(GraphError::malformed("XML", "text outside the root element")),
    }
    Ok(())
}

fn resolve_entity(name: &str) -> String {
    match name {
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "amp" => "&".to_string(),
        "apos" => "'".to_string(),
        "quot" => "\"".to_string(),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| format!("&{};", name))
        }
    }
}

/// Walk the element tree from `root` and build the graph.
fn build_graph(root: &Element, options: &XmlOptions) -> Graph {
    let directed = match root.attribute("directed") {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => options.directed,
    };

    let mut ctx = ParseContext {
        options,
        directed,
        graph: Graph::new(),
        adjacency: HashMap::new(),
        placeholders: HashSet::new(),
        node_counter: 0,
        link_counter: 0,
    };
    ctx.visit(root, None, 0);
    ctx.graph
}

/// State of one parse. Counters and adjacency never outlive it.
struct ParseContext<'a> {
    options: &'a XmlOptions,
    directed: bool,
    graph: Graph,
    /// Edges added so far, for reachability checks
    adjacency: HashMap<String, HashSet<String>>,
    /// Nodes created by an edge before their element was seen
    placeholders: HashSet<String>,
    node_counter: usize,
    link_counter: usize,
}

impl<'a> ParseContext<'a> {
    fn visit(&mut self, element: &Element, parent_id: Option<&str>, depth: usize) {
        if depth > self.options.max_depth {
            return;
        }

        let node_id = self.node_id(element);
        let mut attributes: Attributes = element
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), coerce_strict(v)))
            .collect();
        let text = element.text.trim();
        if !text.is_empty() {
            attributes
                .entry("text".to_string())
                .or_insert_with(|| coerce_strict(text));
        }
        self.ensure_node(&node_id, attributes);

        if let Some(parent_id) = parent_id {
            self.add_edge(parent_id, &node_id);
        }

        for (key, value) in &element.attributes {
            if !self.options.ref_attributes.contains(key) {
                continue;
            }
            for target in value
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
            {
                self.add_edge(&node_id, target);
            }
        }

        for child in &element.children {
            self.visit(child, Some(&node_id), depth + 1);
        }
    }

    fn node_id(&mut self, element: &Element) -> String {
        match element.attribute(&self.options.id_field) {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => {
                self.node_counter += 1;
                format!("{}_{}", element.tag, self.node_counter)
            }
        }
    }

    /// Add the element's node. A placeholder made earlier by a reference takes
    /// these attributes; an id already defined by another element keeps its first
    /// definition.
    fn ensure_node(&mut self, id: &str, attributes: Attributes) {
        if self.placeholders.remove(id) {
            if let Some(node) = self.graph.node_mut(id) {
                node.attributes = attributes;
            }
            return;
        }
        if !self.graph.add_node(id, attributes) {
            log::debug!("Duplicate element id {}, keeping first definition", id);
        }
        self.adjacency.entry(id.to_string()).or_default();
    }

    fn ensure_endpoint(&mut self, id: &str) {
        if self.graph.add_node(id, Attributes::new()) {
            self.placeholders.insert(id.to_string());
        }
        self.adjacency.entry(id.to_string()).or_default();
    }

    /// Add `src -> dst` (and the mirror when undirected). Returns `false` if the
    /// edge was skipped to avoid closing a cycle.
    fn add_edge(&mut self, src: &str, dst: &str) -> bool {
        self.ensure_endpoint(src);
        self.ensure_endpoint(dst);

        if !self.options.allow_cycles && self.has_path(dst, src) {
            log::debug!("Skipping edge {} -> {}: would close a cycle", src, dst);
            return false;
        }

        self.push_edge(src, dst);
        if !self.directed {
            self.push_edge(dst, src);
        }
        true
    }

    fn push_edge(&mut self, src: &str, dst: &str) {
        self.link_counter += 1;
        let link_id = format!("link_{}_{}_to_{}", self.link_counter, src, dst);
        self.graph.add_link_relaxed(link_id, src, dst);
        self.adjacency
            .entry(src.to_string())
            .or_default()
            .insert(dst.to_string());
    }

    /// Depth-first reachability over the edges added so far.
    fn has_path(&self, start: &str, target: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.adjacency.get(current) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AttributeValue;
    use chrono::NaiveDate;

    fn load(doc: &str) -> Graph {
        XmlDataSource::default()
            .load_str(doc, &SourceOptions::new())
            .unwrap()
    }

    fn load_with(doc: &str, options: serde_json::Value) -> Graph {
        let options = options.as_object().cloned().unwrap();
        XmlDataSource::default().load_str(doc, &options).unwrap()
    }

    fn edges(graph: &Graph) -> Vec<(String, String)> {
        graph
            .links()
            .iter()
            .map(|l| (l.source.clone(), l.target.clone()))
            .collect()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_structural_and_reference_edges() {
        let g = load(r#"<root id="1"><child id="2" ref="1"/></root>"#);
        let ids: Vec<_> = g.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(edges(&g), vec![pair("1", "2"), pair("2", "1")]);
        assert_eq!(g.links()[0].id, "link_1_1_to_2");
        assert_eq!(g.links()[1].id, "link_2_2_to_1");
    }

    #[test]
    fn test_allow_cycles_false_skips_closing_edge() {
        let doc = r#"<root id="1"><child id="2" ref="1"/></root>"#;
        let with_cycles = load(doc);
        let without = load_with(doc, json!({"allow_cycles": false}));
        assert!(without.link_count() < with_cycles.link_count());
        assert_eq!(edges(&without), vec![pair("1", "2")]);
    }

    #[test]
    fn test_cycle_prevention_is_transitive() {
        let doc = r#"<a id="a"><b id="b"><c id="c" ref="a"/></b></a>"#;
        let g = load_with(doc, json!({"allow_cycles": false}));
        assert_eq!(edges(&g), vec![pair("a", "b"), pair("b", "c")]);
    }

    #[test]
    fn test_undirected_mirrors_edges() {
        let g = load(r#"<root id="r" directed="false"><n id="x"/></root>"#);
        assert_eq!(edges(&g), vec![pair("r", "x"), pair("x", "r")]);
        assert_eq!(g.links()[1].id, "link_2_x_to_r");
    }

    #[test]
    fn test_root_directed_attribute_overrides_option() {
        let g = load_with(r#"<root directed="TRUE"><n/></root>"#, json!({"directed": false}));
        assert_eq!(g.link_count(), 1);
    }

    #[test]
    fn test_synthetic_ids_use_parse_scoped_counter() {
        let doc = r#"<library><book/><book id=" "/><shelf><book/></shelf></library>"#;
        let g = load(doc);
        let ids: Vec<_> = g.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["library_1", "book_2", "book_3", "shelf_4", "book_5"]);
        // a second parse starts from scratch
        let again = load(doc);
        assert_eq!(again.nodes()[0].id, "library_1");
    }

    #[test]
    fn test_attributes_are_coerced() {
        let g = load(
            r#"<people><person id="p1" age="42" height="1.85" born="17.05.1980." name="Ann">  Engineer  </person></people>"#,
        );
        let attrs = &g.node("p1").unwrap().attributes;
        assert_eq!(attrs["age"], AttributeValue::Int(42));
        assert_eq!(attrs["height"], AttributeValue::Float(1.85));
        assert_eq!(
            attrs["born"],
            AttributeValue::Date(NaiveDate::from_ymd_opt(1980, 5, 17).unwrap())
        );
        assert_eq!(attrs["name"], AttributeValue::String("Ann".into()));
        assert_eq!(attrs["text"], AttributeValue::String("Engineer".into()));
        assert_eq!(attrs["id"], AttributeValue::String("p1".into()));
    }

    #[test]
    fn test_escaped_content() {
        let g = load(r#"<r id="1" title="a &amp; b">x &lt; y</r>"#);
        let attrs = &g.node("1").unwrap().attributes;
        assert_eq!(attrs["title"], AttributeValue::String("a & b".into()));
        assert_eq!(attrs["text"], AttributeValue::String("x < y".into()));
    }

    #[test]
    fn test_reference_lists_and_placeholders() {
        let g = load(r#"<root id="r"><n id="a" ref="b, c d"/><n id="b" name="Bee"/></root>"#);
        let targets: Vec<_> = g
            .links()
            .iter()
            .filter(|l| l.source == "a")
            .map(|l| l.target.as_str())
            .collect();
        assert_eq!(targets, vec!["b", "c", "d"]);
        // placeholder "b" later receives its element's attributes
        assert_eq!(
            g.node("b").unwrap().attributes["name"],
            AttributeValue::String("Bee".into())
        );
        assert!(g.node("c").unwrap().attributes.is_empty());
    }

    #[test]
    fn test_max_depth_omits_deeper_subtrees() {
        let doc = r#"<a id="a"><b id="b"><c id="c"><d id="d"/></c></b></a>"#;
        let g = load_with(doc, json!({"max_depth": 1}));
        let ids: Vec<_> = g.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_custom_reference_attributes() {
        let g = load_with(
            r#"<r id="r"><x id="x" next="y"/><y id="y" ref="x"/></r>"#,
            json!({"ref_attributes": ["next"]}),
        );
        assert!(edges(&g).contains(&pair("x", "y")));
        assert!(!edges(&g).contains(&pair("y", "x")));
    }

    #[test]
    fn test_malformed_xml() {
        let source = XmlDataSource::default();
        for doc in ["<a><b></a>", "<a>", "", "<a/><b/>"] {
            let err = source.load_str(doc, &SourceOptions::new()).unwrap_err();
            assert!(
                matches!(err, GraphError::MalformedSource { format: "XML", .. }),
                "{:?} should be malformed, got {:?}",
                doc,
                err
            );
        }
    }
}
