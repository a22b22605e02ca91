//! Turtle ingestion.
//!
//! Every distinct subject or resource object becomes a node with the ids
//! `"1"`, `"2"`, ... in creation order. Literal objects become attributes of
//! their subject, resource objects become links carrying the predicate.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{DataSource, ParameterSpec, SourceOptions};
use crate::error::Result;
use crate::graph::{AttributeValue, Attributes, Graph};
use crate::ingest::reader::SourceReader;
use crate::turtle::{self, Term, Triple, RDF_TYPE, XSD_NS};

static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

const XSD_INTEGER_TYPES: &[&str] = &[
    "int",
    "integer",
    "long",
    "short",
    "byte",
    "nonNegativeInteger",
    "nonPositiveInteger",
    "positiveInteger",
    "negativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
];

const XSD_FLOAT_TYPES: &[&str] = &["decimal", "float", "double"];

/// Data source for RDF documents in Turtle syntax
pub struct RdfDataSource {
    reader: SourceReader,
}

impl RdfDataSource {
    pub fn new(reader: SourceReader) -> Self {
        Self { reader }
    }
}

impl Default for RdfDataSource {
    fn default() -> Self {
        Self::new(SourceReader::default())
    }
}

impl DataSource for RdfDataSource {
    fn id(&self) -> &'static str {
        "rdf_data_source"
    }

    fn name(&self) -> &'static str {
        "RDF Data Source"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".ttl"]
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::source()]
    }

    fn reader(&self) -> &SourceReader {
        &self.reader
    }

    fn load_str(&self, content: &str, options: &SourceOptions) -> Result<Graph> {
        for key in options.keys() {
            log::warn!("Ignoring unknown option '{}'", key);
        }
        let triples = turtle::parse(content)?;
        log::debug!("Parsed {} triples", triples.len());
        Ok(build_graph(&triples))
    }
}

/// Two passes: collect `rdf:type` labels, then build nodes, attributes and links.
/// Repeated statements count once.
pub fn build_graph(triples: &[Triple]) -> Graph {
    let mut seen = HashSet::new();
    let triples: Vec<&Triple> = triples.iter().filter(|t| seen.insert(*t)).collect();
    let type_map = collect_type_map(&triples);
    let mut builder = GraphBuilder {
        type_map: &type_map,
        graph: Graph::new(),
        node_ids: HashMap::new(),
        next_link: 1,
    };

    for triple in triples {
        let subject_id = builder.ensure_node(&triple.subject);
        if triple.predicate == RDF_TYPE {
            continue;
        }

        if triple.object.is_literal() {
            let key = sanitize(short_label(&triple.predicate));
            let value = convert_literal(&triple.object);
            if let Some(node) = builder.graph.node_mut(&subject_id) {
                match node.attributes.get_mut(&key) {
                    Some(existing) => existing.push(value),
                    None => {
                        node.attributes.insert(key, value);
                    }
                }
            }
            continue;
        }

        let object_id = builder.ensure_node(&triple.object);
        builder.add_link(triple, &subject_id, &object_id);
    }

    builder.graph
}

/// Subject lexical form to the short label of its `rdf:type`.
fn collect_type_map(triples: &[&Triple]) -> HashMap<String, String> {
    triples
        .iter()
        .filter(|t| t.predicate == RDF_TYPE)
        .filter_map(|t| match &t.object {
            Term::Iri(iri) => Some((t.subject.lexical().to_string(), short_label(iri).to_string())),
            _ => None,
        })
        .collect()
}

struct GraphBuilder<'a> {
    type_map: &'a HashMap<String, String>,
    graph: Graph,
    /// Lexical form to node id
    node_ids: HashMap<String, String>,
    next_link: usize,
}

impl<'a> GraphBuilder<'a> {
    fn ensure_node(&mut self, term: &Term) -> String {
        let lexical = term.lexical();
        if let Some(id) = self.node_ids.get(lexical) {
            return id.clone();
        }

        let id = (self.node_ids.len() + 1).to_string();
        let kind = self
            .type_map
            .get(lexical)
            .cloned()
            .unwrap_or_else(|| term.kind().to_string());
        let mut attributes = Attributes::new();
        attributes.insert("original".to_string(), AttributeValue::from(lexical));
        attributes.insert("type".to_string(), AttributeValue::String(kind));

        self.graph.add_node(id.clone(), attributes);
        self.node_ids.insert(lexical.to_string(), id.clone());
        id
    }

    fn add_link(&mut self, triple: &Triple, source: &str, target: &str) {
        let mut attributes = Attributes::new();
        attributes.insert(
            "predicate".to_string(),
            AttributeValue::from(short_label(&triple.predicate)),
        );
        attributes.insert(
            "predicate_uri".to_string(),
            AttributeValue::from(triple.predicate.as_str()),
        );
        attributes.insert(
            "triple".to_string(),
            AttributeValue::List(vec![
                AttributeValue::from(triple.subject.lexical()),
                AttributeValue::from(triple.predicate.as_str()),
                AttributeValue::from(triple.object.lexical()),
            ]),
        );

        let id = self.next_link.to_string();
        self.next_link += 1;
        self.graph
            .add_link_with_attributes(id, source, target, attributes);
    }
}

/// Local name of an IRI: the part after the last `#`, then after the last `/`.
/// Falls back to the whole IRI when that is empty.
pub fn short_label(uri: &str) -> &str {
    let after_hash = uri.rsplit('#').next().unwrap_or(uri);
    let local = after_hash.rsplit('/').next().unwrap_or(after_hash);
    if local.is_empty() {
        uri
    } else {
        local
    }
}

/// Turn a label into an identifier-safe attribute key.
pub fn sanitize(label: &str) -> String {
    let out = NON_WORD_RE.replace_all(label, "_").into_owned();
    if out.is_empty() {
        return "node".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        format!("n{}", out)
    } else {
        out
    }
}

/// Typed value of a literal per its XSD datatype. Unknown datatypes and failed
/// conversions keep the lexical text.
fn convert_literal(term: &Term) -> AttributeValue {
    let Term::Literal {
        value,
        datatype: Some(datatype),
        ..
    } = term
    else {
        return AttributeValue::from(term.lexical());
    };
    let Some(local) = datatype.strip_prefix(XSD_NS) else {
        return AttributeValue::from(value.as_str());
    };

    let raw = value.trim();
    let converted = if XSD_INTEGER_TYPES.contains(&local) {
        raw.trim_start_matches('+').parse::<i64>().ok().map(AttributeValue::Int)
    } else if XSD_FLOAT_TYPES.contains(&local) {
        parse_xsd_float(raw).map(AttributeValue::Float)
    } else if local == "date" {
        parse_xsd_date(raw).map(AttributeValue::Date)
    } else if local == "dateTime" {
        parse_xsd_datetime(raw)
    } else {
        return AttributeValue::from(value.as_str());
    };

    converted.unwrap_or_else(|| {
        log::warn!("Could not convert literal '{}' as xsd:{}", value, local);
        AttributeValue::from(value.as_str())
    })
}

/// Finite values only. `INF` and `NaN` stay as their lexical form.
fn parse_xsd_float(raw: &str) -> Option<f64> {
    raw.parse().ok().filter(|f: &f64| f.is_finite())
}

fn parse_xsd_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        // a trailing timezone (`Z`, `+02:00`) is dropped
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

fn parse_xsd_datetime(raw: &str) -> Option<AttributeValue> {
    if let Ok(zoned) = DateTime::parse_from_rfc3339(raw) {
        return Some(AttributeValue::ZonedDateTime(zoned));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(AttributeValue::DateTime)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix foaf: <http://xmlns.com/foaf/0.1/> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

        ex:alice a foaf:Person ;
            foaf:name "Alice" ;
            foaf:age "30"^^xsd:int ;
            foaf:knows ex:bob .
        ex:bob foaf:name "Bob" ;
            ex:nick "bobby", "rob" ;
            ex:born "1990-02-01"^^xsd:date ;
            foaf:knows [ foaf:name "Anon" ] .
    "#;

    fn load(doc: &str) -> Graph {
        RdfDataSource::default()
            .load_str(doc, &SourceOptions::new())
            .unwrap()
    }

    fn attr<'g>(graph: &'g Graph, id: &str, key: &str) -> &'g AttributeValue {
        &graph.node(id).unwrap().attributes[key]
    }

    #[test]
    fn test_nodes_numbered_in_creation_order() {
        let g = load(PEOPLE);
        let originals: Vec<_> = g
            .nodes()
            .iter()
            .map(|n| n.attributes["original"].to_string())
            .collect();
        assert_eq!(
            originals,
            vec!["http://example.org/alice", "http://example.org/bob", "genid-1"]
        );
        assert_eq!(g.nodes()[0].id, "1");
        assert_eq!(g.nodes()[2].id, "3");
    }

    #[test]
    fn test_type_labels_and_kinds() {
        let g = load(PEOPLE);
        assert_eq!(attr(&g, "1", "type"), &AttributeValue::from("Person"));
        assert_eq!(attr(&g, "2", "type"), &AttributeValue::from("uri"));
        assert_eq!(attr(&g, "3", "type"), &AttributeValue::from("bnode"));
    }

    #[test]
    fn test_literals_become_typed_attributes() {
        let g = load(PEOPLE);
        assert_eq!(attr(&g, "1", "name"), &AttributeValue::from("Alice"));
        assert_eq!(attr(&g, "1", "age"), &AttributeValue::Int(30));
        assert_eq!(
            attr(&g, "2", "born"),
            &AttributeValue::Date(NaiveDate::from_ymd_opt(1990, 2, 1).unwrap())
        );
    }

    #[test]
    fn test_repeated_predicate_promotes_to_list() {
        let g = load(PEOPLE);
        assert_eq!(
            attr(&g, "2", "nick"),
            &AttributeValue::List(vec!["bobby".into(), "rob".into()])
        );
    }

    #[test]
    fn test_repeated_statements_count_once() {
        let g = load(
            r#"@prefix ex: <http://example.org/> .
               ex:a ex:name "x" .
               ex:a ex:name "x" .
               ex:a ex:knows ex:b .
               ex:a ex:knows ex:b ;
                    ex:name "y" ."#,
        );
        assert_eq!(g.node_count(), 2);
        assert_eq!(
            attr(&g, "1", "name"),
            &AttributeValue::List(vec!["x".into(), "y".into()])
        );
        assert_eq!(g.link_count(), 1);
    }

    #[test]
    fn test_resource_objects_become_links() {
        let g = load(PEOPLE);
        assert_eq!(g.link_count(), 2);
        let link = &g.links()[0];
        assert_eq!((link.id.as_str(), link.source.as_str(), link.target.as_str()), ("1", "1", "2"));
        let attrs = link.attributes.as_ref().unwrap();
        assert_eq!(attrs["predicate"], AttributeValue::from("knows"));
        assert_eq!(
            attrs["predicate_uri"],
            AttributeValue::from("http://xmlns.com/foaf/0.1/knows")
        );
        assert_eq!(
            attrs["triple"],
            AttributeValue::List(vec![
                "http://example.org/alice".into(),
                "http://xmlns.com/foaf/0.1/knows".into(),
                "http://example.org/bob".into(),
            ])
        );
        assert_eq!(g.links()[1].id, "2");
    }

    #[test]
    fn test_literal_conversion_fallbacks() {
        let g = load(
            r#"@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
               <http://x/s> <http://x/a> "abc"^^xsd:integer ;
                   <http://x/b> "2.5"^^xsd:double ;
                   <http://x/c> "2021-03-04T05:06:07Z"^^xsd:dateTime ;
                   <http://x/d> "2021-03-04T05:06:07"^^xsd:dateTime ;
                   <http://x/e> "hi"@en ;
                   <http://x/f> true ;
                   <http://x/g> 42 ."#,
        );
        assert_eq!(attr(&g, "1", "a"), &AttributeValue::from("abc"));
        assert_eq!(attr(&g, "1", "b"), &AttributeValue::Float(2.5));
        assert!(matches!(attr(&g, "1", "c"), AttributeValue::ZonedDateTime(_)));
        assert!(matches!(attr(&g, "1", "d"), AttributeValue::DateTime(_)));
        assert_eq!(attr(&g, "1", "e"), &AttributeValue::from("hi"));
        assert_eq!(attr(&g, "1", "f"), &AttributeValue::from("true"));
        assert_eq!(attr(&g, "1", "g"), &AttributeValue::Int(42));
    }

    #[test]
    fn test_non_finite_floats_keep_lexical_form() {
        let g = load(
            r#"@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
               <http://x/s> <http://x/a> "NaN"^^xsd:double ;
                   <http://x/b> "INF"^^xsd:float ;
                   <http://x/c> "-INF"^^xsd:double ."#,
        );
        assert_eq!(attr(&g, "1", "a"), &AttributeValue::from("NaN"));
        assert_eq!(attr(&g, "1", "b"), &AttributeValue::from("INF"));
        assert_eq!(attr(&g, "1", "c"), &AttributeValue::from("-INF"));
        assert_eq!(Graph::from_dict(&g.to_dict()).unwrap(), g);
    }

    #[test]
    fn test_short_label() {
        assert_eq!(short_label("http://xmlns.com/foaf/0.1/name"), "name");
        assert_eq!(short_label("http://www.w3.org/2001/XMLSchema#int"), "int");
        assert_eq!(short_label("http://example.org/"), "http://example.org/");
        assert_eq!(short_label("plain"), "plain");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("has-part"), "has_part");
        assert_eq!(sanitize("1st"), "n1st");
        assert_eq!(sanitize(""), "node");
        assert_eq!(sanitize("a b  c"), "a_b_c");
    }

    #[test]
    fn test_syntax_error_propagates() {
        let err = RdfDataSource::default()
            .load_str("<http://x/s> <http://x/p> .", &SourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, crate::error::GraphError::Turtle(_)));
    }
}
