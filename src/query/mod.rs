//! Search and filter over a [`Graph`].
//!
//! Both operations leave their input alone. When nothing would change they hand
//! back the input itself (`Cow::Borrowed`); otherwise they build a new graph
//! holding the matching nodes and every link of the input.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GraphError, Result};
use crate::graph::{AttributeValue, Graph, Node, Number};

static FILTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\w+)\s*(==|!=|<=|>=|<|>)\s*(.+?)\s*$").unwrap());

const SEARCH_PREFIX: &str = "search:";

/// Keep nodes whose id, attribute keys or attribute values contain `text`,
/// ignoring case. Blank text returns the input unchanged.
pub fn search<'g>(graph: &'g Graph, text: &str) -> Cow<'g, Graph> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return Cow::Borrowed(graph);
    }
    Cow::Owned(select(graph, |node| node_matches(node, &needle)))
}

fn node_matches(node: &Node, needle: &str) -> bool {
    node.id.to_lowercase().contains(needle)
        || node.attributes.iter().any(|(key, value)| {
            key.to_lowercase().contains(needle) || value.to_string().to_lowercase().contains(needle)
        })
}

/// Keep nodes whose `attribute` satisfies `operator value`.
///
/// An unknown operator or an empty attribute/value returns the input unchanged.
/// Numeric attributes (booleans count as 0/1) compare numerically and fail with
/// [`GraphError::TypeMismatch`] when `value` is not a number; all other values
/// compare as case-folded trimmed strings.
pub fn filter<'g>(
    graph: &'g Graph,
    attribute: &str,
    operator: &str,
    value: &str,
) -> Result<Cow<'g, Graph>> {
    let attribute = attribute.trim();
    let value = value.trim();
    let Ok(op) = operator.parse::<FilterOp>() else {
        log::debug!("Ignoring filter with unknown operator '{}'", operator);
        return Ok(Cow::Borrowed(graph));
    };
    if attribute.is_empty() || value.is_empty() {
        return Ok(Cow::Borrowed(graph));
    }

    let number = Number::parse(value);
    let folded = value.to_lowercase();
    let mut matched = Graph::new();
    for node in graph.nodes() {
        let Some(stored) = node.attributes.get(attribute) else {
            continue;
        };
        if compare(stored, op, number, &folded).ok_or_else(|| GraphError::TypeMismatch {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })? {
            matched.add_node(node.id.clone(), node.attributes.clone());
        }
    }
    copy_links(graph, &mut matched);
    Ok(Cow::Owned(matched))
}

/// `None` when a numeric attribute meets a non-numeric operand.
fn compare(stored: &AttributeValue, op: FilterOp, number: Option<Number>, folded: &str) -> Option<bool> {
    match stored.as_number() {
        Some(n) => Some(op.holds(n.partial_cmp(&number?))),
        None => {
            let text = stored.to_string().trim().to_lowercase();
            Some(op.holds(Some(text.as_str().cmp(folded))))
        }
    }
}

fn select(graph: &Graph, keep: impl Fn(&Node) -> bool) -> Graph {
    let mut out = Graph::new();
    for node in graph.nodes().iter().filter(|n| keep(n)) {
        out.add_node(node.id.clone(), node.attributes.clone());
    }
    copy_links(graph, &mut out);
    out
}

fn copy_links(from: &Graph, to: &mut Graph) {
    for link in from.links() {
        to.push_link(link.clone());
    }
}

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
        }
    }

    /// Whether an ordering satisfies the operator. Unordered values (NaN) only
    /// satisfy `!=`.
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (FilterOp::Ne, ord) => ord != Some(Ordering::Equal),
            (_, None) => false,
            (FilterOp::Eq, Some(ord)) => ord == Ordering::Equal,
            (FilterOp::Lt, Some(ord)) => ord == Ordering::Less,
            (FilterOp::Le, Some(ord)) => ord != Ordering::Greater,
            (FilterOp::Gt, Some(ord)) => ord == Ordering::Greater,
            (FilterOp::Ge, Some(ord)) => ord != Ordering::Less,
        }
    }
}

impl FromStr for FilterOp {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "==" => Ok(FilterOp::Eq),
            "!=" => Ok(FilterOp::Ne),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::Le),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::Ge),
            other => Err(GraphError::InvalidInput(format!("unknown operator '{}'", other))),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a workspace's query chain.
///
/// Serialized as its expression text, e.g. `age >= 30` or `search: alice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Search(String),
    Filter {
        attribute: String,
        op: FilterOp,
        value: String,
    },
}

impl Query {
    /// `attr OP value` is a filter, anything else a search for the whole text.
    pub fn parse(expression: &str) -> Self {
        let expression = expression.trim();
        if let Some(text) = expression.strip_prefix(SEARCH_PREFIX) {
            return Query::Search(text.trim().to_string());
        }
        if let Some(caps) = FILTER_RE.captures(expression) {
            if let Ok(op) = caps[2].parse() {
                return Query::Filter {
                    attribute: caps[1].to_string(),
                    op,
                    value: caps[3].to_string(),
                };
            }
        }
        Query::Search(expression.to_string())
    }

    pub fn search(text: impl Into<String>) -> Self {
        Query::Search(text.into())
    }

    pub fn filter(attribute: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        Query::Filter {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn apply<'g>(&self, graph: &'g Graph) -> Result<Cow<'g, Graph>> {
        match self {
            Query::Search(text) => Ok(search(graph, text)),
            Query::Filter {
                attribute,
                op,
                value,
            } => filter(graph, attribute, op.as_str(), value),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Search(text) => write!(f, "{} {}", SEARCH_PREFIX, text),
            Query::Filter {
                attribute,
                op,
                value,
            } => write!(f, "{} {} {}", attribute, op, value),
        }
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let expression = String::deserialize(deserializer)?;
        Ok(Query::parse(&expression))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Attributes, Link};
    use proptest::prelude::*;

    fn people(ages: &[(&str, AttributeValue)]) -> Graph {
        let mut g = Graph::new();
        for (id, age) in ages {
            let mut attrs = Attributes::new();
            attrs.insert("age".into(), age.clone());
            attrs.insert("name".into(), AttributeValue::from(format!("Person {}", id)));
            g.add_node(*id, attrs);
        }
        g.add_node("nobody", Attributes::new());
        g.push_link(Link::new("l1", "a", "nobody"));
        g
    }

    fn ids(g: &Graph) -> Vec<&str> {
        g.nodes().iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_search_blank_returns_input() {
        let g = people(&[("a", AttributeValue::Int(1))]);
        assert!(matches!(search(&g, ""), Cow::Borrowed(_)));
        assert!(matches!(search(&g, "   "), Cow::Borrowed(_)));
    }

    #[test]
    fn test_search_matches_id_key_and_value() {
        let mut g = Graph::new();
        let mut attrs = Attributes::new();
        attrs.insert("Color".into(), AttributeValue::from("Red"));
        g.add_node("x1", attrs);
        let mut attrs = Attributes::new();
        attrs.insert("size".into(), AttributeValue::Int(42));
        g.add_node("y2", attrs);
        g.add_node("Z3", Attributes::new());
        g.push_link(Link::new("l", "x1", "y2"));

        assert_eq!(ids(&search(&g, " RED ")), vec!["x1"]);
        assert_eq!(ids(&search(&g, "color")), vec!["x1"]);
        assert_eq!(ids(&search(&g, "42")), vec!["y2"]);
        assert_eq!(ids(&search(&g, "z3")), vec!["Z3"]);
        // links are copied regardless of surviving endpoints
        assert_eq!(search(&g, "z3").link_count(), 1);
    }

    #[test]
    fn test_filter_numeric_ages() {
        let g = people(&[
            ("a", AttributeValue::Int(25)),
            ("b", AttributeValue::Int(100)),
            ("c", AttributeValue::Float(29.5)),
        ]);
        let out = filter(&g, "age", "<", "30").unwrap();
        assert_eq!(ids(&out), vec!["a", "c"]);
        assert_eq!(out.link_count(), 1);
    }

    #[test]
    fn test_filter_string_ages_compare_lexicographically() {
        let g = people(&[
            ("a", AttributeValue::from("25")),
            ("b", AttributeValue::from("100")),
            ("c", AttributeValue::from("4")),
        ]);
        // "100" < "30" < "4" as strings
        assert_eq!(ids(&filter(&g, "age", "<", "30").unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_filter_string_equality_is_case_insensitive() {
        let mut g = Graph::new();
        let mut attrs = Attributes::new();
        attrs.insert("city".into(), AttributeValue::from(" Paris "));
        g.add_node("p", attrs);
        assert_eq!(ids(&filter(&g, "city", "==", "paris").unwrap()), vec!["p"]);
        assert!(filter(&g, "city", "!=", "PARIS").unwrap().is_empty());
    }

    #[test]
    fn test_filter_booleans_are_numeric() {
        let mut g = Graph::new();
        for (id, flag) in [("t", true), ("f", false)] {
            let mut attrs = Attributes::new();
            attrs.insert("active".into(), AttributeValue::Bool(flag));
            g.add_node(id, attrs);
        }
        assert_eq!(ids(&filter(&g, "active", "==", "1").unwrap()), vec!["t"]);
    }

    #[test]
    fn test_filter_type_mismatch_is_an_error() {
        let g = people(&[("a", AttributeValue::Int(25))]);
        let err = filter(&g, "age", ">", "old").unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
        assert_eq!(err.to_string(), "Cannot compare numeric attribute 'age' with 'old'");
    }

    #[test]
    fn test_filter_misuse_returns_input() {
        let g = people(&[("a", AttributeValue::Int(25))]);
        assert!(matches!(filter(&g, "age", "=~", "25").unwrap(), Cow::Borrowed(_)));
        assert!(matches!(filter(&g, "", "==", "25").unwrap(), Cow::Borrowed(_)));
        assert!(matches!(filter(&g, "age", "==", " ").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_filter_dates_compare_as_iso_strings() {
        let g = Graph::from_dict(&serde_json::json!({
            "nodes": [
                {"id": "old", "attributes": {"born": "1950-01-01"}},
                {"id": "new", "attributes": {"born": "2001-06-30"}}
            ]
        }))
        .unwrap();
        assert_eq!(ids(&filter(&g, "born", ">=", "2000-01-01").unwrap()), vec!["new"]);
    }

    #[test]
    fn test_query_parse() {
        assert_eq!(
            Query::parse("age >= 30"),
            Query::filter("age", FilterOp::Ge, "30")
        );
        assert_eq!(
            Query::parse("name==John Smith"),
            Query::filter("name", FilterOp::Eq, "John Smith")
        );
        assert_eq!(Query::parse("  alice "), Query::search("alice"));
        assert_eq!(Query::parse("a-b < 3"), Query::search("a-b < 3"));
        assert_eq!(Query::parse("search: x == 1"), Query::search("x == 1"));
    }

    #[test]
    fn test_query_display_parses_back() {
        for q in [Query::search("bob"), Query::filter("age", FilterOp::Lt, "4")] {
            assert_eq!(Query::parse(&q.to_string()), q);
        }
        assert_eq!(Query::search("bob").to_string(), "search: bob");
        assert_eq!(serde_json::to_string(&Query::filter("x", FilterOp::Ne, "1")).unwrap(), "\"x != 1\"");
    }

    #[test]
    fn test_query_apply() {
        let g = people(&[("a", AttributeValue::Int(25)), ("b", AttributeValue::Int(35))]);
        let out = Query::parse("age > 30").apply(&g).unwrap();
        assert_eq!(ids(&out), vec!["b"]);
    }

    fn attr_graph() -> impl Strategy<Value = Graph> {
        let value = prop_oneof![
            any::<i32>().prop_map(|i| AttributeValue::Int(i as i64)),
            "[a-z0-9]{0,6}".prop_map(AttributeValue::String),
        ];
        prop::collection::vec(("[a-z]{1,4}", prop::option::of(value)), 0..10).prop_map(|nodes| {
            let mut g = Graph::new();
            for (id, v) in nodes {
                let mut attrs = Attributes::new();
                if let Some(v) = v {
                    attrs.insert("k".into(), v);
                }
                g.add_node(id, attrs);
            }
            g
        })
    }

    proptest! {
        #[test]
        fn prop_blank_search_is_identity(g in attr_graph()) {
            let out = search(&g, "");
            prop_assert_eq!(out.as_ref(), &g);
        }

        #[test]
        fn prop_filter_never_keeps_nodes_lacking_attribute(
            g in attr_graph(),
            op in prop::sample::select(vec!["==", "!=", "<", "<=", ">", ">="]),
            value in "[0-9]{1,3}",
        ) {
            let out = filter(&g, "k", op, &value).unwrap();
            for node in out.nodes() {
                prop_assert!(node.attributes.contains_key("k"));
            }
        }
    }
}
