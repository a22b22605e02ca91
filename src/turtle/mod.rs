//! Minimal Turtle reader.
//!
//! Tokenizes a Turtle document and parses it into a flat list of [`Triple`]s in
//! document order. Covers the syntax found in ordinary data dumps: prefix and
//! base directives, prefixed names, `a`, predicate/object lists, blank nodes,
//! collections, typed and language-tagged literals, numeric/boolean shorthands.
//!
//! ```
//! use graph_explorer::turtle::{parse, Term};
//!
//! let triples = parse(r#"
//!     @prefix ex: <http://example.org/> .
//!     ex:alice ex:name "Alice" ; ex:age 30 .
//! "#).unwrap();
//! assert_eq!(triples.len(), 2);
//! assert_eq!(triples[0].subject, Term::Iri("http://example.org/alice".into()));
//! ```

mod lexer;
mod parser;

pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal {
        value: String,
        /// `None` for plain strings.
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    /// Lexical form: the IRI, the blank node label or the literal's text.
    pub fn lexical(&self) -> &str {
        match self {
            Term::Iri(iri) => iri,
            Term::BlankNode(label) => label,
            Term::Literal { value, .. } => value,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }

    /// Structural kind label: `uri`, `bnode` or `literal`.
    pub fn kind(&self) -> &'static str {
        match self {
            Term::Iri(_) => "uri",
            Term::BlankNode(_) => "bnode",
            Term::Literal { .. } => "literal",
        }
    }

    pub(crate) fn literal(value: impl Into<String>, datatype: &str) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.to_string()),
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

/// Error type for Turtle parsing
#[derive(Debug, thiserror::Error)]
pub enum TurtleError {
    /// Invalid token
    #[error("line {line}, column {column}: {message}")]
    Lexer {
        line: usize,
        column: usize,
        message: String,
    },

    /// Unexpected token or invalid structure
    #[error("line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// Prefix used before being declared
    #[error("undefined prefix '{0}:'")]
    UndefinedPrefix(String),
}

/// 1-based line and column of a byte offset.
pub(crate) fn line_col(input: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in input.char_indices() {
        if i >= position {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}
