//! Recursive-descent Turtle parser producing triples in document order.

use std::collections::HashMap;

use url::Url;

use super::lexer::{tokenize, Token, TokenKind};
use super::{line_col, Term, Triple, TurtleError, RDF_FIRST, RDF_LANG_STRING, RDF_NIL, RDF_REST, RDF_TYPE, XSD_NS};

/// Parse a Turtle document into triples.
pub fn parse(input: &str) -> Result<Vec<Triple>, TurtleError> {
    Parser::new(input)?.parse()
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    prefixes: HashMap<String, String>,
    base: Option<Url>,
    next_blank: usize,
    triples: Vec<Triple>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, TurtleError> {
        Ok(Self {
            input,
            tokens: tokenize(input)?,
            pos: 0,
            prefixes: HashMap::new(),
            base: None,
            next_blank: 0,
            triples: Vec::new(),
        })
    }

    fn parse(mut self) -> Result<Vec<Triple>, TurtleError> {
        while !self.is_at_end() {
            self.parse_statement()?;
        }
        Ok(self.triples)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> TurtleError {
        let (line, column) = line_col(self.input, self.current().start);
        TurtleError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), TurtleError> {
        if self.current().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", kind, self.current().kind)))
        }
    }

    fn parse_statement(&mut self) -> Result<(), TurtleError> {
        match self.current().kind {
            TokenKind::KwPrefix => {
                self.advance();
                self.parse_prefix()?;
                self.expect(TokenKind::Dot)
            }
            TokenKind::KwSparqlPrefix => {
                self.advance();
                self.parse_prefix()
            }
            TokenKind::KwBase => {
                self.advance();
                self.parse_base()?;
                self.expect(TokenKind::Dot)
            }
            TokenKind::KwSparqlBase => {
                self.advance();
                self.parse_base()
            }
            _ => self.parse_triples(),
        }
    }

    fn parse_prefix(&mut self) -> Result<(), TurtleError> {
        let prefix = match &self.current().kind {
            TokenKind::PrefixedName { prefix, local } if local.is_empty() => prefix.clone(),
            _ => return Err(self.error("expected prefix name")),
        };
        self.advance();
        let namespace = match &self.current().kind {
            TokenKind::Iri(iri) => self.resolve_iri(iri),
            _ => return Err(self.error("expected IRI for prefix namespace")),
        };
        self.advance();
        self.prefixes.insert(prefix, namespace);
        Ok(())
    }

    fn parse_base(&mut self) -> Result<(), TurtleError> {
        let base = match &self.current().kind {
            TokenKind::Iri(iri) => self.resolve_iri(iri),
            _ => return Err(self.error("expected IRI for base")),
        };
        let base = Url::parse(&base)
            .map_err(|e| self.error(format!("invalid base IRI <{}>: {}", base, e)))?;
        self.advance();
        self.base = Some(base);
        Ok(())
    }

    fn parse_triples(&mut self) -> Result<(), TurtleError> {
        if self.current().kind == TokenKind::LBracket {
            // `[ p o ] .` and `[ p o ] q r .` are both valid statements
            let subject = self.parse_blank_node_property_list()?;
            if self.current().kind != TokenKind::Dot {
                self.parse_predicate_object_list(&subject)?;
            }
        } else {
            let subject = self.parse_subject()?;
            self.parse_predicate_object_list(&subject)?;
        }
        self.expect(TokenKind::Dot)
    }

    fn parse_subject(&mut self) -> Result<Term, TurtleError> {
        match self.current().kind {
            TokenKind::Iri(_) | TokenKind::PrefixedName { .. } => Ok(Term::Iri(self.parse_iri()?)),
            TokenKind::BlankNodeLabel(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::BlankNodeLabel(label) => Ok(Term::BlankNode(label)),
                    _ => unreachable!("checked above"),
                }
            }
            TokenKind::LParen => self.parse_collection(),
            _ => Err(self.error(format!("expected subject, found {:?}", self.current().kind))),
        }
    }

    fn parse_iri(&mut self) -> Result<String, TurtleError> {
        let iri = match &self.current().kind {
            TokenKind::Iri(iri) => self.resolve_iri(iri),
            TokenKind::PrefixedName { prefix, local } => {
                let namespace = self
                    .prefixes
                    .get(prefix)
                    .ok_or_else(|| TurtleError::UndefinedPrefix(prefix.clone()))?;
                format!("{}{}", namespace, local)
            }
            _ => return Err(self.error(format!("expected IRI, found {:?}", self.current().kind))),
        };
        self.advance();
        Ok(iri)
    }

    fn parse_predicate_object_list(&mut self, subject: &Term) -> Result<(), TurtleError> {
        loop {
            let predicate = if self.current().kind == TokenKind::KwA {
                self.advance();
                RDF_TYPE.to_string()
            } else {
                self.parse_iri()?
            };

            loop {
                let object = self.parse_object()?;
                self.emit(subject.clone(), &predicate, object);
                if self.current().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.current().kind != TokenKind::Semicolon {
                break;
            }
            while self.current().kind == TokenKind::Semicolon {
                self.advance();
            }
            if matches!(
                self.current().kind,
                TokenKind::Dot | TokenKind::RBracket | TokenKind::Eof
            ) {
                break;
            }
        }
        Ok(())
    }

    fn parse_object(&mut self) -> Result<Term, TurtleError> {
        match self.current().kind {
            TokenKind::Iri(_) | TokenKind::PrefixedName { .. } => Ok(Term::Iri(self.parse_iri()?)),
            TokenKind::BlankNodeLabel(_) | TokenKind::LParen => self.parse_subject(),
            TokenKind::LBracket => self.parse_blank_node_property_list(),
            TokenKind::String(_) => self.parse_string_literal(),
            TokenKind::Integer(_) | TokenKind::Decimal(_) | TokenKind::Double(_) => {
                let token = self.advance();
                Ok(match token.kind {
                    TokenKind::Integer(v) => Term::literal(v, &xsd("integer")),
                    TokenKind::Decimal(v) => Term::literal(v, &xsd("decimal")),
                    TokenKind::Double(v) => Term::literal(v, &xsd("double")),
                    _ => unreachable!("checked above"),
                })
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Term::literal("true", &xsd("boolean")))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Term::literal("false", &xsd("boolean")))
            }
            _ => Err(self.error(format!("expected object, found {:?}", self.current().kind))),
        }
    }

    fn parse_string_literal(&mut self) -> Result<Term, TurtleError> {
        let value = match self.advance().kind {
            TokenKind::String(value) => value,
            _ => return Err(self.error("expected string literal")),
        };
        match self.current().kind.clone() {
            TokenKind::LangTag(lang) => {
                self.advance();
                Ok(Term::Literal {
                    value,
                    datatype: Some(RDF_LANG_STRING.to_string()),
                    language: Some(lang),
                })
            }
            TokenKind::DoubleCaret => {
                self.advance();
                let datatype = self.parse_iri()?;
                Ok(Term::Literal {
                    value,
                    datatype: Some(datatype),
                    language: None,
                })
            }
            _ => Ok(Term::Literal {
                value,
                datatype: None,
                language: None,
            }),
        }
    }

    /// `[ p o ; ... ]`, or `[]` for a bare anonymous node.
    fn parse_blank_node_property_list(&mut self) -> Result<Term, TurtleError> {
        self.expect(TokenKind::LBracket)?;
        let node = self.fresh_blank();
        if self.current().kind != TokenKind::RBracket {
            self.parse_predicate_object_list(&node)?;
        }
        self.expect(TokenKind::RBracket)?;
        Ok(node)
    }

    /// `( a b c )` expands to an `rdf:first`/`rdf:rest` chain.
    fn parse_collection(&mut self) -> Result<Term, TurtleError> {
        self.expect(TokenKind::LParen)?;
        if self.current().kind == TokenKind::RParen {
            self.advance();
            return Ok(Term::Iri(RDF_NIL.to_string()));
        }

        let head = self.fresh_blank();
        let mut current = head.clone();
        loop {
            let item = self.parse_object()?;
            self.emit(current.clone(), RDF_FIRST, item);
            if self.current().kind == TokenKind::RParen {
                self.emit(current, RDF_REST, Term::Iri(RDF_NIL.to_string()));
                break;
            }
            let next = self.fresh_blank();
            self.emit(current, RDF_REST, next.clone());
            current = next;
        }
        self.expect(TokenKind::RParen)?;
        Ok(head)
    }

    fn fresh_blank(&mut self) -> Term {
        self.next_blank += 1;
        Term::BlankNode(format!("genid-{}", self.next_blank))
    }

    fn emit(&mut self, subject: Term, predicate: &str, object: Term) {
        self.triples.push(Triple {
            subject,
            predicate: predicate.to_string(),
            object,
        });
    }

    /// Resolve a relative reference against the base. References with a scheme,
    /// or without a base in scope, are kept as written.
    fn resolve_iri(&self, reference: &str) -> String {
        if Url::parse(reference).is_ok() {
            return reference.to_string();
        }
        let Some(base) = &self.base else {
            return reference.to_string();
        };
        match base.join(reference) {
            Ok(resolved) => String::from(resolved),
            Err(e) => {
                log::warn!("Cannot resolve <{}> against <{}>: {}", reference, base, e);
                reference.to_string()
            }
        }
    }
}

fn xsd(local: &str) -> String {
    format!("{}{}", XSD_NS, local)
}
