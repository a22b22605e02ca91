//! Turtle tokenizer built from winnow combinators.

use winnow::ascii::digit1;
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::error::{ContextError, ErrMode};
use winnow::stream::{AsChar, Location};
use winnow::token::{any, one_of, take_till, take_while};
use winnow::{LocatingSlice, ModalResult, Parser};

use super::{line_col, TurtleError};

/// Input type for the lexer; tracks byte offsets for error positions.
type Input<'a> = LocatingSlice<&'a str>;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token start.
    pub start: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `<...>` with the brackets stripped
    Iri(String),
    /// `prefix:local`; `local` may be empty
    PrefixedName { prefix: String, local: String },
    /// `_:label`
    BlankNodeLabel(String),
    /// Unescaped string content
    String(String),
    Integer(String),
    Decimal(String),
    Double(String),
    /// Without the leading `@`
    LangTag(String),
    KwPrefix,
    KwBase,
    KwSparqlPrefix,
    KwSparqlBase,
    KwA,
    KwTrue,
    KwFalse,
    Dot,
    Comma,
    Semicolon,
    DoubleCaret,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eof,
}

/// Characters a local name may carry after a backslash.
const LOCAL_ESCAPES: &str = "_~.-!$&'()*+,;=/?#@%";

/// Tokenize a whole document. Fails on the first invalid token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, TurtleError> {
    let mut input = LocatingSlice::new(source);
    let mut tokens = Vec::new();

    loop {
        skip_ws_and_comments(&mut input);
        let start = input.current_token_start();
        if rest(&input).is_empty() {
            tokens.push(Token { kind: TokenKind::Eof, start });
            break;
        }
        match next_token(&mut input) {
            Ok(kind) => tokens.push(Token { kind, start }),
            Err(_) => return Err(lex_error(source, start)),
        }
    }

    Ok(tokens)
}

fn lex_error(source: &str, position: usize) -> TurtleError {
    let (line, column) = line_col(source, position);
    let message = match source[position..].chars().next() {
        Some('"') | Some('\'') => "unterminated string literal".to_string(),
        Some('<') => "invalid or unterminated IRI".to_string(),
        Some(c) => format!("unexpected character '{}'", c),
        None => "unexpected end of input".to_string(),
    };
    TurtleError::Lexer {
        line,
        column,
        message,
    }
}

/// Unconsumed part of the input.
fn rest<'a>(input: &Input<'a>) -> &'a str {
    **input
}

fn backtrack<T>() -> ModalResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn is_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_pn_chars_base(c: char) -> bool {
    c.is_alphabetic()
}

fn is_pn_chars(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '\u{00B7}')
}

fn is_iri_char(c: char) -> bool {
    !matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | '\x00'..='\x20')
}

fn skip_ws_and_comments(input: &mut Input<'_>) {
    loop {
        let _: ModalResult<&str> = take_while(0.., is_ws).parse_next(input);
        if !rest(input).starts_with('#') {
            break;
        }
        let _: ModalResult<&str> = take_till(0.., |c: char| c == '\n' || c == '\r').parse_next(input);
    }
}

fn next_token(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((
        "^^".value(TokenKind::DoubleCaret),
        iri_ref,
        // before prefixed names: `_` never starts a prefix
        blank_node_label,
        at_keyword,
        default_prefix,
        name_or_keyword,
        string_literal,
        number,
        punctuation,
    ))
    .parse_next(input)
}

fn iri_ref(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    delimited('<', iri_content, '>')
        .map(TokenKind::Iri)
        .parse_next(input)
}

fn iri_content(input: &mut Input<'_>) -> ModalResult<String> {
    let mut iri = String::new();
    loop {
        let chunk: &str = take_while(0.., is_iri_char).parse_next(input)?;
        iri.push_str(chunk);
        if !rest(input).starts_with('\\') {
            return Ok(iri);
        }
        '\\'.parse_next(input)?;
        iri.push(unicode_escape(input)?);
    }
}

/// `uXXXX` or `UXXXXXXXX`, after the backslash.
fn unicode_escape(input: &mut Input<'_>) -> ModalResult<char> {
    let hex: &str = alt((
        preceded('u', take_while(4, AsChar::is_hex_digit)),
        preceded('U', take_while(8, AsChar::is_hex_digit)),
    ))
    .parse_next(input)?;
    match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
        Some(c) => Ok(c),
        None => backtrack(),
    }
}

/// `@prefix`, `@base` or a language tag.
fn at_keyword(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    let word: &str = preceded(
        '@',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-'),
    )
    .parse_next(input)?;
    Ok(match word {
        "prefix" => TokenKind::KwPrefix,
        "base" => TokenKind::KwBase,
        _ => TokenKind::LangTag(word.to_string()),
    })
}

fn blank_node_label(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    preceded("_:", pn_local)
        .map(TokenKind::BlankNodeLabel)
        .parse_next(input)
}

/// `:local` or a bare `:`.
fn default_prefix(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    preceded(':', opt(pn_local))
        .map(|local| TokenKind::PrefixedName {
            prefix: String::new(),
            local: local.unwrap_or_default(),
        })
        .parse_next(input)
}

/// `prefix:local`, `prefix:` or one of the bare keywords.
fn name_or_keyword(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    let word: &str = (one_of(is_pn_chars_base), name_tail)
        .take()
        .parse_next(input)?;

    if opt(':').parse_next(input)?.is_some() {
        let local = opt(pn_local).parse_next(input)?;
        return Ok(TokenKind::PrefixedName {
            prefix: word.to_string(),
            local: local.unwrap_or_default(),
        });
    }

    match word {
        "a" => Ok(TokenKind::KwA),
        "true" => Ok(TokenKind::KwTrue),
        "false" => Ok(TokenKind::KwFalse),
        w if w.eq_ignore_ascii_case("prefix") => Ok(TokenKind::KwSparqlPrefix),
        w if w.eq_ignore_ascii_case("base") => Ok(TokenKind::KwSparqlBase),
        _ => backtrack(),
    }
}

/// Name characters with inner dots. A trailing `.` ends the statement instead.
fn name_tail(input: &mut Input<'_>) -> ModalResult<()> {
    loop {
        let _: &str = take_while(0.., is_pn_chars).parse_next(input)?;
        let mut ahead = rest(input).chars();
        if ahead.next() == Some('.') && ahead.next().map_or(false, is_pn_chars) {
            '.'.parse_next(input)?;
        } else {
            return Ok(());
        }
    }
}

/// Local part of a prefixed name, also used for blank node labels.
fn pn_local(input: &mut Input<'_>) -> ModalResult<String> {
    let mut local = String::new();
    loop {
        let chunk: &str =
            take_while(0.., |c: char| is_pn_chars(c) || c == ':').parse_next(input)?;
        local.push_str(chunk);

        let mut ahead = rest(input).chars();
        match (ahead.next(), ahead.next()) {
            (Some('.'), Some(next)) if is_pn_chars(next) || matches!(next, ':' | '%' | '\\') => {
                '.'.parse_next(input)?;
                local.push('.');
            }
            (Some('%'), _) => {
                let hex: &str =
                    preceded('%', take_while(2, AsChar::is_hex_digit)).parse_next(input)?;
                local.push('%');
                local.push_str(hex);
            }
            (Some('\\'), _) => {
                let escaped: char = preceded('\\', one_of(|c: char| LOCAL_ESCAPES.contains(c))).parse_next(input)?;
                local.push(escaped);
            }
            _ => break,
        }
    }

    if local.is_empty() {
        return backtrack();
    }
    Ok(local)
}

fn string_literal(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((
        delimited("\"\"\"", long_double_body, "\"\"\""),
        delimited("'''", long_single_body, "'''"),
        delimited('"', short_double_body, '"'),
        delimited('\'', short_single_body, '\''),
    ))
    .map(TokenKind::String)
    .parse_next(input)
}

fn long_double_body(input: &mut Input<'_>) -> ModalResult<String> {
    long_string_body(input, '"')
}

fn long_single_body(input: &mut Input<'_>) -> ModalResult<String> {
    long_string_body(input, '\'')
}

fn short_double_body(input: &mut Input<'_>) -> ModalResult<String> {
    short_string_body(input, '"')
}

fn short_single_body(input: &mut Input<'_>) -> ModalResult<String> {
    short_string_body(input, '\'')
}

/// Content of a single-line string; stops at the quote, a newline or the end.
fn short_string_body(input: &mut Input<'_>, quote: char) -> ModalResult<String> {
    let mut value = String::new();
    loop {
        let chunk: &str =
            take_while(0.., |c: char| c != quote && !matches!(c, '\\' | '\n' | '\r'))
                .parse_next(input)?;
        value.push_str(chunk);
        if !rest(input).starts_with('\\') {
            return Ok(value);
        }
        value.push(string_escape(input)?);
    }
}

/// Content of a triple-quoted string. Lone quotes and newlines are literal.
fn long_string_body(input: &mut Input<'_>, quote: char) -> ModalResult<String> {
    let closing: String = std::iter::repeat(quote).take(3).collect();
    let mut value = String::new();
    loop {
        let chunk: &str = take_while(0.., |c: char| c != quote && c != '\\').parse_next(input)?;
        value.push_str(chunk);

        let ahead = rest(input);
        if ahead.is_empty() || ahead.starts_with(closing.as_str()) {
            return Ok(value);
        }
        if ahead.starts_with('\\') {
            value.push(string_escape(input)?);
        } else {
            let c: char = any.parse_next(input)?;
            value.push(c);
        }
    }
}

fn string_escape(input: &mut Input<'_>) -> ModalResult<char> {
    '\\'.parse_next(input)?;
    if matches!(rest(input).chars().next(), Some('u') | Some('U')) {
        return unicode_escape(input);
    }
    any.verify_map(|c| match c {
        't' => Some('\t'),
        'b' => Some('\u{8}'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        'f' => Some('\u{c}'),
        '"' => Some('"'),
        '\'' => Some('\''),
        '\\' => Some('\\'),
        _ => None,
    })
    .parse_next(input)
}

fn number(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((double, decimal, integer)).parse_next(input)
}

fn double(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    (
        opt(one_of(['+', '-'])),
        alt((
            (digit1, '.', opt(digit1)).take(),
            ('.', digit1).take(),
            digit1,
        )),
        one_of(['e', 'E']),
        opt(one_of(['+', '-'])),
        digit1,
    )
        .take()
        .map(|text: &str| TokenKind::Double(text.to_string()))
        .parse_next(input)
}

fn decimal(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    (opt(one_of(['+', '-'])), opt(digit1), '.', digit1)
        .take()
        .map(|text: &str| TokenKind::Decimal(text.to_string()))
        .parse_next(input)
}

fn integer(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    (opt(one_of(['+', '-'])), digit1)
        .take()
        .map(|text: &str| TokenKind::Integer(text.to_string()))
        .parse_next(input)
}

fn punctuation(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    any.verify_map(|c| match c {
        '.' => Some(TokenKind::Dot),
        ',' => Some(TokenKind::Comma),
        ';' => Some(TokenKind::Semicolon),
        '[' => Some(TokenKind::LBracket),
        ']' => Some(TokenKind::RBracket),
        '(' => Some(TokenKind::LParen),
        ')' => Some(TokenKind::RParen),
        _ => None,
    })
    .parse_next(input)
}
