//! This module implements parsing of the textual [ATerm][] representation
//! into a [Term].
//!
//! [ATerm]: http://program-transformation.org/Tools/ATermFormat.html
use bstr::BString;
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while};
use nom::character::complete::char as nomchar;
use nom::combinator::{all_consuming, map, map_opt, map_res, value};
use nom::error::{Error, ErrorKind};
use nom::sequence::delimited;
use nom::IResult;

use super::Term;

/// Returned when the input is not a syntactically valid ATerm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("unexpected input at byte {offset} ({kind:?})")]
    Unexpected {
        offset: usize,
        kind: nom::error::ErrorKind,
    },
    #[error("premature EOF")]
    Incomplete,
}

/// How deep lists and applications may nest. Derivations need four levels.
pub const MAX_NESTING: usize = 32;

/// Parses a complete ATerm. Trailing data is an error, and so is nesting
/// deeper than [MAX_NESTING].
pub fn parse(i: &[u8]) -> Result<Term, SyntaxError> {
    match all_consuming(parse_document)(i) {
        Ok((rest, term)) => {
            // all_consuming guarantees this.
            debug_assert!(rest.is_empty());
            Ok(term)
        }
        Err(nom::Err::Incomplete(_)) => Err(SyntaxError::Incomplete),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(SyntaxError::Unexpected {
            offset: i.len() - e.input.len(),
            kind: e.code,
        }),
    }
}

/// Parse a bstr and undo any escaping.
fn parse_escaped_bstr(i: &[u8]) -> IResult<&[u8], BString> {
    escaped_transform(
        is_not("\"\\"),
        '\\',
        alt((
            value("\\".as_bytes(), nomchar('\\')),
            value("\n".as_bytes(), nomchar('n')),
            value("\t".as_bytes(), nomchar('t')),
            value("\r".as_bytes(), nomchar('r')),
            value("\"".as_bytes(), nomchar('\"')),
        )),
    )(i)
    .map(|(i, v)| (i, BString::new(v)))
}

/// Parse a field in double quotes, undo any escaping, and return the unquoted
/// and decoded string, if it's a valid string. Or fail parsing if the bytes are
/// no valid UTF-8.
fn parse_string_field(i: &[u8]) -> IResult<&[u8], String> {
    // inside double quotes…
    delimited(
        nomchar('\"'),
        alt((
            // either is a String after unescaping
            map_opt(parse_escaped_bstr, |escaped_bstr| {
                String::from_utf8(escaped_bstr.into()).ok()
            }),
            // or an empty string.
            map(tag(b""), |_| String::new()),
        )),
        nomchar('\"'),
    )(i)
}

fn parse_document(i: &[u8]) -> IResult<&[u8], Term> {
    parse_term(i, MAX_NESTING)
}

/// Takes one level off the nesting budget, failing for good once it's used
/// up.
fn descend(i: &[u8], depth: usize) -> Result<usize, nom::Err<Error<&[u8]>>> {
    depth
        .checked_sub(1)
        .ok_or_else(|| nom::Err::Failure(Error::new(i, ErrorKind::TooLarge)))
}

fn delimiter(i: &[u8], c: char) -> IResult<&[u8], char> {
    nomchar(c)(i)
}

/// Comma-separated terms, without the enclosing delimiters.
fn parse_elements(i: &[u8], depth: usize) -> IResult<&[u8], Vec<Term>> {
    let (mut i, first) = match parse_term(i, depth) {
        Ok(r) => r,
        Err(nom::Err::Error(_)) => return Ok((i, Vec::new())),
        Err(e) => return Err(e),
    };

    let mut elems = vec![first];
    while let Some(rest) = i.strip_prefix(b",") {
        let (rest, term) = parse_term(rest, depth)?;
        elems.push(term);
        i = rest;
    }

    Ok((i, elems))
}

fn parse_list(i: &[u8], depth: usize) -> IResult<&[u8], Term> {
    let (i, _) = delimiter(i, '[')?;
    let depth = descend(i, depth)?;
    let (i, elems) = parse_elements(i, depth)?;
    let (i, _) = delimiter(i, ']')?;

    Ok((i, Term::List(elems)))
}

fn parse_name(i: &[u8]) -> IResult<&[u8], &str> {
    map_res(
        take_while(|c: u8| c.is_ascii_alphanumeric() || c == b'_' || c == b'-'),
        std::str::from_utf8,
    )(i)
}

/// Parses `name(args…)`. The name may be empty, which makes it a tuple.
fn parse_appl(i: &[u8], depth: usize) -> IResult<&[u8], Term> {
    let (i, name) = parse_name(i)?;
    let (i, _) = delimiter(i, '(')?;
    let depth = descend(i, depth)?;
    let (i, args) = parse_elements(i, depth)?;
    let (i, _) = delimiter(i, ')')?;

    Ok((i, Term::appl(name, args)))
}

fn parse_term(i: &[u8], depth: usize) -> IResult<&[u8], Term> {
    match i.first() {
        Some(b'"') => map(parse_string_field, Term::Str)(i),
        Some(b'[') => parse_list(i, depth),
        _ => parse_appl(i, depth),
    }
}
