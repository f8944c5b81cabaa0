use std::fmt;
use std::io::{self, Write};

use bstr::ByteSlice;

pub const PAREN_OPEN: u8 = b'(';
pub const PAREN_CLOSE: u8 = b')';
pub const BRACKET_OPEN: u8 = b'[';
pub const BRACKET_CLOSE: u8 = b']';
pub const COMMA: u8 = b',';
pub const QUOTE: u8 = b'"';

/// A single ATerm value.
///
/// Tuples are represented as applications with an empty function name, which
/// is also how they are written out: `("a","b")`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Term {
    /// A quoted string, stored unescaped.
    Str(String),
    /// A list of terms, `[t1,t2]`.
    List(Vec<Term>),
    /// A function application `name(t1,t2)`, or a tuple if `name` is empty.
    Appl { name: String, args: Vec<Term> },
}

impl Term {
    pub fn string<S: Into<String>>(s: S) -> Self {
        Term::Str(s.into())
    }

    pub fn appl<S: Into<String>>(name: S, args: Vec<Term>) -> Self {
        Term::Appl {
            name: name.into(),
            args,
        }
    }

    pub fn tuple(args: Vec<Term>) -> Self {
        Term::Appl {
            name: String::new(),
            args,
        }
    }

    /// A list of strings, in iteration order.
    pub fn string_list<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Term::List(strings.into_iter().map(Term::string).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(elems) => Some(elems),
            _ => None,
        }
    }

    /// Matches an application of `name` with exactly `arity` arguments, and
    /// returns the arguments.
    pub fn as_appl(&self, name: &str, arity: usize) -> Option<&[Term]> {
        match self {
            Term::Appl { name: n, args } if n == name && args.len() == arity => Some(args),
            _ => None,
        }
    }

    pub fn as_tuple(&self, arity: usize) -> Option<&[Term]> {
        self.as_appl("", arity)
    }

    /// Matches a tuple of `N` strings.
    pub fn as_string_tuple<const N: usize>(&self) -> Option<[&str; N]> {
        let args = self.as_tuple(N)?;
        let mut out = [""; N];
        for (slot, arg) in out.iter_mut().zip(args) {
            *slot = arg.as_str()?;
        }
        Some(out)
    }

    /// Writes the canonical textual representation to the given writer.
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        match self {
            Term::Str(s) => write_quoted(w, s.as_bytes()),
            Term::List(elems) => {
                w.write_all(&[BRACKET_OPEN])?;
                write_elements(w, elems)?;
                w.write_all(&[BRACKET_CLOSE])
            }
            Term::Appl { name, args } => {
                w.write_all(name.as_bytes())?;
                w.write_all(&[PAREN_OPEN])?;
                write_elements(w, args)?;
                w.write_all(&[PAREN_CLOSE])
            }
        }
    }

    /// Returns the canonical textual representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        // Writing into a Vec can't fail.
        self.write_to(&mut buf)
            .expect("writing to a Vec<u8> is infallible");

        buf
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bytes().as_bstr())
    }
}

fn write_elements(w: &mut impl Write, elems: &[Term]) -> io::Result<()> {
    for (i, elem) in elems.iter().enumerate() {
        if i > 0 {
            w.write_all(&[COMMA])?;
        }
        elem.write_to(w)?;
    }
    Ok(())
}

/// Writes `s` in double quotes, escaping backslashes, quotes and the control
/// characters `\n`, `\r` and `\t`.
fn write_quoted(w: &mut impl Write, s: &[u8]) -> io::Result<()> {
    w.write_all(&[QUOTE])?;

    let mut start = 0;
    for (i, b) in s.iter().enumerate() {
        let escaped: &[u8] = match b {
            b'\\' => b"\\\\",
            b'"' => b"\\\"",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            b'\t' => b"\\t",
            _ => continue,
        };
        w.write_all(&s[start..i])?;
        w.write_all(escaped)?;
        start = i + 1;
    }
    w.write_all(&s[start..])?;

    w.write_all(&[QUOTE])
}
