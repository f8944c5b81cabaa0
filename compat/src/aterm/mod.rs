//! A minimal implementation of the [ATerm][] format, which is used to
//! serialize Derivations.
//!
//! Only the subset needed for derivations is supported: quoted strings,
//! lists, and (possibly unnamed) function applications. There are no
//! annotations, integers or whitespace.
//!
//! [ATerm]: http://program-transformation.org/Tools/ATermFormat.html

mod parser;
mod term;

pub use parser::{parse, SyntaxError};
pub use term::Term;
