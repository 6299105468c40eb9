//! Lexer and parser (§4.C, §4.D): turns raw bytes into [`crate::Object`]
//! values, indirect objects, and cross-reference sections.

mod lexer;
mod object;
mod xref;

pub use object::{indirect_object, object};
pub(crate) use object::scan_object_header;
pub use xref::{binary_mark, header, xref_and_trailer, xref_start};

/// A byte-offset-tracking input slice. The `&'static str` extra field is a
/// human-readable label used only in parser error messages.
pub type ParserInput<'a> = nom_locate::LocatedSpan<&'a [u8], &'static str>;
