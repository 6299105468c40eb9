//! `pdf-core`: an object model, lexer/parser, cross-reference engine, and
//! standard security handler for reading PDF documents.
//!
//! This crate only reads. It resolves the full cross-reference chain
//! (classical tables, xref streams, hybrid-reference `/Prev`/`XRefStm`,
//! object streams), authenticates the standard security handler's RC4 and
//! AES-128/256 encryption (revisions 2-6), and exposes the resulting object
//! graph through [`Document`].

pub mod byte_source;
pub mod document;
pub mod encodings;
pub mod encryption;
mod error;
pub mod filters;
pub mod object;
pub mod object_id;
pub mod object_stream;
pub mod parser;
pub mod reader;
pub mod xref;

pub use document::Document;
pub use error::{DecryptionError, Error, ObjectError, ParseError, XrefError};
pub use object::{Dictionary, Object, Stream, StringFormat};
pub use object_id::ObjectId;

/// Crate-wide result alias; every fallible public operation returns
/// `Result<T>` rather than `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
