use std::io;

use thiserror::Error;

use crate::object_id::ObjectId;

/// Errors raised while reading or writing typed [`crate::Object`] values
/// through the accessor methods (`as_i64`, `as_dict`, ...) or `Dictionary`
/// lookups.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectError {
    #[error("expected {expected}, found a different object type{}", key_suffix(key))]
    UnexpectedType { expected: &'static str, key: String },
    #[error("dictionary has no entry named /{0}")]
    MissingKey(String),
}

fn key_suffix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!(" (key /{key})")
    }
}

/// Errors raised by the lexer/parser (§4.C).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("could not locate a valid %PDF- header")]
    InvalidFileHeader,
    #[error("lexer could not classify a token")]
    MalformedSyntax,
    #[error("malformed xref section")]
    InvalidXref,
    #[error("stream dictionary is missing Length, or Length could not be resolved")]
    MissingStreamLength,
    #[error("stream length resolution re-entered object {0} {1} while already in progress")]
    StreamLengthRecursion(u32, u16),
    #[error("indirect object {0} {1} has a negative stream length after correction")]
    NegativeStreamLength(u32, u16),
    #[error("stream is longer than the remaining file")]
    StreamOverrunsFile,
    #[error("object at offset declares id {found:?}, expected {expected}")]
    ObjectNumberMismatch { expected: u32, found: ObjectId },
}

/// Errors raised resolving and repairing cross-reference information
/// (§4.D).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XrefError {
    #[error("could not locate startxref / a usable xref table")]
    Start,
    #[error("Prev offset in trailer is out of range")]
    PrevStart,
    #[error("XRefStm offset in trailer is out of range")]
    StreamStart,
    #[error("xref stream W array is invalid")]
    InvalidWidths,
    #[error("xref stream Size exceeds the maximum of 8,388,607 entries")]
    SizeTooLarge,
    #[error("an object stream's xref entry claims it is hosted inside itself")]
    SelfHostedObjectStream,
    #[error("repair was already attempted once for this parser instance")]
    RepairAlreadyAttempted,
    #[error("repair scan found no recoverable indirect objects")]
    RepairFoundNothing,
}

/// Errors raised by the standard security handler (§4.F).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecryptionError {
    #[error("the /Encrypt dictionary is missing")]
    MissingEncryptDictionary,
    #[error("missing encryption version (/V)")]
    MissingVersion,
    #[error("missing encryption revision (/R)")]
    MissingRevision,
    #[error("missing the owner password hash (/O)")]
    MissingOwnerPassword,
    #[error("missing the user password hash (/U)")]
    MissingUserPassword,
    #[error("missing the permissions field (/P)")]
    MissingPermissions,
    #[error("missing the file /ID elements")]
    MissingFileID,
    #[error("missing the file encryption key length")]
    MissingKeyLength,

    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("invalid ciphertext length")]
    InvalidCipherTextLength,
    #[error("an Encrypt dictionary field has the wrong type for this revision")]
    InvalidType,

    #[error("the supplied password is incorrect")]
    IncorrectPassword,
    #[error("invalid padding encountered while decrypting; the key is likely incorrect")]
    Padding,

    #[error("security handler {0:?} is not supported; only Standard is")]
    UnsupportedSecurityHandler(Vec<u8>),
    #[error("encryption version {0} is not supported")]
    UnsupportedVersion(i64),
    #[error("encryption revision {0} is not supported")]
    UnsupportedRevision(i64),
    #[error("crypt filter method {0:?} is not supported")]
    UnsupportedCryptFilterMethod(Vec<u8>),

    #[error(transparent)]
    StringPrep(#[from] stringprep::Error),
}

/// Umbrella error type for the core.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Xref(#[from] XrefError),
    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error("reference cycle detected resolving object {} {}", .0.0, .0.1)]
    ReferenceCycle(ObjectId),
    #[error("no xref entry for the requested object")]
    MissingXrefEntry,
    #[error("offset {0} is beyond the end of the document")]
    InvalidOffset(usize),
    #[error("invalid stream: {0}")]
    InvalidStream(String),
    #[error("numeric conversion failed: {0}")]
    NumericCast(String),
    #[error("document is not encrypted")]
    NotEncrypted,
    #[error("the supplied password did not authenticate this document")]
    InvalidPassword,
    #[error("dictionary has no entry named /{0}")]
    DictKey(String),
    #[error("{0}")]
    Unimplemented(&'static str),
}
