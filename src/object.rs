use indexmap::IndexMap;
use log::warn;

use crate::error::ObjectError;
use crate::object_id::ObjectId;
use crate::Result;

/// Maximum depth `resolve_direct` and `flatten` will walk through nested
/// `IndirectObject` wrappers before giving up and returning `Null`.
pub const MAX_INDIRECT_DEPTH: usize = 20;

/// How a `String` object was written in the source bytes. Preserved so that a
/// round-trip re-serializes the same way the writer produced it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StringFormat {
    Literal,
    Hexadecimal,
}

/// A PDF stream: a dictionary describing the payload plus the (possibly still
/// encoded/encrypted) bytes of the payload itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    pub content: Vec<u8>,
    /// Absolute file offset of the first content byte, recorded by the parser
    /// so that a stream whose `Length` could not be resolved up front (e.g. a
    /// zero-length placeholder) can be re-read once the length is known.
    pub start_position: Option<usize>,
}

impl Stream {
    pub fn new(dict: Dictionary, content: Vec<u8>) -> Self {
        Stream {
            dict,
            content,
            start_position: None,
        }
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.dict.set(
            b"Length".to_vec(),
            Object::Integer(content.len() as i64),
        );
        self.content = content;
    }

    /// The stream's `Filter` entry, normalized to a list of filter names
    /// regardless of whether it was a single `Name` or an `Array` of them.
    pub fn filters(&self) -> Result<Vec<&[u8]>> {
        match self.dict.get(b"Filter") {
            Ok(Object::Name(name)) => Ok(vec![name.as_slice()]),
            Ok(Object::Array(filters)) => filters
                .iter()
                .map(|o| o.as_name())
                .collect::<Result<Vec<_>>>(),
            Ok(_) => Err(ObjectError::UnexpectedType {
                expected: "Name or Array",
                key: "Filter".into(),
            }
            .into()),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// An insertion-ordered mapping from PDF names to objects.
///
/// Ordering is part of the data model: dictionaries round-trip
/// deterministically, which matters both for byte-identical re-serialization
/// and for signature dictionaries whose digest covers the exact encoded
/// bytes. Overwriting an existing key's value does not move it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dictionary(IndexMap<Vec<u8>, Object>);

impl Dictionary {
    pub fn new() -> Self {
        Dictionary(IndexMap::new())
    }

    pub fn get(&self, key: &[u8]) -> Result<&Object> {
        self.0.get(key).ok_or_else(|| {
            ObjectError::MissingKey(String::from_utf8_lossy(key).into_owned()).into()
        })
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Result<&mut Object> {
        self.0.get_mut(key).ok_or_else(|| {
            ObjectError::MissingKey(String::from_utf8_lossy(key).into_owned()).into()
        })
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or overwrite `key`. Overwriting does not change the key's
    /// position in iteration order.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Vec<u8>>,
        V: Into<Object>,
    {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Object)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Vec<u8>, &mut Object)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_type(&self) -> Result<&[u8]> {
        self.get(b"Type").and_then(Object::as_name)
    }

    pub fn has_type(&self, type_name: &[u8]) -> bool {
        self.get_type().map(|t| t == type_name).unwrap_or(false)
    }
}

/// A PDF object. This is a closed set of ten variants; consumers dispatch on
/// the tag rather than through dynamic dispatch, matching the grain of the
/// format itself.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(Vec<u8>, StringFormat),
    Name(Vec<u8>),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    /// An object number plus generation naming an indirect object, without
    /// owning it. Resolved on demand through the xref engine; never held as
    /// a borrow.
    Reference(ObjectId),
    /// An indirect object's own (id, value) pair as parsed from `N G obj
    /// ... endobj`, before it is filed under its object number.
    IndirectObject(ObjectId, Box<Object>),
    Stream(Stream),
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Object::Boolean(v)
    }
}
impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Object::Integer(v)
    }
}
impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Object::Real(v)
    }
}
impl From<Dictionary> for Object {
    fn from(v: Dictionary) -> Self {
        Object::Dictionary(v)
    }
}
impl From<Vec<Object>> for Object {
    fn from(v: Vec<Object>) -> Self {
        Object::Array(v)
    }
}
impl From<ObjectId> for Object {
    fn from(v: ObjectId) -> Self {
        Object::Reference(v)
    }
}

impl Object {
    pub fn string_literal<S: Into<Vec<u8>>>(s: S) -> Self {
        Object::String(s.into(), StringFormat::Literal)
    }

    pub fn string_hex<S: Into<Vec<u8>>>(s: S) -> Self {
        Object::String(s.into(), StringFormat::Hexadecimal)
    }

    pub fn type_name(&self) -> Result<&[u8]> {
        self.as_dict().and_then(Dictionary::get_type)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Object::Boolean(b) => Ok(*b),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Boolean",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Object::Integer(i) => Ok(*i),
            Object::Real(f) => Ok(*f as i64),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Integer",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(f) => Ok(*f),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Real",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_name(&self) -> Result<&[u8]> {
        match self {
            Object::Name(n) => Ok(n),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Name",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_str(&self) -> Result<&[u8]> {
        match self {
            Object::String(s, _) => Ok(s),
            _ => Err(ObjectError::UnexpectedType {
                expected: "String",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_array(&self) -> Result<&[Object]> {
        match self {
            Object::Array(a) => Ok(a),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Array",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Object>> {
        match self {
            Object::Array(a) => Ok(a),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Array",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Object::Dictionary(d) => Ok(d),
            Object::Stream(s) => Ok(&s.dict),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Dictionary",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_dict_mut(&mut self) -> Result<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Ok(d),
            Object::Stream(s) => Ok(&mut s.dict),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Dictionary",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_stream(&self) -> Result<&Stream> {
        match self {
            Object::Stream(s) => Ok(s),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Stream",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_stream_mut(&mut self) -> Result<&mut Stream> {
        match self {
            Object::Stream(s) => Ok(s),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Stream",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn as_reference(&self) -> Result<ObjectId> {
        match self {
            Object::Reference(id) => Ok(*id),
            _ => Err(ObjectError::UnexpectedType {
                expected: "Reference",
                key: String::new(),
            }
            .into()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }
}

/// Walks through nested `IndirectObject` wrappers (never `Reference`s) to the
/// direct value underneath. A chain deeper than `MAX_INDIRECT_DEPTH` is
/// treated as malformed and resolves to `Null`.
pub fn resolve_direct(obj: &Object) -> Object {
    let mut current = obj;
    for _ in 0..MAX_INDIRECT_DEPTH {
        match current {
            Object::IndirectObject(_, inner) => current = inner,
            _ => return current.clone(),
        }
    }
    warn!("resolve_direct: indirect-object nesting exceeded {MAX_INDIRECT_DEPTH}, returning Null");
    Object::Null
}

/// Replaces every embedded `Reference` and `IndirectObject` with its resolved
/// direct value (via `resolver`), recursively, and sorts dictionary keys.
/// Used only to build canonical forms for structural equality comparison; it
/// never mutates the cached object graph.
pub fn flatten<F>(obj: &Object, resolver: &F, depth: usize) -> Object
where
    F: Fn(ObjectId) -> Object,
{
    if depth >= MAX_INDIRECT_DEPTH {
        warn!("flatten: nesting exceeded {MAX_INDIRECT_DEPTH}, returning Null");
        return Object::Null;
    }

    match obj {
        Object::Reference(id) => flatten(&resolver(*id), resolver, depth + 1),
        Object::IndirectObject(_, inner) => flatten(inner, resolver, depth + 1),
        Object::Array(items) => {
            Object::Array(items.iter().map(|o| flatten(o, resolver, depth + 1)).collect())
        }
        Object::Dictionary(dict) => {
            let mut entries: Vec<(Vec<u8>, Object)> = dict
                .iter()
                .map(|(k, v)| (k.clone(), flatten(v, resolver, depth + 1)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Dictionary::new();
            for (k, v) in entries {
                sorted.set(k, v);
            }
            Object::Dictionary(sorted)
        }
        Object::Stream(stream) => {
            let mut entries: Vec<(Vec<u8>, Object)> = stream
                .dict
                .iter()
                .map(|(k, v)| (k.clone(), flatten(v, resolver, depth + 1)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Dictionary::new();
            for (k, v) in entries {
                sorted.set(k, v);
            }
            Object::Stream(Stream::new(sorted, stream.content.clone()))
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_set_does_not_reorder_existing_key() {
        let mut dict = Dictionary::new();
        dict.set(b"A".to_vec(), Object::Integer(1));
        dict.set(b"B".to_vec(), Object::Integer(2));
        dict.set(b"A".to_vec(), Object::Integer(3));

        let keys: Vec<_> = dict.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"A".to_vec(), b"B".to_vec()]);
        assert_eq!(dict.get(b"A").unwrap().as_i64().unwrap(), 3);
    }

    #[test]
    fn resolve_direct_breaks_deep_cycles() {
        let mut obj = Object::Integer(7);
        for _ in 0..MAX_INDIRECT_DEPTH + 5 {
            obj = Object::IndirectObject((1, 0), Box::new(obj));
        }
        assert_eq!(resolve_direct(&obj), Object::Null);
    }

    #[test]
    fn resolve_direct_within_depth_unwraps() {
        let inner = Object::Integer(42);
        let wrapped = Object::IndirectObject((1, 0), Box::new(inner.clone()));
        assert_eq!(resolve_direct(&wrapped), inner);
    }

    #[test]
    fn array_and_dictionary_equality_is_structural() {
        let mut a = Dictionary::new();
        a.set(b"X".to_vec(), Object::Integer(1));
        let mut b = Dictionary::new();
        b.set(b"X".to_vec(), Object::Integer(1));
        assert_eq!(Object::Dictionary(a), Object::Dictionary(b));
    }
}
