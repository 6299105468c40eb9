//! Object streams (PDF 1.5+, §3): a stream object whose content is itself a
//! packed sequence of other indirect objects, referenced from the xref
//! table via [`crate::xref::XrefEntry::Compressed`].

use std::collections::BTreeMap;

use crate::error::XrefError;
use crate::filters;
use crate::object::{Object, Stream};
use crate::object_id::ObjectId;
use crate::parser::{self, ParserInput};
use crate::Result;

/// A decoded object stream. Built once per stream and cached by the caller
/// so looking up several objects hosted in the same stream only
/// decompresses and parses it once (§5).
#[derive(Debug, Clone, Default)]
pub struct ObjectStream {
    pub objects: BTreeMap<ObjectId, Object>,
}

impl ObjectStream {
    /// Decodes `stream`'s filters (if its content hasn't already been
    /// decoded) and parses the packed objects described by its `N`
    /// (object count) and `First` (byte offset of the first object) entries.
    pub fn new(stream: &mut Stream) -> Result<Self> {
        let object_count = stream
            .dict
            .get(b"N")
            .and_then(|o| o.as_i64())
            .map_err(|_| XrefError::InvalidWidths)? as u32;
        let first_offset = stream
            .dict
            .get(b"First")
            .and_then(|o| o.as_i64())
            .map_err(|_| XrefError::InvalidWidths)? as usize;

        let decoded = filters::decode(&stream.dict, &stream.content)?;

        let extends = stream
            .dict
            .get(b"Extends")
            .ok()
            .and_then(|o| o.as_reference().ok());
        if extends.is_some() {
            // Chained object streams (§3) are rare in practice; the caller
            // is expected to have already resolved `Extends` if it cares to
            // merge its objects in, since that requires document-level
            // lookup this module does not have access to.
        }

        let header = std::str::from_utf8(&decoded[..first_offset.min(decoded.len())])
            .map_err(|_| XrefError::InvalidWidths)?;
        let mut numbers = header.split_whitespace();
        let mut index = Vec::with_capacity(object_count as usize);
        for _ in 0..object_count {
            let object_number: u32 = numbers
                .next()
                .and_then(|n| n.parse().ok())
                .ok_or(XrefError::InvalidWidths)?;
            let offset: usize = numbers
                .next()
                .and_then(|n| n.parse().ok())
                .ok_or(XrefError::InvalidWidths)?;
            index.push((object_number, offset));
        }

        let mut objects = BTreeMap::new();
        for (i, &(object_number, offset)) in index.iter().enumerate() {
            let start = first_offset + offset;
            let end = if i + 1 < index.len() {
                first_offset + index[i + 1].1
            } else {
                decoded.len()
            };
            let slice = decoded.get(start..end.max(start)).unwrap_or(&[]);
            if let Some(obj) = parser::object(ParserInput::new_extra(slice, "object stream")) {
                objects.insert((object_number, 0), obj);
            }
        }

        Ok(ObjectStream { objects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;

    #[test]
    fn parses_packed_header_and_slices_objects() {
        let mut dict = Dictionary::new();
        dict.set(b"N".to_vec(), Object::Integer(2));
        dict.set(b"First".to_vec(), Object::Integer(8));
        let mut stream = Stream::new(dict, b"1 0 2 2 true false".to_vec());
        stream.content = b"1 0 2 2 true false".to_vec();

        let object_stream = ObjectStream::new(&mut stream).unwrap();
        assert_eq!(object_stream.objects.get(&(1, 0)), Some(&Object::Boolean(true)));
        assert_eq!(object_stream.objects.get(&(2, 0)), Some(&Object::Boolean(false)));
    }
}
