//! Object-level parsing (§4.C): arrays, dictionaries, references, and the
//! indirect-object wrapper (`N G obj ... endobj`), including stream body
//! extraction with its `Length` recursion guard.

use std::collections::HashSet;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::combinator::{map, opt, peek};
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::IResult;

use super::lexer::{boolean, hex_string, literal_string, name, null, numeric, space};
use super::ParserInput;
use crate::error::ParseError;
use crate::object::{Dictionary, Object, Stream};
use crate::object_id::ObjectId;
use crate::reader::Reader;
use crate::Result;

/// A bare PDF value: null, boolean, number, reference, name, string, array,
/// or dictionary. Streams are not values in their own right; they only
/// occur as the body of an indirect object.
pub fn value(input: ParserInput) -> IResult<ParserInput, Object> {
    delimited(
        space,
        alt((
            map(null, |_| Object::Null),
            map(boolean, Object::Boolean),
            number_or_reference,
            map(name, Object::Name),
            map(literal_string, |(s, f)| Object::String(s, f)),
            map(hex_string, |(s, f)| Object::String(s, f)),
            map(array, Object::Array),
            map(dictionary, Object::Dictionary),
        )),
        space,
    )(input)
}

/// Disambiguates `123` (integer), `1.5` (real) and `1 0 R` (reference) by
/// looking ahead past the first number for a second integer and an `R`.
fn number_or_reference(input: ParserInput) -> IResult<ParserInput, Object> {
    let (rest, first) = numeric(input)?;
    let Object::Integer(object_number) = first else {
        return Ok((rest, first));
    };
    if object_number < 0 {
        return Ok((rest, first));
    }

    let attempt = preceded(space, numeric)(rest);
    if let Ok((rest2, Object::Integer(generation))) = attempt {
        if generation >= 0 {
            if let Ok((rest3, _)) = preceded(space, tag("R"))(rest2) {
                return Ok((rest3, Object::Reference((object_number as u32, generation as u16))));
            }
        }
    }

    Ok((rest, first))
}

fn array(input: ParserInput) -> IResult<ParserInput, Vec<Object>> {
    delimited(tag("["), many0(value), preceded(space, tag("]")))(input)
}

pub fn dictionary(input: ParserInput) -> IResult<ParserInput, Dictionary> {
    let (input, _) = tag("<<")(input)?;
    let (input, pairs) = many0(preceded(space, dict_entry))(input)?;
    let (input, _) = preceded(space, tag(">>"))(input)?;
    let mut dict = Dictionary::new();
    for (key, value) in pairs {
        dict.set(key, value);
    }
    Ok((input, dict))
}

/// A malformed-writer quirk: `/KeyFoonull/Next ...` concatenates a `null`
/// keyword directly onto the preceding name with no separating whitespace.
/// If a parsed name ends in the literal `null` and the next non-space byte
/// starts a new name, the trailing `null` is split off as an explicit
/// `Null` value instead of becoming part of the key.
fn dict_entry(input: ParserInput) -> IResult<ParserInput, (Vec<u8>, Object)> {
    let (input, key) = name(input)?;
    if key.len() > 4 && key.ends_with(b"null") {
        if let Ok((after_space, _)) = space(input) {
            if after_space.fragment().first() == Some(&b'/') {
                let split_key = key[..key.len() - 4].to_vec();
                return Ok((input, (split_key, Object::Null)));
            }
        }
    }
    let (input, val) = value(input)?;
    Ok((input, (key, val)))
}

/// Parses a bare object value (used for object-stream members, which are
/// never streams themselves), tolerating trailing garbage.
pub fn object(input: ParserInput) -> Option<Object> {
    value(input).ok().map(|(_, obj)| obj)
}

fn header_line(input: ParserInput) -> IResult<ParserInput, (u32, u16)> {
    let (input, _) = space(input)?;
    let (input, num) = numeric(input)?;
    let (input, _) = space(input)?;
    let (input, gen) = numeric(input)?;
    let (input, _) = space(input)?;
    let (input, _) = tag("obj")(input)?;
    let num = match num {
        Object::Integer(n) if n >= 0 => n as u32,
        _ => 0,
    };
    let gen = match gen {
        Object::Integer(n) if n >= 0 && n <= u16::MAX as i64 => n as u16,
        _ => 0,
    };
    Ok((input, (num, gen)))
}

/// Tries to match an `N G obj` header at the very start of `input`, for the
/// top-down repair scan (§4.D). Returns the parsed id and how many bytes
/// the match consumed.
pub(crate) fn scan_object_header(input: ParserInput) -> Option<(ObjectId, usize)> {
    let before = input.fragment().len();
    let (rest, id) = header_line(input).ok()?;
    Some((id, before - rest.fragment().len()))
}

/// Parses the indirect object starting at `offset` within `input`'s full
/// buffer. `reader` is consulted only to resolve an indirect `/Length`
/// value for a stream body; `seen` guards against that resolution cycling
/// back into the same object.
pub fn indirect_object<'a>(
    input: ParserInput<'a>, offset: usize, expected_id: Option<ObjectId>, reader: &Reader<'_>,
    seen: &mut HashSet<ObjectId>,
) -> Result<(ObjectId, Object)> {
    let full = *input.fragment();
    if offset > full.len() {
        return Err(ParseError::MalformedSyntax.into());
    }
    let slice = &full[offset..];
    let slice_input = ParserInput::new_extra(slice, input.extra);

    let (rest, (num, gen)) =
        header_line(slice_input).map_err(|_| ParseError::MalformedSyntax)?;
    let id = (num, gen);
    if let Some(expected) = expected_id {
        if expected.0 != id.0 {
            log::warn!("object at offset {offset} declares id {:?}, expected {:?}", id, expected);
            return Err(ParseError::ObjectNumberMismatch { expected: expected.0, found: id }.into());
        }
    }

    let (rest, obj) = value(rest).map_err(|_| ParseError::MalformedSyntax)?;
    let (rest, _) = space(rest).map_err(|_| ParseError::MalformedSyntax)?;

    let is_stream = peek(opt(tag::<_, ParserInput, ()>("stream")))(rest)
        .map(|(_, m)| m.is_some())
        .unwrap_or(false);

    if !is_stream {
        return Ok((id, obj));
    }

    let Object::Dictionary(dict) = obj else {
        return Ok((id, obj));
    };

    let (rest, _) = tag::<_, ParserInput, ()>("stream")(rest).map_err(|_| ParseError::MalformedSyntax)?;
    let body_offset = offset + (full.len() - offset) - rest.fragment().len();
    let mut start = body_offset;
    let bytes = *rest.fragment();
    if bytes.first() == Some(&b'\r') && bytes.get(1) == Some(&b'\n') {
        start += 2;
    } else if bytes.first() == Some(&b'\n') {
        start += 1;
    }

    let length = resolve_stream_length(&dict, id, reader, seen)?;
    let length = usize::try_from(length).map_err(|_| ParseError::NegativeStreamLength(id.0, id.1))?;
    let mut end = start.checked_add(length).ok_or(ParseError::StreamOverrunsFile)?;

    if end > full.len() {
        // Corrupt Length: correct downward against the next known object's
        // xref offset rather than failing outright (§4.C, §7). 17 is the
        // length of the `endstream\nendobj\n` terminator that separates the
        // stream body from the next object; `\r\n`-terminated files may
        // deviate and are not specially handled.
        match reader.next_object_offset_after(start) {
            Some(next_offset) if next_offset > start + 17 => {
                let corrected = next_offset - start - 17;
                log::warn!(
                    "stream {} {} overruns file with declared Length {}; correcting to {} using next object at {}",
                    id.0, id.1, length, corrected, next_offset
                );
                end = start + corrected;
            }
            _ => return Err(ParseError::NegativeStreamLength(id.0, id.1).into()),
        }
    }

    if end > full.len() {
        return Err(ParseError::StreamOverrunsFile.into());
    }

    let content = full[start..end].to_vec();
    let mut stream = Stream::new(dict, content);
    stream.start_position = Some(start);

    Ok((id, Object::Stream(stream)))
}

fn resolve_stream_length(
    dict: &Dictionary, id: ObjectId, reader: &Reader<'_>, seen: &mut HashSet<ObjectId>,
) -> Result<i64> {
    match dict.get(b"Length") {
        Ok(Object::Integer(n)) => Ok(*n),
        Ok(Object::Reference(length_id)) => {
            if seen.contains(length_id) {
                return Err(ParseError::StreamLengthRecursion(id.0, id.1).into());
            }
            let resolved = reader.get_object(*length_id, seen)?;
            resolved.as_i64().map_err(|_| ParseError::MissingStreamLength.into())
        }
        _ => Err(ParseError::MissingStreamLength.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_not_followed_by_generation_and_r() {
        let (_, obj) = value(ParserInput::new_extra(b"42", "")).unwrap();
        assert_eq!(obj, Object::Integer(42));
    }

    #[test]
    fn scan_object_header_matches_at_start_of_input() {
        let (id, consumed) = scan_object_header(ParserInput::new_extra(b"12 0 obj<< >>", "")).unwrap();
        assert_eq!(id, (12, 0));
        assert_eq!(&b"12 0 obj<< >>"[..consumed], b"12 0 obj");
    }

    #[test]
    fn scan_object_header_rejects_non_header_text() {
        assert!(scan_object_header(ParserInput::new_extra(b"not a header", "")).is_none());
    }

    #[test]
    fn parses_reference() {
        let (_, obj) = value(ParserInput::new_extra(b"12 0 R", "")).unwrap();
        assert_eq!(obj, Object::Reference((12, 0)));
    }

    #[test]
    fn dict_entry_splits_keynull_quirk() {
        let (_, dict) = dictionary(ParserInput::new_extra(b"<< /Foonull/Bar 1 >>", "")).unwrap();
        assert_eq!(dict.get(b"Foo").unwrap(), &Object::Null);
        assert_eq!(dict.get(b"Bar").unwrap().as_i64().unwrap(), 1);
    }

    #[test]
    fn a_name_literally_spelled_null_is_not_split() {
        let (_, dict) = dictionary(ParserInput::new_extra(b"<< /null 1 >>", "")).unwrap();
        assert_eq!(dict.get(b"null").unwrap().as_i64().unwrap(), 1);
    }

    #[test]
    fn parses_nested_dictionary_and_array() {
        let (_, obj) = value(ParserInput::new_extra(
            b"<< /Kids [1 0 R 2 0 R] /Count 2 >>",
            "",
        ))
        .unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get(b"Count").unwrap().as_i64().unwrap(), 2);
    }
}
