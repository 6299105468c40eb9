//! Cross-reference section parsing (§4.D): both the classical plain-text
//! `xref` table and PDF 1.5+ cross-reference streams, plus the trailer
//! dictionary that follows (or, for a stream, is) each one.

use std::collections::HashSet;

use nom::bytes::complete::{tag, take_while_m_n};
use nom::sequence::preceded;

use super::lexer::{numeric, space};
use super::object::{dictionary, indirect_object};
use super::ParserInput;
use crate::error::XrefError;
use crate::filters;
use crate::object::Object;
use crate::reader::Reader;
use crate::xref::{Xref, XrefEntry, MAX_XREF_SIZE};
use crate::Dictionary;
use crate::Result;

/// Parses one `xref`/trailer section or one cross-reference stream object,
/// starting at the beginning of `input`.
pub fn xref_and_trailer(input: ParserInput, reader: &Reader<'_>) -> Result<(Xref, Dictionary)> {
    let trimmed = skip_space(input);
    let bytes = *trimmed.fragment();
    if bytes.starts_with(b"xref") {
        classical_xref(trimmed)
    } else {
        xref_stream(trimmed, reader)
    }
}

fn skip_space(input: ParserInput) -> ParserInput {
    space(input).map(|(rest, _)| rest).unwrap_or(input)
}

fn classical_xref(input: ParserInput) -> Result<(Xref, Dictionary)> {
    let (mut input, _) = tag::<_, ParserInput, ()>("xref")(input).map_err(|_| XrefError::Start)?;
    let mut xref = Xref::new(0);

    loop {
        input = skip_space(input);
        let header = preceded(space, |i| {
            let (i, start) = numeric(i)?;
            let (i, _) = space(i)?;
            let (i, count) = numeric(i)?;
            Ok((i, (start, count)))
        })(input);

        let Ok((rest, (start, count))) = header else { break };
        let (Object::Integer(start), Object::Integer(count)) = (start, count) else { break };
        if count < 0 || start < 0 {
            return Err(XrefError::InvalidWidths.into());
        }
        input = rest;

        for i in 0..count {
            input = skip_space(input);
            let bytes = *input.fragment();
            if bytes.len() < 18 {
                return Err(XrefError::Start.into());
            }
            let entry = parse_classical_entry(bytes).ok_or(XrefError::Start)?;
            let object_number = (start + i) as u32;
            xref.insert(object_number, entry);
            input = nom::Slice::slice(input, 20.min(bytes.len())..);
        }
    }

    input = skip_space(input);
    let (input, _) = tag::<_, ParserInput, ()>("trailer")(input).map_err(|_| XrefError::Start)?;
    let input = skip_space(input);
    let (_, trailer) = dictionary(input).map_err(|_| XrefError::Start)?;

    if let Ok(size) = trailer.get(b"Size").and_then(|o| o.as_i64()) {
        if size < 0 || size > MAX_XREF_SIZE {
            return Err(XrefError::SizeTooLarge.into());
        }
        xref.size = size;
    }

    Ok((xref, trailer))
}

fn parse_classical_entry(bytes: &[u8]) -> Option<XrefEntry> {
    let offset_str = std::str::from_utf8(&bytes[0..10]).ok()?;
    let gen_str = std::str::from_utf8(&bytes[11..16]).ok()?;
    let kind = bytes[17];

    let offset: u64 = offset_str.trim().parse().ok()?;
    let generation: u16 = gen_str.trim().parse().ok()?;

    match kind {
        b'n' => Some(XrefEntry::Normal { offset, generation }),
        b'f' => {
            if offset == 0 && generation == 65535 {
                Some(XrefEntry::Free { generation })
            } else {
                Some(XrefEntry::UnusableFree)
            }
        }
        _ => None,
    }
}

fn xref_stream(input: ParserInput, reader: &Reader<'_>) -> Result<(Xref, Dictionary)> {
    let full = *input.fragment();
    let (id, obj) = indirect_object(input, 0, None, reader, &mut HashSet::new())?;
    let _ = full;
    let stream = obj.as_stream().map_err(|_| XrefError::Start)?;
    if !stream.dict.has_type(b"XRef") {
        log::warn!("object {} {} used as xref stream lacks /Type /XRef", id.0, id.1);
    }

    let widths = stream.dict.get(b"W").and_then(|o| o.as_array()).map_err(|_| XrefError::InvalidWidths)?;
    if widths.len() != 3 {
        return Err(XrefError::InvalidWidths.into());
    }
    let w: Vec<usize> = widths
        .iter()
        .map(|o| o.as_i64().unwrap_or(0).max(0) as usize)
        .collect();
    let record_len = w[0] + w[1] + w[2];
    if record_len == 0 {
        return Err(XrefError::InvalidWidths.into());
    }

    let size = stream.dict.get(b"Size").and_then(|o| o.as_i64()).map_err(|_| XrefError::InvalidWidths)?;
    if size < 0 || size > MAX_XREF_SIZE {
        return Err(XrefError::SizeTooLarge.into());
    }

    let index: Vec<(i64, i64)> = match stream.dict.get(b"Index").and_then(|o| o.as_array()) {
        Ok(items) => items
            .chunks(2)
            .filter_map(|pair| match pair {
                [a, b] => Some((a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0))),
                _ => None,
            })
            .collect(),
        Err(_) => vec![(0, size)],
    };

    let decoded = filters::decode(&stream.dict, &stream.content)?;
    let mut xref = Xref::new(size);
    let mut cursor = 0usize;

    for (start, count) in index {
        if start < 0 || count < 0 {
            continue;
        }
        for i in 0..count {
            if cursor + record_len > decoded.len() {
                break;
            }
            let record = &decoded[cursor..cursor + record_len];
            cursor += record_len;

            let field1 = read_field(&record[0..w[0]]).unwrap_or(1);
            let field2 = read_field(&record[w[0]..w[0] + w[1]]).unwrap_or(0);
            let field3 = read_field(&record[w[0] + w[1]..]).unwrap_or(0);

            let object_number = (start + i) as u32;
            let entry = match field1 {
                0 => XrefEntry::Free { generation: field3 as u16 },
                1 => XrefEntry::Normal { offset: field2, generation: field3 as u16 },
                2 => XrefEntry::Compressed { container: field2 as u32, index: field3 as u32 },
                _ => continue,
            };
            xref.insert(object_number, entry);
        }
    }

    let mut trailer = stream.dict.clone();
    trailer.remove(b"W");
    trailer.remove(b"Index");
    trailer.remove(b"Length");
    trailer.remove(b"Filter");
    trailer.remove(b"DecodeParms");

    Ok((xref, trailer))
}

fn read_field(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    Some(value)
}

/// Reads the numeric byte offset named by a `startxref` keyword.
pub fn xref_start(input: ParserInput) -> Option<i64> {
    let (input, _) = tag::<_, ParserInput, ()>("startxref").ok()?;
    let input = skip_space(input);
    match numeric(input).ok()?.1 {
        Object::Integer(n) => Some(n),
        Object::Real(f) => Some(f as i64),
        _ => None,
    }
}

/// Reads the `%PDF-x.y` header, returning the version string (e.g. `"1.7"`).
pub fn header(input: ParserInput) -> Option<String> {
    let (input, _) = tag::<_, ParserInput, ()>("%PDF-").ok()?;
    let (_, digits) =
        take_while_m_n::<_, ParserInput, ()>(3, 3, |b: u8| b.is_ascii_digit() || b == b'.')(input).ok()?;
    std::str::from_utf8(digits.fragment()).ok().map(str::to_string)
}

/// Reads the binary-marker comment line some writers emit right after the
/// header (`%` followed by four bytes >= 128), confirming the file is
/// genuinely binary rather than text-transferred.
pub fn binary_mark(input: ParserInput) -> Option<Vec<u8>> {
    let (input, _) = tag::<_, ParserInput, ()>("%").ok()?;
    let (_, bytes) = take_while_m_n::<_, ParserInput, ()>(4, 4, |_| true)(input).ok()?;
    Some(bytes.fragment().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pdf_header_version() {
        assert_eq!(header(ParserInput::new_extra(b"%PDF-1.7\n", "")), Some("1.7".to_string()));
    }

    #[test]
    fn parses_startxref_offset() {
        assert_eq!(xref_start(ParserInput::new_extra(b"startxref\n1234\n%%EOF", "")), Some(1234));
    }

    #[test]
    fn reads_big_endian_field() {
        assert_eq!(read_field(&[0x01, 0x02]), Some(0x0102));
        assert_eq!(read_field(&[]), None);
    }
}
