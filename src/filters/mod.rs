//! Stream filter decoding (§4.E). The core only ever needs to read
//! already-written streams, so only the decode direction is implemented;
//! encoders are not provided since the writer side is out of scope.

mod predictor;

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::ParseError;
use crate::object::{Dictionary, Object};
use crate::Result;

/// A single named filter with its own decode parameters, as resolved from
/// a stream dictionary's (possibly array-valued) `Filter`/`DecodeParms`.
pub struct FilterStep<'a> {
    pub name: &'a [u8],
    pub parms: Option<&'a Dictionary>,
}

/// Resolves a stream dictionary's `Filter`/`DecodeParms` entries into an
/// ordered chain of filters to apply, normalizing the single-name and
/// array forms PDF allows for both.
pub fn resolve_chain<'a>(dict: &'a Dictionary) -> Result<Vec<FilterStep<'a>>> {
    let filter = match dict.get(b"Filter") {
        Ok(obj) => obj,
        Err(_) => return Ok(Vec::new()),
    };

    let names: Vec<&[u8]> = match filter {
        Object::Name(name) => vec![name.as_slice()],
        Object::Array(items) => items
            .iter()
            .filter_map(|o| o.as_name().ok())
            .collect(),
        _ => return Err(ParseError::MalformedSyntax.into()),
    };

    let parms = dict.get(b"DecodeParms").ok();
    let parms_list: Vec<Option<&Dictionary>> = match parms {
        Some(Object::Dictionary(d)) => vec![Some(d)],
        Some(Object::Array(items)) => items.iter().map(|o| o.as_dict().ok()).collect(),
        Some(Object::Null) | None => Vec::new(),
        _ => Vec::new(),
    };

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(i, name)| FilterStep {
            name,
            parms: parms_list.get(i).copied().flatten(),
        })
        .collect())
}

/// Decodes `content` through a stream dictionary's full filter chain.
/// Unsupported filters (image codecs, `CCITTFaxDecode`, `JBIG2Decode`,
/// `DCTDecode`, `JPXDecode` — all out of scope, §1) pass their input
/// through unchanged rather than failing the whole document load, matching
/// the tolerant posture of the rest of the reader.
pub fn decode(dict: &Dictionary, content: &[u8]) -> Result<Vec<u8>> {
    let chain = resolve_chain(dict)?;
    let mut data = content.to_vec();
    for step in chain {
        data = decode_one(step.name, step.parms, &data)?;
    }
    Ok(data)
}

fn decode_one(name: &[u8], parms: Option<&Dictionary>, data: &[u8]) -> Result<Vec<u8>> {
    match name {
        b"FlateDecode" | b"Fl" => {
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|_| ParseError::MalformedSyntax)?;
            predictor::apply(parms, out)
        }
        b"ASCIIHexDecode" | b"AHx" => Ok(decode_ascii_hex(data)),
        b"ASCII85Decode" | b"A85" => Ok(decode_ascii85(data)),
        b"RunLengthDecode" | b"RL" => Ok(decode_run_length(data)),
        b"Crypt" | b"Identity" => Ok(data.to_vec()),
        _ => Ok(data.to_vec()),
    }
}

fn decode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::new();
    for &b in data {
        if b == b'>' {
            break;
        }
        if let Some(v) = (b as char).to_digit(16) {
            nibbles.push(v as u8);
        }
    }
    nibbles
        .chunks(2)
        .map(|pair| if pair.len() == 2 { (pair[0] << 4) | pair[1] } else { pair[0] << 4 })
        .collect()
}

fn decode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut group_len = 0;
    let mut iter = data.iter().copied().peekable();

    while let Some(b) = iter.next() {
        if b == b'~' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        if b == b'z' && group_len == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        group[group_len] = b;
        group_len += 1;
        if group_len == 5 {
            out.extend_from_slice(&decode_ascii85_group(&group, 5));
            group_len = 0;
        }
    }

    if group_len > 0 {
        for slot in group.iter_mut().skip(group_len) {
            *slot = b'u';
        }
        let decoded = decode_ascii85_group(&group, group_len);
        out.extend_from_slice(&decoded[..group_len - 1]);
    }

    out
}

fn decode_ascii85_group(group: &[u8; 5], len: usize) -> [u8; 4] {
    let mut value: u32 = 0;
    for &b in group.iter() {
        value = value.wrapping_mul(85).wrapping_add((b - 33) as u32);
    }
    let bytes = value.to_be_bytes();
    let _ = len;
    bytes
}

fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let length = data[i];
        if length == 128 {
            break;
        } else if length < 128 {
            let count = length as usize + 1;
            if i + 1 + count > data.len() {
                break;
            }
            out.extend_from_slice(&data[i + 1..i + 1 + count]);
            i += 1 + count;
        } else {
            if i + 1 >= data.len() {
                break;
            }
            let repeat = 257 - length as usize;
            out.extend(std::iter::repeat(data[i + 1]).take(repeat));
            i += 2;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii_hex() {
        assert_eq!(decode_ascii_hex(b"48656c6c6f>"), b"Hello");
    }

    #[test]
    fn decodes_run_length() {
        let encoded = [2u8, b'a', b'b', b'c', 254, b'x', 128];
        assert_eq!(decode_run_length(&encoded), b"abcxx");
    }

    #[test]
    fn unsupported_filter_passes_through() {
        let mut dict = Dictionary::new();
        dict.set(b"Filter".to_vec(), Object::Name(b"DCTDecode".to_vec()));
        assert_eq!(decode(&dict, b"\xff\xd8raw").unwrap(), b"\xff\xd8raw");
    }
}
