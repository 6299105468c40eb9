//! Token-level parsing (§4.C): whitespace/delimiter classification, names,
//! numbers, and the two string forms.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{digit0, digit1, one_of};
use nom::combinator::{map, opt, recognize};
use nom::multi::many0_count;
use nom::sequence::{pair, preceded};
use nom::IResult;

use super::ParserInput;
use crate::object::StringFormat;

pub fn is_whitespace(b: u8) -> bool {
    matches!(b, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

pub fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

pub fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Skips whitespace and `%`-comments (to end of line), which may be
/// interleaved any number of times between tokens.
pub fn space(input: ParserInput) -> IResult<ParserInput, ()> {
    let (input, _) = many0_count(alt((
        map(take_while1(is_whitespace), |_| ()),
        map(comment, |_| ()),
    )))(input)?;
    Ok((input, ()))
}

fn comment(input: ParserInput) -> IResult<ParserInput, ParserInput> {
    let (input, _) = tag("%")(input)?;
    take_while(|b| b != b'\n' && b != b'\r')(input)
}

/// A PDF name, `/` followed by regular characters, with `#xx` hex escapes
/// (e.g. `/Name#20With#20Spaces`) resolved.
pub fn name(input: ParserInput) -> IResult<ParserInput, Vec<u8>> {
    let (input, _) = tag("/")(input)?;
    let (input, raw) = take_while(is_regular)(input)?;
    Ok((input, unescape_name(raw.fragment())))
}

fn unescape_name(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            if let Ok(hex) = std::str::from_utf8(&raw[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

/// An integer or real number. Per §7's recovery policy, a token that
/// cannot be parsed as a number (e.g. a lone `-` or `.`) falls back to
/// `0.0` rather than failing the whole document.
pub fn numeric(input: ParserInput) -> IResult<ParserInput, Object> {
    let (input, text) = recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(tag("."), digit0)))),
            recognize(pair(tag("."), digit1)),
        )),
    ))(input)?;

    let raw = std::str::from_utf8(text.fragment()).unwrap_or("0");
    let object = if raw.contains('.') {
        Object::Real(raw.parse().unwrap_or(0.0))
    } else {
        match raw.parse::<i64>() {
            Ok(v) => Object::Integer(v),
            Err(_) => Object::Real(raw.parse().unwrap_or(0.0)),
        }
    };
    Ok((input, object))
}

use crate::object::Object;

/// `true` / `false` keyword.
pub fn boolean(input: ParserInput) -> IResult<ParserInput, bool> {
    alt((map(tag("true"), |_| true), map(tag("false"), |_| false)))(input)
}

/// `null` keyword.
pub fn null(input: ParserInput) -> IResult<ParserInput, ()> {
    map(tag("null"), |_| ())(input)
}

/// Maximum nesting depth for literal-string parentheses (§4.C / §7).
pub const MAX_BRACKET: usize = 100;

/// A literal string `(...)`, with balanced-parenthesis nesting, `\`
/// escapes, and line-continuation backslash-newline handling.
pub fn literal_string(input: ParserInput) -> IResult<ParserInput, (Vec<u8>, StringFormat)> {
    let start = input;
    let (mut input, _) = tag("(")(start)?;
    let mut out = Vec::new();
    let mut depth: usize = 0;

    loop {
        let bytes = input.fragment();
        if bytes.is_empty() {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Eof,
            )));
        }
        let b = bytes[0];
        match b {
            b'(' => {
                depth += 1;
                if depth > MAX_BRACKET {
                    return Err(nom::Err::Error(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::TooLarge,
                    )));
                }
                out.push(b);
                input = advance(input, 1);
            }
            b')' => {
                if depth == 0 {
                    input = advance(input, 1);
                    break;
                }
                depth -= 1;
                out.push(b);
                input = advance(input, 1);
            }
            b'\\' => {
                input = advance(input, 1);
                let next = input.fragment();
                if next.is_empty() {
                    break;
                }
                match next[0] {
                    b'n' => {
                        out.push(b'\n');
                        input = advance(input, 1);
                    }
                    b'r' => {
                        out.push(b'\r');
                        input = advance(input, 1);
                    }
                    b't' => {
                        out.push(b'\t');
                        input = advance(input, 1);
                    }
                    b'b' => {
                        out.push(0x08);
                        input = advance(input, 1);
                    }
                    b'f' => {
                        out.push(0x0C);
                        input = advance(input, 1);
                    }
                    b'(' | b')' | b'\\' => {
                        out.push(next[0]);
                        input = advance(input, 1);
                    }
                    b'\n' => input = advance(input, 1),
                    b'\r' => {
                        input = advance(input, 1);
                        if input.fragment().first() == Some(&b'\n') {
                            input = advance(input, 1);
                        }
                    }
                    d if d.is_ascii_digit() => {
                        let mut value: u32 = 0;
                        let mut count = 0;
                        while count < 3 {
                            let f = input.fragment();
                            if f.is_empty() || !f[0].is_ascii_digit() || f[0] > b'7' {
                                break;
                            }
                            value = value * 8 + (f[0] - b'0') as u32;
                            input = advance(input, 1);
                            count += 1;
                        }
                        out.push(value as u8);
                    }
                    other => {
                        out.push(other);
                        input = advance(input, 1);
                    }
                }
            }
            _ => {
                out.push(b);
                input = advance(input, 1);
            }
        }
    }

    Ok((input, (out, StringFormat::Literal)))
}

fn advance(input: ParserInput, n: usize) -> ParserInput {
    nom::Slice::slice(input, n..)
}

/// A hexadecimal string `<...>`; an odd number of digits is padded with a
/// trailing zero nibble, per the spec.
pub fn hex_string(input: ParserInput) -> IResult<ParserInput, (Vec<u8>, StringFormat)> {
    let (input, _) = tag("<")(input)?;
    let (input, digits) = take_while(|b| b != b'>')(input)?;
    let (input, _) = tag(">")(input)?;

    let cleaned: Vec<u8> = digits
        .fragment()
        .iter()
        .copied()
        .filter(|b| b.is_ascii_hexdigit())
        .collect();

    let mut bytes = Vec::with_capacity(cleaned.len().div_ceil(2));
    let mut chunks = cleaned.chunks(2);
    for chunk in &mut chunks {
        let hi = (chunk[0] as char).to_digit(16).unwrap_or(0) as u8;
        let lo = if chunk.len() == 2 {
            (chunk[1] as char).to_digit(16).unwrap_or(0) as u8
        } else {
            0
        };
        bytes.push((hi << 4) | lo);
    }

    Ok((input, (bytes, StringFormat::Hexadecimal)))
}

pub fn string(input: ParserInput) -> IResult<ParserInput, (Vec<u8>, StringFormat)> {
    alt((literal_string, hex_string))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_falls_back_to_zero_on_lone_sign() {
        let result = numeric(ParserInput::new_extra(b"-", ""));
        assert!(result.is_err());
    }

    #[test]
    fn name_resolves_hex_escapes() {
        let (_, parsed) = name(ParserInput::new_extra(b"/A#20B", "")).unwrap();
        assert_eq!(parsed, b"A B");
    }

    #[test]
    fn hex_string_pads_odd_digit_count() {
        let (_, (bytes, _)) = hex_string(ParserInput::new_extra(b"<41 4>", "")).unwrap();
        assert_eq!(bytes, vec![0x41, 0x40]);
    }
}
