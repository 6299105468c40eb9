//! PDFDocEncoding (ISO 32000-1 Annex D) and UTF-16BE helpers for PDF text
//! strings. Used by the password algorithms (which operate on
//! PDFDocEncoding-converted passwords) and by string objects whose content is
//! one of the two PDF text-string encodings.

/// `PDF_DOC_ENCODING[byte as usize]` gives the Unicode scalar value a byte
/// represents under PDFDocEncoding. Deviates from Latin-1 in the 0x18-0x1F
/// and 0x80-0x9F ranges, per Annex D.2.
pub const PDF_DOC_ENCODING: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u32;
        i += 1;
    }

    // 0x18-0x1F: spacing modifier letters, not C0 controls, under PDFDocEncoding.
    table[0x18] = 0x02D8; // breve
    table[0x19] = 0x02C7; // caron
    table[0x1A] = 0x02C6; // circumflex
    table[0x1B] = 0x02D9; // dot above
    table[0x1C] = 0x02DD; // double acute (hungarumlaut)
    table[0x1D] = 0x02DB; // ogonek
    table[0x1E] = 0x02DA; // ring
    table[0x1F] = 0x02DC; // small tilde

    // 0x80-0x9F: typographic punctuation and a handful of Latin Extended-A letters.
    table[0x80] = 0x2022; // bullet
    table[0x81] = 0x2020; // dagger
    table[0x82] = 0x2021; // double dagger
    table[0x83] = 0x2026; // ellipsis
    table[0x84] = 0x2014; // em dash
    table[0x85] = 0x2013; // en dash
    table[0x86] = 0x0192; // florin
    table[0x87] = 0x2044; // fraction slash
    table[0x88] = 0x2039; // single left angle quote
    table[0x89] = 0x203A; // single right angle quote
    table[0x8A] = 0x2212; // minus
    table[0x8B] = 0x2030; // per mille
    table[0x8C] = 0x201E; // double low quote
    table[0x8D] = 0x201C; // left double quote
    table[0x8E] = 0x201D; // right double quote
    table[0x8F] = 0x2018; // left single quote
    table[0x90] = 0x2019; // right single quote
    table[0x91] = 0x201A; // single low quote
    table[0x92] = 0x2122; // trademark
    table[0x93] = 0xFB01; // fi ligature
    table[0x94] = 0xFB02; // fl ligature
    table[0x95] = 0x0141; // Lslash
    table[0x96] = 0x0152; // OE
    table[0x97] = 0x0160; // Scaron
    table[0x98] = 0x0178; // Ydieresis
    table[0x99] = 0x017D; // Zcaron
    table[0x9A] = 0x0131; // dotlessi
    table[0x9B] = 0x0142; // lslash
    table[0x9C] = 0x0153; // oe
    table[0x9D] = 0x0161; // scaron
    table[0x9E] = 0x017E; // zcaron
    table[0x9F] = 0xFFFD; // undefined in Annex D

    table[0xA0] = 0x20AC; // euro sign

    table
}

/// Decodes raw bytes from a PDF text string using PDFDocEncoding.
pub fn decode_pdf_doc(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter_map(|&b| char::from_u32(PDF_DOC_ENCODING[b as usize]))
        .collect()
}

/// Encodes a Rust string to PDFDocEncoding bytes. Characters with no
/// PDFDocEncoding representation are dropped (tolerant, matching the
/// lexer's posture toward malformed input elsewhere in the core).
pub fn string_to_bytes(table: &[u32; 256], s: &str) -> Vec<u8> {
    s.chars()
        .filter_map(|c| {
            let code = c as u32;
            table.iter().position(|&v| v == code).map(|b| b as u8)
        })
        .collect()
}

const UTF16BE_BOM: [u8; 2] = [0xFE, 0xFF];

/// Decodes a PDF text string that may carry a UTF-16BE byte-order mark. If no
/// BOM is present the bytes are treated as PDFDocEncoding instead, matching
/// the two text-string encodings PDF recognizes.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0..2] == UTF16BE_BOM {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        decode_pdf_doc(bytes)
    }
}

/// Encodes a Rust string as a UTF-16BE PDF text string, BOM-prefixed.
pub fn encode_utf16be(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + s.len() * 2);
    out.extend_from_slice(&UTF16BE_BOM);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_doc_encoding_decodes_latin_extended_bytes() {
        let bytes = b"Ger\xfer\xfa\xf0ur";
        assert_eq!(decode_pdf_doc(bytes), "Gerþrúður");
    }

    #[test]
    fn utf16be_round_trips_through_bom() {
        let encoded = encode_utf16be("漢字");
        assert_eq!(&encoded[..2], &UTF16BE_BOM);
        assert_eq!(decode_text_string(&encoded), "漢字");
    }
}
