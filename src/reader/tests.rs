use super::*;
use crate::Document;

#[test]
#[should_panic(expected = "Xref(Start)")]
fn load_short_document() {
    let _doc = Document::load_mem(b"%PDF-1.5\n%%EOF\n").unwrap();
}

fn minimal_pdf_with_stream_content(content: &str) -> String {
    const STREAM_CRUFT: usize = 33;
    let doc = format!(
        "%PDF-1.5
1 0 obj<</Type/Pages/Kids[5 0 R]/Count 1/Resources 3 0 R/MediaBox[0 0 595 842]>>endobj
2 0 obj<</Type/Font/Subtype/Type1/BaseFont/Courier>>endobj
3 0 obj<</Font<</F1 2 0 R>>>>endobj
5 0 obj<</Type/Page/Parent 1 0 R/Contents[4 0 R]>>endobj
6 0 obj<</Type/Catalog/Pages 1 0 R>>endobj
4 0 obj<</Length {}>>stream
BT
/F1 48 Tf
100 600 Td
({}) Tj
ET
endstream endobj\n",
        content.len() + STREAM_CRUFT,
        content
    );
    format!(
        "{}xref\n0 7\n0000000000 65535 f \n0000000009 00000 n \n0000000096 00000 n \n0000000155 00000 n \n0000000291 00000 n \n0000000191 00000 n \n0000000248 00000 n \ntrailer\n<</Root 6 0 R/Size 7>>\nstartxref\n{}\n%%EOF",
        doc,
        doc.len()
    )
}

#[test]
fn load_many_shallow_brackets() {
    let content: String = std::iter::repeat("()").take(MAX_BRACKET * 10).flat_map(|x| x.chars()).collect();
    let doc = minimal_pdf_with_stream_content(&content);
    let _doc = Document::load_mem(doc.as_bytes()).unwrap();
}

#[test]
fn load_too_deep_brackets() {
    let content: Vec<u8> = std::iter::repeat(b'(')
        .take(MAX_BRACKET + 1)
        .chain(std::iter::repeat(b')').take(MAX_BRACKET + 1))
        .collect();
    let content = String::from_utf8(content).unwrap();
    let doc = minimal_pdf_with_stream_content(&content);

    let doc = Document::load_mem(doc.as_bytes()).unwrap();
    let page = doc.get_object((5, 0)).unwrap();
    assert_eq!(page.as_dict().unwrap().get_type().unwrap(), b"Page");
}

#[test]
fn search_substring_finds_last_occurrence() {
    assert_eq!(Reader::search_substring(b"hello world", b"xyz", 0), None);
    assert_eq!(Reader::search_substring(b"hello world", b"world", 0), Some(6));

    let buffer = b"%%EOF\ntest%%EOF\nend";
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 0), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 6), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 15), None);
    assert_eq!(Reader::search_substring(b"%%EOF", b"%%EOF", 0), Some(0));

    let buffer_with_many_percents = b"%%%PDF-1.3%%%comment%%%more%%EOF";
    assert_eq!(
        Reader::search_substring(buffer_with_many_percents, b"%%EOF", 0),
        Some(27)
    );
}

#[test]
fn load_document_reads_trailer_root() {
    let content: String = "hi".repeat(4);
    let doc = minimal_pdf_with_stream_content(&content);
    let doc = Document::load_mem(doc.as_bytes()).unwrap();
    assert_eq!(doc.version, "1.5");
    let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    assert_eq!(root, (6, 0));
}

#[test]
fn inspect_tallies_type_and_subtype_names() {
    let content: String = "hi".repeat(4);
    let doc = minimal_pdf_with_stream_content(&content);
    let doc = Document::load_mem(doc.as_bytes()).unwrap();
    let tally = doc.inspect();
    assert_eq!(tally.get("Page"), Some(&1));
    assert_eq!(tally.get("Pages"), Some(&1));
    assert_eq!(tally.get("Catalog"), Some(&1));
    assert_eq!(tally.get("Type1"), Some(&1));
}

#[test]
fn self_heals_from_swapped_xref_offsets_via_rebuild() {
    let mut doc = "%PDF-1.5\n".to_string();
    let off1 = doc.len();
    doc.push_str("1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n");
    let off2 = doc.len();
    doc.push_str("2 0 obj<</Type/Pages/Kids[]/Count 0>>endobj\n");
    let xref_start = doc.len();
    // Offsets deliberately swapped: the entry for object 1 points at object
    // 2's header and vice versa, forcing an object-number mismatch that only
    // a top-down rebuild can resolve.
    doc.push_str(&format!(
        "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<</Root 1 0 R/Size 3>>\nstartxref\n{}\n%%EOF",
        off2, off1, xref_start
    ));

    let loaded = Document::load_mem(doc.as_bytes()).unwrap();
    let catalog = loaded.get_object((1, 0)).unwrap();
    assert_eq!(catalog.as_dict().unwrap().get_type().unwrap(), b"Catalog");
    let pages = loaded.get_object((2, 0)).unwrap();
    assert_eq!(pages.as_dict().unwrap().get_type().unwrap(), b"Pages");
}

#[test]
fn locates_xref_by_scanning_when_startxref_is_out_of_range() {
    let content: String = "hi".repeat(4);
    let good = minimal_pdf_with_stream_content(&content);
    let marker = "startxref\n";
    let pos = good.find(marker).unwrap() + marker.len();
    let newline = good[pos..].find('\n').unwrap();
    let mut corrupted = good.clone();
    corrupted.replace_range(pos..pos + newline, "999999999");

    let doc = Document::load_mem(corrupted.as_bytes()).unwrap();
    assert_eq!(doc.version, "1.5");
    let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    assert_eq!(root, (6, 0));
}

#[test]
fn corrects_stream_length_downward_when_it_overruns_the_next_object() {
    let mut doc = "%PDF-1.5\n".to_string();
    let obj1_offset = doc.len();
    // A Length wildly larger than anything that fits before the next
    // object; the correct length (10, matching "abcdefghij") must be
    // recovered from object 2's xref offset.
    doc.push_str("1 0 obj<</Length 9999>>stream\nabcdefghijendstream\nendobj\n");
    let obj2_offset = doc.len();
    doc.push_str("2 0 obj<</Type/Catalog>>endobj\n");
    let xref_start = doc.len();
    doc.push_str(&format!(
        "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<</Root 2 0 R/Size 3>>\nstartxref\n{}\n%%EOF",
        obj1_offset, obj2_offset, xref_start
    ));

    let loaded = Document::load_mem(doc.as_bytes()).unwrap();
    let obj = loaded.get_object((1, 0)).unwrap();
    let stream = obj.as_stream().unwrap();
    assert_eq!(stream.content, b"abcdefghij");
}

#[test]
fn loads_from_a_real_file_on_disk() {
    use std::io::Write;

    let content: String = "hi".repeat(4);
    let pdf = minimal_pdf_with_stream_content(&content);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(pdf.as_bytes()).unwrap();

    let doc = Document::load(file.path()).unwrap();
    assert_eq!(doc.version, "1.5");
    assert_eq!(doc.trailer.get(b"Root").unwrap().as_reference().unwrap(), (6, 0));
}
