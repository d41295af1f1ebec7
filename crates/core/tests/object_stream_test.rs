//! PDF 1.5 files: objects packed in an object stream, indexed by a
//! predictor-encoded cross-reference stream.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use pdfseal_core::model::PDFObject;
use pdfseal_core::{
    AccessMode, ErrorKind, OpenOptions, ParsedDocument, ReadAccuracy, detect_protection, open_document,
    remove_password, set_password,
};

const CONTENT: &[u8] = b"BT /F1 10 Tf 20 20 Td (packed) Tj ET";

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("deflate");
    enc.finish().expect("deflate")
}

/// Catalog (1), content (4), object stream (5) holding the page tree (2),
/// the page (3) and the Info dictionary (7), and the xref stream (6).
/// `xref_extra` overrides keys of the xref stream dictionary.
fn build_objstm_pdf(xref_extra: &str) -> Vec<u8> {
    let members = [
        (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
        (3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 300] /Contents 4 0 R >>"),
        (7, "<< /Title (Packed objects) /Producer (pdfseal tests) >>"),
    ];
    let mut header = String::new();
    let mut body = String::new();
    for (objid, text) in members {
        header.push_str(&format!("{objid} {} ", body.len()));
        body.push_str(text);
        body.push('\n');
    }
    let packed = deflate(format!("{header}{body}").as_bytes());

    let mut out = b"%PDF-1.5\n".to_vec();
    let mut offsets = [0usize; 8];

    offsets[1] = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    offsets[4] = out.len();
    out.extend_from_slice(format!("4 0 obj\n<< /Length {} >>\nstream\n", CONTENT.len()).as_bytes());
    out.extend_from_slice(CONTENT);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    offsets[5] = out.len();
    out.extend_from_slice(
        format!(
            "5 0 obj\n<< /Type /ObjStm /N {} /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
            members.len(),
            header.len(),
            packed.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&packed);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    offsets[6] = out.len();

    // W [1 4 2]: type, offset or stream number, generation or index.
    let row = |kind: u8, field1: u32, field2: u16| -> [u8; 7] {
        let [a, b, c, d] = field1.to_be_bytes();
        let [e, f] = field2.to_be_bytes();
        [kind, a, b, c, d, e, f]
    };
    let as_u32 = |offset: usize| u32::try_from(offset).expect("small file");
    let rows = [
        row(0, 0, 65535),
        row(1, as_u32(offsets[1]), 0),
        row(2, 5, 0),
        row(2, 5, 1),
        row(1, as_u32(offsets[4]), 0),
        row(1, as_u32(offsets[5]), 0),
        row(1, as_u32(offsets[6]), 0),
        row(2, 5, 2),
    ];
    // PNG "up" filter on every row.
    let mut predicted = Vec::new();
    let mut prev = [0u8; 7];
    for current in rows {
        predicted.push(2);
        predicted.extend(current.iter().zip(prev).map(|(cur, above)| cur.wrapping_sub(above)));
        prev = current;
    }
    let xref_data = deflate(&predicted);

    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 8 /W [1 4 2] /Root 1 0 R /Info 7 0 R /Filter /FlateDecode \
             /DecodeParms << /Predictor 12 /Columns 7 >> {xref_extra} /Length {} >>\nstream\n",
            xref_data.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&xref_data);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", offsets[6]).as_bytes());
    out
}

fn strict_modify() -> OpenOptions {
    OpenOptions::new().mode(AccessMode::Modify).accuracy(ReadAccuracy::Strict)
}

fn title_of(doc: &ParsedDocument) -> Option<Vec<u8>> {
    let info = doc.resolve(doc.trailer().get("Info")?)?.dict()?;
    match info.get("Title")? {
        PDFObject::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn assert_packed_objects(doc: &ParsedDocument) {
    let pages = doc.get((2, 0)).and_then(PDFObject::dict).expect("page tree");
    assert_eq!(pages.get("Count"), Some(&PDFObject::Int(1)));
    assert!(doc.get((3, 0)).is_some_and(|page| page.has_type("Page")));
    assert_eq!(title_of(doc).as_deref(), Some(&b"Packed objects"[..]));
}

#[test]
fn object_stream_members_load_strictly() {
    let doc = open_document(&build_objstm_pdf(""), &strict_modify()).expect("strict open");
    assert!(!doc.was_repaired());
    assert_packed_objects(&doc);
    // Container streams are not kept as objects.
    assert!(doc.get((5, 0)).is_none());
    assert!(doc.get((6, 0)).is_none());
}

#[test]
fn object_stream_members_survive_lock_and_unlock() {
    let original = build_objstm_pdf("");
    let locked = set_password(&original, "u", Some("o")).expect("lock");
    assert!(detect_protection(&locked).expect("detect").view_protected);
    let doc = open_document(&locked, &OpenOptions::new().password("u")).expect("open locked");
    assert_packed_objects(&doc);

    let unlocked = remove_password(&locked, "o").expect("unlock");
    let doc = open_document(&unlocked, &strict_modify()).expect("open unlocked");
    assert_packed_objects(&doc);
    let content = doc.get((4, 0)).and_then(|obj| obj.as_stream().ok()).expect("content");
    assert_eq!(content.get_rawdata(), CONTENT);
}

#[test]
fn huge_predictor_columns_are_structural_errors() {
    let data = build_objstm_pdf("/DecodeParms << /Predictor 12 /Columns 4611686018427387904 >>");
    let err = detect_protection(&data).expect_err("xref stream cannot be decoded");
    assert_eq!(err.kind(), ErrorKind::Structural);

    let doc = open_document(&data, &OpenOptions::new().mode(AccessMode::ReadOnly)).expect("scan recovers");
    assert!(doc.was_repaired());
    assert!(doc.get((2, 0)).is_some());
}

#[test]
fn overflowing_xref_index_is_structural_error() {
    let data = build_objstm_pdf("/Index [9223372036854775807 2]");
    let err = detect_protection(&data).expect_err("index overflows");
    assert_eq!(err.kind(), ErrorKind::Structural);
    let err = open_document(&data, &strict_modify()).expect_err("index overflows");
    assert_eq!(err.kind(), ErrorKind::Structural);
}
