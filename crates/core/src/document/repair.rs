//! Cross-reference reconstruction for damaged files.
//!
//! Scans the whole file for `n g obj` headers and the last `trailer`
//! dictionary. Later definitions of the same object number win, matching
//! how incremental updates append newer versions.

use std::cell::OnceCell;
use std::sync::LazyLock;

use regex::bytes::Regex;

use super::xref::{XRefEntry, XRefTable};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, ObjectId, PDFObjRef, PDFObject};
use crate::parser::object_parser::ObjectParser;
use std::collections::BTreeMap;

static OBJ_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+(\d+)\s+obj\b").ok());

/// Object headers found by scanning, without a trailer.
fn scan_objects(data: &[u8]) -> Result<XRefTable> {
    let header = OBJ_HEADER
        .as_ref()
        .ok_or_else(|| PdfError::SyntaxError("object header pattern failed to compile".into()))?;
    let mut table = XRefTable::new();
    table.is_fallback = true;

    for cap in header.captures_iter(data) {
        let Some(whole) = cap.get(0) else { continue };
        // A digit right before the match means we matched inside a larger number.
        if whole.start() > 0 && data[whole.start() - 1].is_ascii_digit() {
            continue;
        }
        let objid = parse_ascii::<u32>(&cap[1]);
        let genno = parse_ascii::<u16>(&cap[2]);
        if let (Some(objid), Some(genno)) = (objid, genno)
            && objid != 0
        {
            table.entries.insert(
                objid,
                XRefEntry::InFile {
                    offset: whole.start(),
                    genno,
                },
            );
        }
    }

    if table.entries.is_empty() {
        return Err(PdfError::NoValidXRef);
    }
    tracing::debug!(objects = table.entries.len(), "rebuilt cross-reference table by scanning");
    Ok(table)
}

/// Results of the repair scan over one input, computed on first use and
/// shared by every attempt that opens the same bytes.
#[derive(Debug, Default)]
pub struct RepairScan {
    table: OnceCell<Option<XRefTable>>,
    trailer: OnceCell<Option<Dictionary>>,
}

impl RepairScan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scanned cross-reference table, with the recovered trailer.
    pub fn table(&self, data: &[u8]) -> Result<&XRefTable> {
        self.table
            .get_or_init(|| {
                let mut table = scan_objects(data).ok()?;
                if let Some(trailer) = self.trailer(data) {
                    table.trailer = trailer.clone();
                }
                Some(table)
            })
            .as_ref()
            .ok_or(PdfError::NoValidXRef)
    }

    /// The dictionary after the last `trailer` keyword that names a root.
    pub fn trailer(&self, data: &[u8]) -> Option<&Dictionary> {
        self.trailer.get_or_init(|| find_trailer(data)).as_ref()
    }

    /// Whether the object scan has run.
    pub fn is_scanned(&self) -> bool {
        self.table.get().is_some()
    }
}

fn parse_ascii<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse the dictionary after the last `trailer` keyword that has one.
///
/// Each candidate is parsed only up to the next `trailer` keyword, so the
/// whole search reads every byte at most twice.
pub fn find_trailer(data: &[u8]) -> Option<Dictionary> {
    let needle = b"trailer";
    let mut end = data.len();
    while let Some(pos) = data[..end].windows(needle.len()).rposition(|w| w == needle) {
        let mut parser = ObjectParser::at(&data[..end], pos + needle.len());
        if let Ok(PDFObject::Dict(dict)) = parser.parse_object()
            && dict.contains_key("Root")
        {
            return Some(dict);
        }
        end = pos;
    }
    None
}

/// Locate the document catalog among loaded objects when no trailer
/// names one. The highest-numbered catalog wins.
pub fn find_catalog(objects: &BTreeMap<ObjectId, PDFObject>) -> Option<PDFObjRef> {
    objects
        .iter()
        .rev()
        .find(|(_, obj)| obj.has_type("Catalog"))
        .map(|(&(objid, genno), _)| PDFObjRef::new(objid, genno))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_finds_objects_and_later_definitions_win() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n2 0 obj\n(a)\nendobj\n\
                     2 0 obj\n(b)\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF";
        let scan = RepairScan::new();
        let table = scan.table(data).unwrap();
        assert!(table.is_fallback);
        assert_eq!(table.entries.len(), 2);
        let XRefEntry::InFile { offset, .. } = table.entries[&2] else {
            panic!("expected in-file entry");
        };
        assert!(data[offset..].starts_with(b"2 0 obj\n(b)"));
        assert_eq!(table.trailer["Root"], PDFObject::Ref(PDFObjRef::new(1, 0)));
    }

    #[test]
    fn header_inside_larger_number_is_skipped() {
        let data = b"%PDF-1.4\n12 0 obj\nnull\nendobj\n";
        let table = scan_objects(data).unwrap();
        assert_eq!(table.entries.keys().copied().collect::<Vec<_>>(), [12]);
    }

    #[test]
    fn no_objects_is_error() {
        assert!(matches!(scan_objects(b"%PDF-1.4\ngarbage"), Err(PdfError::NoValidXRef)));
    }

    #[test]
    fn trailer_without_root_is_skipped() {
        let data = b"trailer << /Root 3 0 R >> trailer << /Size 1 >>";
        assert_eq!(find_trailer(data).unwrap()["Root"], PDFObject::Ref(PDFObjRef::new(3, 0)));
        assert!(find_trailer(b"no trailer here").is_none());
    }

    #[test]
    fn catalog_is_found_by_type() {
        let mut objects = BTreeMap::new();
        objects.insert((1, 0), PDFObject::Null);
        let mut cat = Dictionary::new();
        cat.insert("Type".into(), PDFObject::name("Catalog"));
        objects.insert((4, 0), PDFObject::Dict(cat));
        assert_eq!(find_catalog(&objects), Some(PDFObjRef::new(4, 0)));
    }

    #[test]
    fn unterminated_trailers_do_not_hide_an_earlier_one() {
        let mut data = b"trailer << /Root 5 0 R >>\n".to_vec();
        for _ in 0..20_000 {
            data.extend_from_slice(b"trailer<</a(");
        }
        assert_eq!(find_trailer(&data).unwrap()["Root"], PDFObject::Ref(PDFObjRef::new(5, 0)));
    }

    #[test]
    fn repair_scan_runs_once() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n";
        let scan = RepairScan::new();
        assert!(!scan.is_scanned());
        let first = scan.table(data).unwrap();
        assert!(scan.is_scanned());
        assert!(std::ptr::eq(first, scan.table(data).unwrap()));
        assert!(first.trailer.contains_key("Root"));
        assert!(matches!(RepairScan::new().table(b"%PDF-1.4\n"), Err(PdfError::NoValidXRef)));
    }
}
