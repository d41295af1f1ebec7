//! Cross-reference loading: classic tables, cross-reference streams,
//! `/Prev` chains and hybrid `/XRefStm` sections.

use std::collections::{BTreeMap, HashSet};

use crate::codec::{inflate, inflate_lenient, png_unpredict};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, PDFObject, PDFStream};
use crate::parser::lexer::Lexer;
use crate::parser::object_parser::ObjectParser;

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Byte offset of `n g obj` in the file.
    InFile { offset: usize, genno: u16 },
    /// Index inside an object stream.
    InStream { stream_objid: u32, index: usize },
}

/// Merged cross-reference data of a file.
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    pub entries: BTreeMap<u32, XRefEntry>,
    pub trailer: Dictionary,
    /// Built by scanning the file instead of reading its tables.
    pub is_fallback: bool,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an older section: entries and trailer keys already present win.
    fn merge_older(&mut self, older: Self) {
        for (objid, entry) in older.entries {
            self.entries.entry(objid).or_insert(entry);
        }
        for (key, value) in older.trailer {
            self.trailer.entry(key).or_insert(value);
        }
    }
}

/// Trailer keys that only describe the cross-reference section itself.
const SECTION_KEYS: [&str; 9] = [
    "Type", "Length", "Filter", "DecodeParms", "W", "Index", "Prev", "XRefStm", "Size",
];

/// Find the `startxref` offset near the end of the file.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let needle = b"startxref";
    let search_start = data.len().saturating_sub(1024);
    let pos = data[search_start..]
        .windows(needle.len())
        .rposition(|w| w == needle)
        .map(|p| search_start + p)
        .ok_or(PdfError::NoValidXRef)?;

    let mut lexer = Lexer::at(data, pos + needle.len());
    lexer.skip_whitespace();
    let offset = lexer.read_uint().ok_or(PdfError::NoValidXRef)?;
    let offset = usize::try_from(offset).map_err(|_| PdfError::NoValidXRef)?;
    if offset >= data.len() {
        return Err(PdfError::SyntaxError(format!(
            "startxref offset {offset} is beyond end of file"
        )));
    }
    Ok(offset)
}

/// Load and merge every cross-reference section reachable from
/// `startxref`. Any malformed section is an error; repair is the
/// caller's decision.
pub fn load_xref(data: &[u8]) -> Result<XRefTable> {
    let mut table = XRefTable::new();
    let mut visited = HashSet::new();
    let mut next = Some(find_startxref(data)?);

    while let Some(pos) = next.take() {
        if !visited.insert(pos) {
            break;
        }
        let section = load_section_at(data, pos)?;

        // Hybrid files: the stream section sits between this table and /Prev.
        let xref_stm = offset_entry(&section.trailer, "XRefStm")?;
        next = offset_entry(&section.trailer, "Prev")?;
        table.merge_older(section);

        if let Some(stm_pos) = xref_stm
            && visited.insert(stm_pos)
        {
            let stm = load_section_at(data, stm_pos)?;
            for (objid, entry) in stm.entries {
                table.entries.entry(objid).or_insert(entry);
            }
        }
    }

    for key in SECTION_KEYS {
        table.trailer.shift_remove(key);
    }
    Ok(table)
}

fn offset_entry(trailer: &Dictionary, key: &str) -> Result<Option<usize>> {
    match trailer.get(key) {
        None => Ok(None),
        Some(PDFObject::Int(n)) => usize::try_from(*n)
            .map(Some)
            .map_err(|_| PdfError::SyntaxError(format!("negative /{key} offset {n}"))),
        Some(other) => Err(PdfError::SyntaxError(format!(
            "/{key} must be an integer, got {}",
            other.type_name()
        ))),
    }
}

fn load_section_at(data: &[u8], pos: usize) -> Result<XRefTable> {
    if pos >= data.len() {
        return Err(PdfError::SyntaxError(format!(
            "cross-reference offset {pos} is beyond end of file"
        )));
    }
    if data[pos..].starts_with(b"xref") {
        load_traditional_xref(data, pos)
    } else {
        load_xref_stream(data, pos)
    }
}

/// Load a classic `xref` table followed by its `trailer`.
fn load_traditional_xref(data: &[u8], pos: usize) -> Result<XRefTable> {
    let mut table = XRefTable::new();
    let mut lexer = Lexer::at(data, pos + b"xref".len());
    let bad = |at: usize, what: &str| PdfError::SyntaxError(format!("{what} at offset {at}"));

    loop {
        lexer.skip_whitespace();
        let here = lexer.tell();
        if data[here..].starts_with(b"trailer") {
            lexer.set_pos(here + b"trailer".len());
            break;
        }
        let start = lexer.read_uint().ok_or_else(|| bad(here, "expected subsection header"))?;
        lexer.skip_whitespace();
        let count = lexer
            .read_uint()
            .ok_or_else(|| bad(lexer.tell(), "expected subsection count"))?;

        for i in 0..count {
            lexer.skip_whitespace();
            let line = lexer.tell();
            let offset = lexer.read_uint().ok_or_else(|| bad(line, "malformed xref entry"))?;
            lexer.skip_whitespace();
            let genno = lexer.read_uint().ok_or_else(|| bad(line, "malformed xref entry"))?;
            lexer.skip_whitespace();
            let marker = data.get(lexer.tell()).copied();
            lexer.set_pos(lexer.tell() + 1);

            let objid = u32::try_from(start + i).map_err(|_| bad(line, "object number out of range"))?;
            match marker {
                Some(b'n') => {
                    let genno = u16::try_from(genno).map_err(|_| bad(line, "generation out of range"))?;
                    let offset = usize::try_from(offset).map_err(|_| bad(line, "offset out of range"))?;
                    if objid != 0 {
                        table.entries.insert(objid, XRefEntry::InFile { offset, genno });
                    }
                }
                Some(b'f') => {}
                _ => return Err(bad(line, "xref entry marker is neither 'n' nor 'f'")),
            }
        }
    }

    let mut parser = ObjectParser::at(data, lexer.tell());
    table.trailer = match parser.parse_object()? {
        PDFObject::Dict(dict) => dict,
        other => {
            return Err(PdfError::SyntaxError(format!(
                "trailer is a {}, not a dictionary",
                other.type_name()
            )));
        }
    };
    Ok(table)
}

/// Load a cross-reference stream (PDF 1.5+).
fn load_xref_stream(data: &[u8], pos: usize) -> Result<XRefTable> {
    let obj = ObjectParser::at(data, pos).parse_indirect(true, |_| None)?;
    let stream = obj.object.as_stream()?;
    if !obj.object.has_type("XRef") {
        return Err(PdfError::SyntaxError(format!(
            "object at offset {pos} is not a cross-reference stream"
        )));
    }

    let widths = stream
        .get("W")
        .ok_or_else(|| PdfError::SyntaxError("missing W in xref stream".into()))?
        .as_array()?
        .iter()
        .map(|w| w.as_int().map(|w| w.clamp(0, 8) as usize))
        .collect::<Result<Vec<_>>>()?;
    let [w0, w1, w2] = widths[..] else {
        return Err(PdfError::SyntaxError("W must have 3 elements".into()));
    };
    let entry_size = w0 + w1 + w2;
    if entry_size == 0 {
        return Err(PdfError::SyntaxError("xref stream entries are empty".into()));
    }

    let size = stream
        .get("Size")
        .ok_or_else(|| PdfError::SyntaxError("missing Size in xref stream".into()))?
        .as_int()?;

    // Get index (default is [0 Size])
    let index = match stream.get("Index") {
        Some(idx) => idx
            .as_array()?
            .chunks_exact(2)
            .map(|pair| Ok((pair[0].as_int()?, pair[1].as_int()?)))
            .collect::<Result<Vec<_>>>()?,
        None => vec![(0, size)],
    };

    let body = decode_stream(stream)?;
    let mut table = XRefTable::new();
    let mut rows = body.chunks_exact(entry_size);

    for (start, count) in index {
        for i in 0..count.max(0) {
            let Some(row) = rows.next() else {
                break;
            };
            let objid = start
                .checked_add(i)
                .ok_or_else(|| PdfError::SyntaxError(format!("xref stream Index start {start} overflows")))?;
            let Ok(objid) = u32::try_from(objid) else {
                continue;
            };
            // Type defaults to 1 when its field is absent.
            let kind = if w0 > 0 { read_be(&row[..w0]) } else { 1 };
            let field1 = read_be(&row[w0..w0 + w1]);
            let field2 = read_be(&row[w0 + w1..]);
            let out_of_range =
                |what: &str| PdfError::SyntaxError(format!("xref stream {what} for object {objid} out of range"));
            let entry = match kind {
                1 => XRefEntry::InFile {
                    offset: usize::try_from(field1).map_err(|_| out_of_range("offset"))?,
                    genno: u16::try_from(field2).unwrap_or(u16::MAX),
                },
                2 => XRefEntry::InStream {
                    stream_objid: u32::try_from(field1).map_err(|_| out_of_range("object stream number"))?,
                    index: usize::try_from(field2).map_err(|_| out_of_range("object stream index"))?,
                },
                _ => continue,
            };
            if objid != 0 {
                table.entries.insert(objid, entry);
            }
        }
    }

    table.trailer = stream.attrs.clone();
    Ok(table)
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

/// Apply a stream's filters. Only what object and cross-reference streams
/// use is supported: FlateDecode with optional PNG predictors.
pub(crate) fn decode_stream(stream: &PDFStream) -> Result<Vec<u8>> {
    let mut data = stream.get_rawdata().to_vec();
    let filters = stream.filters();
    let params = decode_parms(stream);

    for (i, filter) in filters.iter().enumerate() {
        data = match *filter {
            "FlateDecode" | "Fl" => {
                let decoded = inflate(&data).or_else(|err| {
                    let partial = inflate_lenient(&data);
                    if partial.is_empty() { Err(err) } else { Ok(partial) }
                })?;
                match params.get(i).copied().flatten() {
                    Some(parms) => unpredict(decoded, parms)?,
                    None => decoded,
                }
            }
            other => {
                return Err(PdfError::DecodeError(format!("unsupported filter {other}")));
            }
        };
    }
    Ok(data)
}

fn decode_parms(stream: &PDFStream) -> Vec<Option<&Dictionary>> {
    match stream.get("DecodeParms") {
        Some(PDFObject::Dict(d)) => vec![Some(d)],
        Some(PDFObject::Array(items)) => items.iter().map(PDFObject::dict).collect(),
        _ => Vec::new(),
    }
}

/// Widest predictor row accepted, in samples.
const MAX_PREDICTOR_COLUMNS: i64 = 1 << 20;

fn unpredict(data: Vec<u8>, parms: &Dictionary) -> Result<Vec<u8>> {
    let int = |key: &str, default: i64| {
        parms
            .get(key)
            .and_then(|v| v.as_int().ok())
            .unwrap_or(default)
    };
    let bounded = |key: &str, default: i64, max: i64| -> Result<usize> {
        let value = int(key, default);
        usize::try_from(value)
            .ok()
            .filter(|&v| v >= 1 && value <= max)
            .ok_or_else(|| PdfError::DecodeError(format!("{key} {value} out of range in DecodeParms")))
    };
    match int("Predictor", 1) {
        1 => Ok(data),
        p if p >= 10 => png_unpredict(
            &data,
            bounded("Columns", 1, MAX_PREDICTOR_COLUMNS)?,
            bounded("Colors", 1, 32)?,
            bounded("BitsPerComponent", 8, 16)?,
        ),
        p => Err(PdfError::DecodeError(format!("unsupported predictor {p}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn finds_last_startxref() {
        let data = b"%PDF-1.4\nstartxref\n1\n%%EOF\nxref\nstartxref\n27\n%%EOF\n";
        assert_eq!(find_startxref(data).unwrap(), 27);
    }

    #[test]
    fn startxref_beyond_eof_is_error() {
        assert!(find_startxref(b"%PDF-1.4\nstartxref\n9999\n%%EOF").is_err());
        assert!(matches!(find_startxref(b"%PDF-1.4\n"), Err(PdfError::NoValidXRef)));
    }

    #[test]
    fn reads_classic_table_and_trailer() {
        let body = b"%PDF-1.4\n";
        let xref_pos = body.len();
        let mut data = body.to_vec();
        data.extend_from_slice(
            b"xref\n0 3\n0000000000 65535 f \n0000000015 00000 n \n0000000079 00002 n \n\
              trailer\n<< /Size 3 /Root 1 0 R >>\n",
        );
        data.extend_from_slice(format!("startxref\n{xref_pos}\n%%EOF\n").as_bytes());

        let table = load_xref(&data).unwrap();
        assert_eq!(table.entries.len(), 2);
        assert_eq!(table.entries[&1], XRefEntry::InFile { offset: 15, genno: 0 });
        assert_eq!(table.entries[&2], XRefEntry::InFile { offset: 79, genno: 2 });
        assert!(table.trailer.contains_key("Root"));
        assert!(!table.trailer.contains_key("Size"));
    }

    #[test]
    fn garbled_entry_is_error() {
        let mut data = b"%PDF-1.4\n".to_vec();
        data.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n00000000xx 00000 n \ntrailer\n<< >>\n");
        data.extend_from_slice(b"startxref\n9\n%%EOF\n");
        assert!(load_xref(&data).is_err());
    }

    #[test]
    fn newer_section_wins_over_prev() {
        let mut data = b"%PDF-1.4\n".to_vec();
        let old = data.len();
        data.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n0000000100 00000 n \ntrailer\n<< /Root 1 0 R /Info 9 0 R >>\n");
        let new = data.len();
        data.extend_from_slice(
            format!("xref\n1 1\n0000000200 00000 n \ntrailer\n<< /Root 1 0 R /Prev {old} >>\n")
                .as_bytes(),
        );
        data.extend_from_slice(format!("startxref\n{new}\n%%EOF\n").as_bytes());

        let table = load_xref(&data).unwrap();
        assert_eq!(table.entries[&1], XRefEntry::InFile { offset: 200, genno: 0 });
        // Keys only present in the older trailer still come through.
        assert!(table.trailer.contains_key("Info"));
        assert!(!table.trailer.contains_key("Prev"));
    }

    #[test]
    fn reads_xref_stream_with_predictor() {
        // Three rows of W [1 2 1] with PNG "up" filtering.
        let rows: [[u8; 4]; 3] = [[0, 0, 0, 255], [1, 0, 15, 0], [2, 0, 5, 1]];
        let mut predicted = Vec::new();
        let mut prev = [0u8; 4];
        for row in rows {
            predicted.push(2);
            for (cur, above) in row.iter().zip(prev) {
                predicted.push(cur.wrapping_sub(above));
            }
            prev = row;
        }
        let compressed = deflate(&predicted);

        let mut data = b"%PDF-1.5\n".to_vec();
        let pos = data.len();
        data.extend_from_slice(
            format!(
                "9 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Root 1 0 R /Filter /FlateDecode \
                 /DecodeParms << /Predictor 12 /Columns 4 >> /Length {} >>\nstream\n",
                compressed.len()
            )
            .as_bytes(),
        );
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        data.extend_from_slice(format!("startxref\n{pos}\n%%EOF\n").as_bytes());

        let table = load_xref(&data).unwrap();
        assert_eq!(table.entries[&1], XRefEntry::InFile { offset: 15, genno: 0 });
        assert_eq!(table.entries[&2], XRefEntry::InStream { stream_objid: 5, index: 1 });
        assert!(table.trailer.contains_key("Root"));
        assert!(!table.trailer.contains_key("W"));
    }

    #[test]
    fn unsupported_filter_is_decode_error() {
        let mut attrs = Dictionary::new();
        attrs.insert("Filter".into(), PDFObject::name("LZWDecode"));
        let stream = PDFStream::new(attrs, b"data".to_vec());
        assert!(matches!(decode_stream(&stream), Err(PdfError::DecodeError(_))));
    }

    /// An xref stream with three unfiltered W [1 2 1] rows and the given extra keys.
    fn xref_stream_with(extra: &str) -> Vec<u8> {
        let body: [u8; 12] = [0, 0, 0, 255, 1, 0, 15, 0, 1, 0, 40, 0];
        let compressed = deflate(&body);
        let mut data = b"%PDF-1.5\n".to_vec();
        let pos = data.len();
        data.extend_from_slice(
            format!(
                "9 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Root 1 0 R /Filter /FlateDecode \
                 {extra} /Length {} >>\nstream\n",
                compressed.len()
            )
            .as_bytes(),
        );
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        data.extend_from_slice(format!("startxref\n{pos}\n%%EOF\n").as_bytes());
        data
    }

    #[test]
    fn huge_predictor_columns_are_rejected() {
        let data = xref_stream_with("/DecodeParms << /Predictor 12 /Columns 4611686018427387904 >>");
        assert!(matches!(load_xref(&data), Err(PdfError::DecodeError(_))));
        let data = xref_stream_with("/DecodeParms << /Predictor 12 /Columns 4 /Colors -3 >>");
        assert!(matches!(load_xref(&data), Err(PdfError::DecodeError(_))));
    }

    #[test]
    fn overflowing_index_start_is_syntax_error() {
        let data = xref_stream_with("/Index [9223372036854775807 2]");
        assert!(matches!(load_xref(&data), Err(PdfError::SyntaxError(_))));
        let table = load_xref(&xref_stream_with("/Index [0 3]")).unwrap();
        assert_eq!(table.entries[&2], XRefEntry::InFile { offset: 40, genno: 0 });
    }

    #[test]
    fn oversized_object_stream_number_is_rejected() {
        let body: [u8; 6] = [2, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let compressed = deflate(&body);
        let mut data = b"%PDF-1.5\n".to_vec();
        let pos = data.len();
        data.extend_from_slice(
            format!(
                "9 0 obj\n<< /Type /XRef /Size 2 /Index [1 1] /W [1 5 0] /Root 1 0 R \
                 /Filter /FlateDecode /Length {} >>\nstream\n",
                compressed.len()
            )
            .as_bytes(),
        );
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        data.extend_from_slice(format!("startxref\n{pos}\n%%EOF\n").as_bytes());
        assert!(matches!(load_xref(&data), Err(PdfError::SyntaxError(_))));
    }
}
