//! Serializer: writes a [`ParsedDocument`] as a fresh PDF with a classic
//! cross-reference table, encrypting strings and streams when the
//! document carries a security handler.

use super::parsed::ParsedDocument;
use super::security::{SecurityLevel, StandardSecurityHandler};
use crate::error::Result;
use crate::model::objects::{Dictionary, ObjectId, PDFObjRef, PDFObject};
use crate::parser::lexer::name_to_bytes;

/// Serialize `doc`. Either the whole document is written or an error is
/// returned; no partially encrypted output is produced.
pub fn write_document(doc: &ParsedDocument) -> Result<Vec<u8>> {
    let handler = doc.handler();
    let mut out = Vec::new();
    let version = output_version(doc.version(), handler.map(StandardSecurityHandler::level));
    out.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets: Vec<(ObjectId, usize)> = Vec::with_capacity(doc.objects().len() + 1);
    for (&id, obj) in doc.objects() {
        let obj = match handler {
            Some(h) => encrypt_object(h, id, obj)?,
            None => obj.clone(),
        };
        offsets.push((id, out.len()));
        write_indirect(&mut out, id, &obj);
    }

    let mut next_objid = doc.objects().keys().next_back().map_or(1, |(objid, _)| objid + 1);
    // A direct /Info has no object key; encrypted output moves it into an
    // object of its own.
    let info = match (handler, doc.trailer().get("Info")) {
        (Some(h), Some(PDFObject::Dict(dict))) => {
            let id = (next_objid, 0);
            next_objid += 1;
            offsets.push((id, out.len()));
            write_indirect(&mut out, id, &PDFObject::Dict(encrypt_dict(h, id, dict)?));
            Some(PDFObject::Ref(PDFObjRef::new(id.0, id.1)))
        }
        (_, other) => other.cloned(),
    };
    let encrypt_ref = handler.map(|h| {
        let id = (next_objid, 0);
        offsets.push((id, out.len()));
        write_indirect(&mut out, id, &PDFObject::Dict(h.encrypt_dict().clone()));
        id
    });

    let size = offsets.iter().map(|((objid, _), _)| objid + 1).max().unwrap_or(1);
    let xref_pos = out.len();
    write_xref_table(&mut out, &offsets, size);

    let mut trailer = Dictionary::new();
    trailer.insert("Size".into(), PDFObject::Int(i64::from(size)));
    if let Some(root) = doc.trailer().get("Root") {
        trailer.insert("Root".into(), root.clone());
    }
    if let Some(info) = info {
        trailer.insert("Info".into(), info);
    }
    if let Some((objid, genno)) = encrypt_ref {
        trailer.insert("Encrypt".into(), PDFObject::Ref(PDFObjRef::new(objid, genno)));
    }
    let [id0, id1] = doc.file_id();
    trailer.insert(
        "ID".into(),
        PDFObject::Array(vec![PDFObject::String(id0.clone()), PDFObject::String(id1.clone())]),
    );

    out.extend_from_slice(b"trailer\n");
    write_object(&mut out, &PDFObject::Dict(trailer));
    out.extend_from_slice(format!("\nstartxref\n{xref_pos}\n%%EOF\n").as_bytes());
    Ok(out)
}

/// Writing a level may require a newer header than the input had.
fn output_version(version: &str, level: Option<SecurityLevel>) -> String {
    let required = match level {
        Some(SecurityLevel::Aes128) => "1.6",
        Some(SecurityLevel::Rc4_128) => "1.4",
        Some(SecurityLevel::Aes256) => "1.7",
        _ => "1.0",
    };
    let parse = |v: &str| -> (u32, u32) {
        let mut parts = v.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        (parts.next().unwrap_or(1), parts.next().unwrap_or(0))
    };
    if parse(version) >= parse(required) {
        version.to_string()
    } else {
        required.to_string()
    }
}

fn write_xref_table(out: &mut Vec<u8>, offsets: &[(ObjectId, usize)], size: u32) {
    let mut table = format!("xref\n0 {size}\n0000000000 65535 f \n");
    let mut by_objid = offsets.to_vec();
    by_objid.sort_unstable();
    let mut entries = by_objid.iter().peekable();
    for objid in 1..size {
        match entries.next_if(|((id, _), _)| *id == objid) {
            Some(((_, genno), offset)) => table.push_str(&format!("{offset:010} {genno:05} n \n")),
            None => table.push_str("0000000000 00000 f \n"),
        }
        // One entry per object number.
        while entries.next_if(|((id, _), _)| *id == objid).is_some() {}
    }
    out.extend_from_slice(table.as_bytes());
}

fn write_indirect(out: &mut Vec<u8>, (objid, genno): ObjectId, obj: &PDFObject) {
    out.extend_from_slice(format!("{objid} {genno} obj\n").as_bytes());
    write_object(out, obj);
    out.extend_from_slice(b"\nendobj\n");
}

/// Encrypt the strings and stream data of one indirect object.
fn encrypt_object(handler: &StandardSecurityHandler, id: ObjectId, obj: &PDFObject) -> Result<PDFObject> {
    Ok(match obj {
        PDFObject::String(data) => PDFObject::String(handler.encrypt_string(id, data)?),
        PDFObject::Array(items) => PDFObject::Array(
            items
                .iter()
                .map(|item| encrypt_object(handler, id, item))
                .collect::<Result<_>>()?,
        ),
        PDFObject::Dict(dict) => PDFObject::Dict(encrypt_dict(handler, id, dict)?),
        PDFObject::Stream(stream) => {
            let mut stream = stream.clone();
            let data = handler.encrypt_stream(id, stream.get_rawdata(), &stream.attrs)?;
            stream.attrs = encrypt_dict(handler, id, &stream.attrs)?;
            stream.set_rawdata(data);
            PDFObject::Stream(stream)
        }
        other => other.clone(),
    })
}

fn encrypt_dict(handler: &StandardSecurityHandler, id: ObjectId, dict: &Dictionary) -> Result<Dictionary> {
    dict.iter()
        .map(|(k, v)| Ok((k.clone(), encrypt_object(handler, id, v)?)))
        .collect()
}

/// Append the PDF syntax for `obj`.
pub fn write_object(out: &mut Vec<u8>, obj: &PDFObject) {
    match obj {
        PDFObject::Null => out.extend_from_slice(b"null"),
        PDFObject::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        PDFObject::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        PDFObject::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        PDFObject::Name(name) => write_name(out, name),
        PDFObject::String(s) => write_string(out, s),
        PDFObject::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        PDFObject::Dict(dict) => write_dict(out, dict),
        PDFObject::Stream(stream) => {
            let data = stream.get_rawdata();
            let mut attrs = stream.attrs.clone();
            attrs.insert("Length".into(), PDFObject::Int(data.len() as i64));
            write_dict(out, &attrs);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\nendstream");
        }
        PDFObject::Ref(r) => out.extend_from_slice(format!("{} {} R", r.objid, r.genno).as_bytes()),
    }
}

fn write_dict(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
    }
    out.extend_from_slice(b" >>");
}

fn format_real(r: f64) -> String {
    if !r.is_finite() {
        return "0".to_string();
    }
    if r.fract() == 0.0 && r.abs() < 1e15 {
        return format!("{}", r as i64);
    }
    // Display for f64 never uses exponent notation.
    let s = format!("{r:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() { "0".to_string() } else { s.to_string() }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for b in name_to_bytes(name) {
        let regular = (0x21..=0x7e).contains(&b)
            && !matches!(b, b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%');
        if regular {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

/// Printable text is written as a literal string, anything else as hex.
fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    let printable = s
        .iter()
        .all(|&b| (0x20..0x7f).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t'));
    if !printable {
        out.push(b'<');
        for b in s {
            out.extend_from_slice(format!("{b:02x}").as_bytes());
        }
        out.push(b'>');
        return;
    }
    out.push(b'(');
    for &b in s {
        match b {
            b'(' | b')' | b'\\' => out.extend_from_slice(&[b'\\', b]),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

/// Serialize one object to a byte vector.
pub fn to_pdf_bytes(obj: &PDFObject) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(&mut out, obj);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::object_parser::ObjectParser;

    fn reparse(obj: &PDFObject) -> PDFObject {
        ObjectParser::new(&to_pdf_bytes(obj)).parse_object().unwrap()
    }

    #[test]
    fn writes_scalars() {
        assert_eq!(to_pdf_bytes(&PDFObject::Real(0.5)), b"0.5");
        assert_eq!(to_pdf_bytes(&PDFObject::Real(-2.0)), b"-2");
        assert_eq!(to_pdf_bytes(&PDFObject::Real(1.0 / 3.0)), b"0.333333");
        assert_eq!(to_pdf_bytes(&PDFObject::Bool(false)), b"false");
    }

    #[test]
    fn names_are_escaped() {
        assert_eq!(to_pdf_bytes(&PDFObject::name("A B#")), b"/A#20B#23");
        let odd = PDFObject::name("caf\u{e9}");
        assert_eq!(to_pdf_bytes(&odd), b"/caf#E9");
        assert_eq!(reparse(&odd), odd);
    }

    #[test]
    fn strings_survive_reparse() {
        for s in [&b"plain (nested) \\ text"[..], b"\x00\xffbinary", b"line\nbreak"] {
            let obj = PDFObject::String(s.to_vec());
            assert_eq!(reparse(&obj), obj);
        }
    }

    #[test]
    fn stream_length_is_rewritten() {
        let mut attrs = Dictionary::new();
        attrs.insert("Length".into(), PDFObject::Int(999));
        let stream = crate::model::objects::PDFStream::new(attrs, b"abc".to_vec());
        let bytes = to_pdf_bytes(&PDFObject::Stream(Box::new(stream)));
        assert_eq!(bytes, b"<< /Length 3 >>\nstream\nabc\nendstream");
    }

    #[test]
    fn header_version_is_raised_for_aes() {
        assert_eq!(output_version("1.3", Some(SecurityLevel::Aes128)), "1.6");
        assert_eq!(output_version("1.7", Some(SecurityLevel::Aes128)), "1.7");
        assert_eq!(output_version("1.2", None), "1.2");
        assert_eq!(output_version("2.0", Some(SecurityLevel::Rc4_128)), "2.0");
    }
}
