//! PDF object types.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;

/// Indirect object identifier: (object number, generation number).
pub type ObjectId = (u32, u16);

/// Dictionary with insertion order preserved, so rewritten files keep
/// the key order of the input.
pub type Dictionary = IndexMap<String, PDFObject>;

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font); each char holds one raw byte
    Name(String),
    /// String (byte array)
    String(Vec<u8>),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(Dictionary),
    /// Stream (dictionary + binary data)
    Stream(Box<PDFStream>),
    /// Indirect object reference
    Ref(PDFObjRef),
}

impl PDFObject {
    /// Build a name object.
    pub fn name(name: &str) -> Self {
        Self::Name(name.to_string())
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get as byte string
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as dictionary
    pub const fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_ref(&self) -> Result<&PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Dictionary of a dict or stream object.
    pub fn dict(&self) -> Option<&Dictionary> {
        match self {
            Self::Dict(d) => Some(d),
            Self::Stream(s) => Some(&s.attrs),
            _ => None,
        }
    }

    /// True for a dict or stream whose `/Type` is `type_name`.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.dict()
            .and_then(|d| d.get("Type"))
            .and_then(|t| t.as_name().ok())
            .is_some_and(|t| t == type_name)
    }

    /// Call `visit` on every reference nested in this object.
    pub fn for_each_ref(&self, visit: &mut impl FnMut(&PDFObjRef)) {
        match self {
            Self::Ref(r) => visit(r),
            Self::Array(items) => items.iter().for_each(|item| item.for_each_ref(visit)),
            Self::Dict(dict) => dict.values().for_each(|v| v.for_each_ref(visit)),
            Self::Stream(stream) => stream.attrs.values().for_each(|v| v.for_each_ref(visit)),
            _ => {}
        }
    }

    /// Get type name for error messages
    pub(crate) const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PDFObjRef {
    /// Object ID
    pub objid: u32,
    /// Generation number
    pub genno: u16,
}

impl PDFObjRef {
    /// Create a new object reference.
    pub const fn new(objid: u32, genno: u16) -> Self {
        Self { objid, genno }
    }

    pub const fn id(&self) -> ObjectId {
        (self.objid, self.genno)
    }
}

/// PDF Stream - dictionary attributes + raw (still filtered) data.
///
/// Filters are never applied here: the data is carried through untouched
/// apart from encryption, so rewritten files keep their compression.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    /// Stream dictionary attributes
    pub attrs: Dictionary,
    rawdata: Bytes,
}

impl PDFStream {
    /// Create a new stream.
    pub fn new(attrs: Dictionary, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
        }
    }

    /// Get raw (undecoded) data.
    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Replace the raw data.
    pub fn set_rawdata(&mut self, data: impl Into<Bytes>) {
        self.rawdata = data.into();
    }

    /// Get attribute by name.
    pub fn get(&self, name: &str) -> Option<&PDFObject> {
        self.attrs.get(name)
    }

    /// Names of the filters applied to this stream, in order.
    pub fn filters(&self) -> Vec<&str> {
        match self.get("Filter") {
            Some(PDFObject::Name(name)) => vec![name.as_str()],
            Some(PDFObject::Array(items)) => items.iter().filter_map(|f| f.as_name().ok()).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_each_ref_walks_nested_containers() {
        let mut inner = Dictionary::new();
        inner.insert("Kids".into(), PDFObject::Array(vec![PDFObject::Ref(PDFObjRef::new(3, 0))]));
        let mut attrs = Dictionary::new();
        attrs.insert("Parent".into(), PDFObject::Ref(PDFObjRef::new(2, 0)));
        attrs.insert("Inner".into(), PDFObject::Dict(inner));
        let obj = PDFObject::Stream(Box::new(PDFStream::new(attrs, Vec::new())));

        let mut seen = Vec::new();
        obj.for_each_ref(&mut |r| seen.push(r.id()));
        seen.sort();
        assert_eq!(seen, vec![(2, 0), (3, 0)]);
    }

    #[test]
    fn filters_accepts_name_or_array() {
        let mut attrs = Dictionary::new();
        attrs.insert("Filter".into(), PDFObject::name("FlateDecode"));
        assert_eq!(PDFStream::new(attrs, Vec::new()).filters(), vec!["FlateDecode"]);

        let mut attrs = Dictionary::new();
        attrs.insert(
            "Filter".into(),
            PDFObject::Array(vec![PDFObject::name("ASCII85Decode"), PDFObject::name("FlateDecode")]),
        );
        assert_eq!(PDFStream::new(attrs, Vec::new()).filters().len(), 2);
    }

    #[test]
    fn has_type_checks_dicts_and_streams() {
        let mut attrs = Dictionary::new();
        attrs.insert("Type".into(), PDFObject::name("XRef"));
        assert!(PDFObject::Stream(Box::new(PDFStream::new(attrs, Vec::new()))).has_type("XRef"));
        assert!(!PDFObject::Int(1).has_type("XRef"));
    }
}
