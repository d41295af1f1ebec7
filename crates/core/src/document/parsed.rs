//! In-memory document model built from a byte buffer.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::permissions::Permissions;
use super::repair::{self, RepairScan};
use super::security::{PasswordRole, SecurityLevel, SecurityState, StandardSecurityHandler};
use super::writer;
use super::xref::{self, XRefEntry, XRefTable};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, ObjectId, PDFObjRef, PDFObject, PDFStream};
use crate::parser::object_parser::ObjectParser;
use crate::protection::policy::{AccessMode, OpenAttempt};

/// PDF file signature.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// A parsed PDF: its indirect objects, trailer and security.
///
/// Objects are held decrypted. Object and cross-reference streams are
/// expanded at load time, so every object here is written as a plain
/// indirect object.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    version: String,
    objects: BTreeMap<ObjectId, PDFObject>,
    trailer: Dictionary,
    /// First and second elements of `/ID`.
    file_id: [Vec<u8>; 2],
    security: SecurityState,
    /// Handler used when writing: the loaded one until security changes.
    handler: Option<StandardSecurityHandler>,
    attempt: OpenAttempt,
    repaired: bool,
}

impl ParsedDocument {
    /// Parse `data` under one access mode and read accuracy.
    ///
    /// Fails with a password error when the document is encrypted and
    /// `password` (empty when `None`) does not open it for `attempt.mode`.
    pub fn parse(data: &[u8], password: Option<&str>, attempt: OpenAttempt) -> Result<Self> {
        Self::parse_with_scan(data, password, attempt, &RepairScan::new())
    }

    /// [`parse`](Self::parse), reusing a repair scan of the same `data`
    /// made by an earlier attempt.
    pub fn parse_with_scan(
        data: &[u8],
        password: Option<&str>,
        attempt: OpenAttempt,
        scan: &RepairScan,
    ) -> Result<Self> {
        let version = read_header(data)?;
        let repair_allowed = attempt.allows_repair();

        let mut repaired = false;
        let xref = match xref::load_xref(data) {
            Ok(table) => table,
            Err(err) if !repair_allowed => return Err(err),
            Err(err) => {
                debug!(error = %err, "cross-reference data unusable, scanning file");
                repaired = true;
                scan.table(data)?.clone()
            }
        };

        let mut loader = Loader::new(data, !repair_allowed, xref, scan);
        let mut trailer = loader.xref.trailer.clone();
        if !trailer.contains_key("Root")
            && repair_allowed
            && let Some(found) = scan.trailer(data)
        {
            debug!("recovered trailer from last trailer keyword");
            repaired = true;
            for (key, value) in found {
                trailer.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let file_id = file_id(&trailer, data);
        let (handler, encrypt_id) = match trailer.shift_remove("Encrypt") {
            None => (None, None),
            Some(encrypt) => {
                let (dict, id) = loader.encrypt_dict(&encrypt)?;
                let handler = StandardSecurityHandler::open(&dict, &file_id[0], password.unwrap_or(""))?;
                if attempt.mode == AccessMode::Modify && handler.role() == PasswordRole::User {
                    return Err(PdfError::OwnerPasswordRequired);
                }
                (Some(handler), id)
            }
        };
        let security = match &handler {
            Some(h) => loaded_state(h, password.unwrap_or("")),
            None => SecurityState::none(),
        };

        let mut doc = Self {
            version,
            objects: BTreeMap::new(),
            trailer,
            file_id,
            security,
            handler,
            attempt,
            repaired,
        };
        if attempt.mode == AccessMode::InformationOnly {
            return Ok(doc);
        }

        doc.objects = loader.load_objects(doc.handler.as_ref(), encrypt_id)?;
        doc.repaired |= loader.repaired;
        doc.resolve_root(repair_allowed)?;
        doc.check_references(repair_allowed && attempt.mode != AccessMode::Modify)?;
        debug!(
            objects = doc.objects.len(),
            encrypted = doc.is_encrypted(),
            repaired = doc.repaired,
            "parsed document"
        );
        Ok(doc)
    }

    fn resolve_root(&mut self, repair_allowed: bool) -> Result<()> {
        let root_ok = self
            .trailer
            .get("Root")
            .and_then(|r| r.as_ref().ok())
            .and_then(|r| self.objects.get(&r.id()))
            .is_some_and(|obj| obj.as_dict().is_ok());
        if root_ok {
            return Ok(());
        }
        if repair_allowed && let Some(catalog) = repair::find_catalog(&self.objects) {
            debug!(objid = catalog.objid, "using catalog found by scanning objects");
            self.trailer.insert("Root".into(), PDFObject::Ref(catalog));
            self.repaired = true;
            return Ok(());
        }
        Err(PdfError::SyntaxError("trailer has no usable /Root catalog".into()))
    }

    /// Every reference reachable from the trailer must resolve. When
    /// `null_dangling` is set, unresolved references become `null`.
    fn check_references(&mut self, null_dangling: bool) -> Result<()> {
        let mut missing = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack: Vec<PDFObjRef> = Vec::new();
        for value in self.trailer.values() {
            value.for_each_ref(&mut |r| stack.push(*r));
        }
        while let Some(r) = stack.pop() {
            if !visited.insert(r.id()) {
                continue;
            }
            match self.objects.get(&r.id()) {
                Some(obj) => obj.for_each_ref(&mut |child| stack.push(*child)),
                None => {
                    missing.insert(r.id());
                }
            }
        }

        let Some(&(objid, genno)) = missing.first() else {
            return Ok(());
        };
        if !null_dangling {
            return Err(PdfError::ObjectNotFound(objid, genno));
        }
        debug!(count = missing.len(), "replacing dangling references with null");
        for obj in self.objects.values_mut() {
            null_refs(obj, &missing);
        }
        for value in self.trailer.values_mut() {
            null_refs(value, &missing);
        }
        self.repaired = true;
        Ok(())
    }

    /// Header version, e.g. `1.7`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub const fn objects(&self) -> &BTreeMap<ObjectId, PDFObject> {
        &self.objects
    }

    pub fn get(&self, id: ObjectId) -> Option<&PDFObject> {
        self.objects.get(&id)
    }

    /// Follow a reference; other objects are returned as-is.
    pub fn resolve<'a>(&'a self, obj: &'a PDFObject) -> Option<&'a PDFObject> {
        match obj {
            PDFObject::Ref(r) => self.objects.get(&r.id()),
            other => Some(other),
        }
    }

    /// The trailer, without `/Encrypt` and cross-reference bookkeeping.
    pub const fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn catalog(&self) -> Option<&Dictionary> {
        self.trailer
            .get("Root")
            .and_then(|root| self.resolve(root))
            .and_then(|obj| obj.as_dict().ok())
    }

    pub const fn file_id(&self) -> &[Vec<u8>; 2] {
        &self.file_id
    }

    pub const fn security(&self) -> &SecurityState {
        &self.security
    }

    pub const fn handler(&self) -> Option<&StandardSecurityHandler> {
        self.handler.as_ref()
    }

    pub const fn is_encrypted(&self) -> bool {
        self.security.is_encrypted()
    }

    pub const fn attempt(&self) -> OpenAttempt {
        self.attempt
    }

    /// Whether any repair was applied while parsing.
    pub const fn was_repaired(&self) -> bool {
        self.repaired
    }

    /// Replace the document's security with `state`.
    ///
    /// The handler is derived in full before anything is changed, so a
    /// failure leaves the document untouched.
    pub fn apply_security(&mut self, state: &SecurityState) -> Result<()> {
        if !state.is_encrypted() {
            self.clear_security();
            return Ok(());
        }
        let handler = StandardSecurityHandler::create(state, &self.file_id[0])?;
        self.handler = Some(handler);
        self.security = state.clone();
        Ok(())
    }

    /// Drop encryption; the document is written in the clear.
    pub fn clear_security(&mut self) {
        self.handler = None;
        self.security = SecurityState::none();
    }

    /// Serialize to a new byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        writer::write_document(self)
    }
}

fn read_header(data: &[u8]) -> Result<String> {
    if !data.starts_with(PDF_SIGNATURE) {
        return Err(PdfError::NotPdf);
    }
    let version: String = data[PDF_SIGNATURE.len()..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| char::from(b))
        .collect();
    Ok(if version.is_empty() {
        "1.4".to_string()
    } else {
        version
    })
}

/// `/ID` from the trailer, or one derived from the file contents.
fn file_id(trailer: &Dictionary, data: &[u8]) -> [Vec<u8>; 2] {
    let ids: Vec<Vec<u8>> = trailer
        .get("ID")
        .and_then(|id| id.as_array().ok())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o.as_string().ok().map(<[u8]>::to_vec))
                .collect()
        })
        .unwrap_or_default();
    match ids.as_slice() {
        [first, second, ..] => [first.clone(), second.clone()],
        [only] => [only.clone(), only.clone()],
        [] => {
            let digest = md5::compute(data).0.to_vec();
            [digest.clone(), digest]
        }
    }
}

fn loaded_state(handler: &StandardSecurityHandler, password: &str) -> SecurityState {
    let (user_password, owner_password) = match handler.role() {
        PasswordRole::Owner => (String::new(), password.to_string()),
        PasswordRole::User => (password.to_string(), String::new()),
    };
    SecurityState {
        level: handler.level(),
        user_password,
        owner_password,
        permissions: handler.permissions(),
    }
}

fn null_refs(obj: &mut PDFObject, missing: &BTreeSet<ObjectId>) {
    match obj {
        PDFObject::Ref(r) if missing.contains(&r.id()) => *obj = PDFObject::Null,
        PDFObject::Array(items) => items.iter_mut().for_each(|item| null_refs(item, missing)),
        PDFObject::Dict(dict) => dict.values_mut().for_each(|v| null_refs(v, missing)),
        PDFObject::Stream(stream) => stream.attrs.values_mut().for_each(|v| null_refs(v, missing)),
        _ => {}
    }
}

/// Reads indirect objects through a cross-reference table, falling back
/// to a scanned table when repair is allowed.
struct Loader<'a> {
    data: &'a [u8],
    strict: bool,
    xref: XRefTable,
    scan: &'a RepairScan,
    repaired: bool,
}

impl<'a> Loader<'a> {
    fn new(data: &'a [u8], strict: bool, xref: XRefTable, scan: &'a RepairScan) -> Self {
        Self {
            data,
            strict,
            xref,
            scan,
            repaired: false,
        }
    }

    /// Read the object `id` at `offset`, checking its header.
    fn read_at(&self, offset: usize, id: ObjectId) -> Result<PDFObject> {
        if offset >= self.data.len() {
            return Err(PdfError::SyntaxError(format!(
                "object {} {} offset {offset} is beyond end of file",
                id.0, id.1
            )));
        }
        let obj = ObjectParser::at(self.data, offset)
            .parse_indirect(self.strict, |r| self.stream_length(r))?;
        if obj.id != id {
            return Err(PdfError::SyntaxError(format!(
                "xref entry for {} {} points at object {} {}",
                id.0, id.1, obj.id.0, obj.id.1
            )));
        }
        Ok(obj.object)
    }

    /// Resolve an indirect `/Length`.
    fn stream_length(&self, r: &PDFObjRef) -> Option<i64> {
        let XRefEntry::InFile { offset, genno } = *self.xref.entries.get(&r.objid)? else {
            return None;
        };
        if genno != r.genno || offset >= self.data.len() {
            return None;
        }
        ObjectParser::at(self.data, offset)
            .parse_indirect(false, |_| None)
            .ok()?
            .object
            .as_int()
            .ok()
    }

    /// Load an object, retrying at its scanned position when allowed.
    fn load(&mut self, offset: usize, id: ObjectId) -> Result<PDFObject> {
        match self.read_at(offset, id) {
            Ok(obj) => Ok(obj),
            Err(err) if self.strict || self.xref.is_fallback => Err(err),
            Err(err) => {
                let retry = self.scan.table(self.data).ok().and_then(|t| match t.entries.get(&id.0) {
                    Some(XRefEntry::InFile { offset: o, .. }) if *o != offset => Some(*o),
                    _ => None,
                });
                let Some(scanned_offset) = retry else {
                    return Err(err);
                };
                debug!(objid = id.0, from = offset, to = scanned_offset, "object relocated by scan");
                self.repaired = true;
                // The scan knows the header but not the expected generation.
                let obj = ObjectParser::at(self.data, scanned_offset)
                    .parse_indirect(false, |r| self.stream_length(r))?;
                if obj.id.0 != id.0 {
                    return Err(err);
                }
                Ok(obj.object)
            }
        }
    }

    /// The `/Encrypt` dictionary, direct or indirect, never decrypted.
    fn encrypt_dict(&mut self, encrypt: &PDFObject) -> Result<(Dictionary, Option<ObjectId>)> {
        match encrypt {
            PDFObject::Dict(dict) => Ok((dict.clone(), None)),
            PDFObject::Ref(r) => match self.xref.entries.get(&r.objid).copied() {
                Some(XRefEntry::InFile { offset, .. }) => {
                    let obj = self.load(offset, r.id())?;
                    let dict = obj.as_dict().map_err(|_| {
                        PdfError::EncryptionError("/Encrypt is not a dictionary".into())
                    })?;
                    Ok((dict.clone(), Some(r.id())))
                }
                _ => Err(PdfError::EncryptionError(format!(
                    "/Encrypt object {} {} not found",
                    r.objid, r.genno
                ))),
            },
            other => Err(PdfError::EncryptionError(format!(
                "/Encrypt is a {}",
                other.type_name()
            ))),
        }
    }

    /// Load, decrypt and expand every object in the table.
    fn load_objects(
        &mut self,
        handler: Option<&StandardSecurityHandler>,
        encrypt_id: Option<ObjectId>,
    ) -> Result<BTreeMap<ObjectId, PDFObject>> {
        let mut objects = BTreeMap::new();
        let in_file: Vec<(ObjectId, usize)> = self
            .xref
            .entries
            .iter()
            .filter_map(|(&objid, entry)| match *entry {
                XRefEntry::InFile { offset, genno } => Some(((objid, genno), offset)),
                XRefEntry::InStream { .. } => None,
            })
            .collect();

        for (id, offset) in in_file {
            if Some(id) == encrypt_id {
                continue;
            }
            let obj = match self.load(offset, id) {
                Ok(obj) => obj,
                Err(err) if self.strict => return Err(err),
                Err(err) => {
                    debug!(objid = id.0, error = %err, "dropping unreadable object");
                    self.repaired = true;
                    continue;
                }
            };
            let obj = match handler {
                Some(handler) => match decrypt_object(handler, id, obj.clone()) {
                    Ok(decrypted) => decrypted,
                    Err(err) if self.strict => return Err(err),
                    Err(err) => {
                        debug!(objid = id.0, error = %err, "keeping object that failed to decrypt");
                        obj
                    }
                },
                None => obj,
            };
            objects.insert(id, obj);
        }

        self.expand_object_streams(&mut objects)?;
        objects.retain(|_, obj| !obj.has_type("XRef") && !obj.has_type("ObjStm"));
        Ok(objects)
    }

    /// Move the objects of every `/Type /ObjStm` stream into `objects`.
    fn expand_object_streams(&mut self, objects: &mut BTreeMap<ObjectId, PDFObject>) -> Result<()> {
        let streams: Vec<(ObjectId, PDFStream)> = objects
            .iter()
            .filter(|(_, obj)| obj.has_type("ObjStm"))
            .filter_map(|(&id, obj)| obj.as_stream().ok().map(|s| (id, s.clone())))
            .collect();

        for ((stream_objid, _), stream) in streams {
            let members = match parse_object_stream(&stream) {
                Ok(members) => members,
                Err(err) if self.strict => return Err(err),
                Err(err) => {
                    debug!(objid = stream_objid, error = %err, "skipping unreadable object stream");
                    self.repaired = true;
                    continue;
                }
            };
            for (objid, obj) in members {
                let wanted = match self.xref.entries.get(&objid) {
                    Some(XRefEntry::InStream { stream_objid: s, .. }) => *s == stream_objid,
                    None => self.xref.is_fallback,
                    Some(XRefEntry::InFile { .. }) => false,
                };
                if wanted {
                    objects.entry((objid, 0)).or_insert(obj);
                }
            }
        }
        Ok(())
    }
}

/// Parse the members of an object stream: `N` pairs of (objid, offset)
/// followed by objects starting at `First`.
fn parse_object_stream(stream: &PDFStream) -> Result<Vec<(u32, PDFObject)>> {
    let data = xref::decode_stream(stream)?;
    let int = |key: &str| -> Result<usize> {
        let n = stream
            .get(key)
            .ok_or_else(|| PdfError::SyntaxError(format!("missing {key} in ObjStm")))?
            .as_int()?;
        usize::try_from(n).map_err(|_| PdfError::SyntaxError(format!("negative {key} in ObjStm")))
    };
    let n = int("N")?;
    let first = int("First")?;
    if first > data.len() {
        return Err(PdfError::SyntaxError(format!(
            "ObjStm First {first} exceeds decoded length {}",
            data.len()
        )));
    }

    let mut header = ObjectParser::new(&data[..first]);
    let mut offsets: HashMap<u32, usize> = HashMap::with_capacity(n);
    let mut order = Vec::with_capacity(n);
    for _ in 0..n {
        let objid = header.parse_object()?.as_int()?;
        let offset = header.parse_object()?.as_int()?;
        let (Ok(objid), Ok(offset)) = (u32::try_from(objid), usize::try_from(offset)) else {
            return Err(PdfError::SyntaxError("ObjStm header entry out of range".into()));
        };
        offsets.insert(objid, first + offset);
        order.push(objid);
    }

    order
        .into_iter()
        .map(|objid| {
            let pos = offsets[&objid];
            let obj = ObjectParser::at(&data, pos).parse_object()?;
            Ok((objid, obj))
        })
        .collect()
}

/// Decrypt every string, and stream data, of one indirect object.
fn decrypt_object(handler: &StandardSecurityHandler, id: ObjectId, obj: PDFObject) -> Result<PDFObject> {
    Ok(match obj {
        PDFObject::String(data) => PDFObject::String(handler.decrypt_string(id, &data)?),
        PDFObject::Array(items) => PDFObject::Array(
            items
                .into_iter()
                .map(|item| decrypt_object(handler, id, item))
                .collect::<Result<_>>()?,
        ),
        PDFObject::Dict(dict) => PDFObject::Dict(decrypt_dict(handler, id, dict)?),
        PDFObject::Stream(mut stream) => {
            stream.attrs = decrypt_dict(handler, id, std::mem::take(&mut stream.attrs))?;
            let data = handler.decrypt_stream(id, stream.get_rawdata(), &stream.attrs)?;
            stream.set_rawdata(data);
            PDFObject::Stream(stream)
        }
        other => other,
    })
}

fn decrypt_dict(handler: &StandardSecurityHandler, id: ObjectId, dict: Dictionary) -> Result<Dictionary> {
    dict.into_iter()
        .map(|(k, v)| Ok((k, decrypt_object(handler, id, v)?)))
        .collect()
}

/// Permissions of a parsed document; all when unencrypted.
pub fn effective_permissions(doc: &ParsedDocument) -> Permissions {
    match doc.security().level {
        SecurityLevel::None => Permissions::all(),
        _ => doc.security().permissions,
    }
}
