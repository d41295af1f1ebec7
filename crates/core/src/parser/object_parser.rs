//! PDF object parser - converts tokens to PDF objects.
//!
//! Handles `n g R` references with a small lookahead buffer and reads
//! indirect object headers (`n g obj`) plus stream extents.

use super::lexer::{Keyword, Lexer, Token};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, ObjectId, PDFObjRef, PDFObject, PDFStream};

/// Nesting limit for arrays and dictionaries.
const MAX_DEPTH: usize = 256;

/// How the extent of a stream body was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExtent {
    /// `/Length` was present and landed on `endstream`.
    Declared,
    /// `/Length` was missing or wrong; the body was found by scanning.
    Scanned,
}

/// An indirect object read from its `n g obj` header.
#[derive(Debug)]
pub struct IndirectObject {
    pub id: ObjectId,
    pub object: PDFObject,
    pub extent: Option<StreamExtent>,
}

/// PDF Parser - parses PDF object syntax on top of [`Lexer`].
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    /// Lookahead buffer for tokens, with their start positions
    lookahead: Vec<(usize, Token)>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            lookahead: Vec::new(),
        }
    }

    /// Position of the next unconsumed token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .last()
            .map_or_else(|| self.lexer.tell(), |(pos, _)| *pos)
    }

    /// Get next token (from lookahead or lexer)
    pub fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token().transpose()
    }

    /// Push token back to lookahead
    fn push_back(&mut self, tok: (usize, Token)) {
        self.lookahead.push(tok);
    }

    /// Parse next PDF object
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, depth: usize) -> Result<PDFObject> {
        let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(token, depth)
    }

    /// Convert a token to a PDF object
    fn token_to_object(&mut self, (pos, token): (usize, Token), depth: usize) -> Result<PDFObject> {
        if depth > MAX_DEPTH {
            return Err(PdfError::SyntaxError(format!(
                "objects nested deeper than {MAX_DEPTH} at offset {pos}"
            )));
        }
        match token {
            Token::Int(n) => {
                // Could be start of indirect reference: objid genno R
                if let Some(r) = self.try_reference(n)? {
                    return Ok(PDFObject::Ref(r));
                }
                Ok(PDFObject::Int(n))
            }
            Token::Real(n) => Ok(PDFObject::Real(n)),
            Token::Bool(b) => Ok(PDFObject::Bool(b)),
            Token::Name(s) => Ok(PDFObject::Name(s)),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::Keyword(Keyword::Null) => Ok(PDFObject::Null),
            Token::Keyword(Keyword::ArrayStart) => self.parse_array(depth),
            Token::Keyword(Keyword::DictStart) => self.parse_dict(depth).map(PDFObject::Dict),
            Token::Keyword(kw) => Err(PdfError::TokenError {
                pos,
                msg: format!("unexpected keyword: {}", String::from_utf8_lossy(kw.as_bytes())),
            }),
        }
    }

    fn try_reference(&mut self, objid: i64) -> Result<Option<PDFObjRef>> {
        let Some(tok2) = self.next_token()? else {
            return Ok(None);
        };
        let Token::Int(genno) = tok2.1 else {
            self.push_back(tok2);
            return Ok(None);
        };
        let Some(tok3) = self.next_token()? else {
            self.push_back(tok2);
            return Ok(None);
        };
        if tok3.1 == Token::Keyword(Keyword::R) {
            let objid = u32::try_from(objid).ok();
            let genno = u16::try_from(genno).ok();
            return match (objid, genno) {
                (Some(objid), Some(genno)) => Ok(Some(PDFObjRef::new(objid, genno))),
                _ => Err(PdfError::SyntaxError(format!(
                    "reference out of range at offset {}",
                    tok3.0
                ))),
            };
        }
        // Not R, push back both
        self.push_back(tok3);
        self.push_back(tok2);
        Ok(None)
    }

    /// Parse array contents until ]
    fn parse_array(&mut self, depth: usize) -> Result<PDFObject> {
        let mut arr = Vec::new();
        loop {
            let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token.1 == Token::Keyword(Keyword::ArrayEnd) {
                break;
            }
            arr.push(self.token_to_object(token, depth + 1)?);
        }
        Ok(PDFObject::Array(arr))
    }

    /// Parse dict contents until >>
    fn parse_dict(&mut self, depth: usize) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            let key = match token {
                Token::Keyword(Keyword::DictEnd) => break,
                Token::Name(name) => name,
                _ => {
                    return Err(PdfError::TokenError {
                        pos,
                        msg: "expected name as dict key".into(),
                    });
                }
            };
            let value = self.parse_nested(depth + 1)?;
            dict.insert(key, value);
        }
        Ok(dict)
    }

    /// Read `n g obj <object> [stream ... endstream] endobj` at the
    /// current position.
    ///
    /// `length_of` resolves an indirect `/Length`. In strict mode a
    /// wrong or missing `/Length` and a missing `endobj` are errors;
    /// otherwise the stream body is found by scanning for `endstream`.
    pub fn parse_indirect(
        &mut self,
        strict: bool,
        length_of: impl Fn(&PDFObjRef) -> Option<i64>,
    ) -> Result<IndirectObject> {
        let start = self.tell();
        let header_err =
            || PdfError::SyntaxError(format!("expected 'n g obj' header at offset {start}"));

        let objid = match self.next_token()? {
            Some((_, Token::Int(n))) => u32::try_from(n).map_err(|_| header_err())?,
            _ => return Err(header_err()),
        };
        let genno = match self.next_token()? {
            Some((_, Token::Int(n))) => u16::try_from(n).map_err(|_| header_err())?,
            _ => return Err(header_err()),
        };
        match self.next_token()? {
            Some((_, Token::Keyword(Keyword::Obj))) => {}
            _ => return Err(header_err()),
        }

        let object = self.parse_object()?;
        let mut extent = None;
        let object = match object {
            PDFObject::Dict(attrs) => match self.next_token()? {
                Some((pos, Token::Keyword(Keyword::Stream))) => {
                    let (data, how) = self.read_stream_body(pos, &attrs, strict, &length_of)?;
                    extent = Some(how);
                    PDFObject::Stream(Box::new(PDFStream::new(attrs, data)))
                }
                other => {
                    if let Some(tok) = other {
                        self.push_back(tok);
                    }
                    PDFObject::Dict(attrs)
                }
            },
            other => other,
        };

        match self.next_token()? {
            Some((_, Token::Keyword(Keyword::EndObj))) => {}
            other => {
                if strict {
                    return Err(PdfError::SyntaxError(format!(
                        "object {objid} {genno} at offset {start} is not terminated by endobj"
                    )));
                }
                if let Some(tok) = other {
                    self.push_back(tok);
                }
            }
        }

        Ok(IndirectObject {
            id: (objid, genno),
            object,
            extent,
        })
    }

    fn read_stream_body(
        &mut self,
        keyword_pos: usize,
        attrs: &Dictionary,
        strict: bool,
        length_of: &impl Fn(&PDFObjRef) -> Option<i64>,
    ) -> Result<(Vec<u8>, StreamExtent)> {
        let data = self.lexer.data();
        let mut body_start = keyword_pos + b"stream".len();
        // EOL after the keyword is CRLF or LF; a lone CR is tolerated.
        if data.get(body_start) == Some(&b'\r') {
            body_start += 1;
        }
        if data.get(body_start) == Some(&b'\n') {
            body_start += 1;
        }
        self.lookahead.clear();

        let declared = match attrs.get("Length") {
            Some(PDFObject::Int(n)) => Some(*n),
            Some(PDFObject::Ref(r)) => length_of(r),
            _ => None,
        };
        if let Some(end) = declared
            .and_then(|n| usize::try_from(n).ok())
            .and_then(|n| body_start.checked_add(n))
            .filter(|&end| end <= data.len())
        {
            let mut after = Lexer::at(data, end);
            if let Some(Ok((_, Token::Keyword(Keyword::EndStream)))) = after.next_token() {
                self.lexer.set_pos(after.tell());
                return Ok((data[body_start..end].to_vec(), StreamExtent::Declared));
            }
        }

        if strict {
            return Err(PdfError::SyntaxError(format!(
                "stream at offset {keyword_pos} has a /Length that does not reach endstream"
            )));
        }

        let (end, resume) = match find_endstream(&data[body_start..]) {
            Some((end, keyword)) => (body_start + end, body_start + keyword + b"endstream".len()),
            None => (data.len(), data.len()),
        };
        self.lexer.set_pos(resume);
        Ok((data[body_start..end].to_vec(), StreamExtent::Scanned))
    }
}

/// Locate `endstream`, returning (end of body with trailing EOL trimmed,
/// keyword offset).
pub fn find_endstream(data: &[u8]) -> Option<(usize, usize)> {
    let needle = b"endstream";
    let keyword = data.windows(needle.len()).position(|w| w == needle)?;
    let mut end = keyword;
    if end > 0 && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some((end, keyword))
}
