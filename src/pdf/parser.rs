//! PDF document parser implementation

use std::collections::{BTreeMap, HashSet};

use log::{debug, trace, warn};

use crate::document::{Document, ObjectTable};
use crate::error::{PdfError, PdfResult};
use super::repair;
use super::xref::{is_xref_stream, trailer_from_xref_stream, XrefEntry};
use super::{find_bytes, is_whitespace, rfind_bytes, Dictionary, Lexer, Object, ObjectId, StringFormat, Stream, Token, XrefTable};

const PDF_MAGIC: &[u8] = b"%PDF-";
const HEADER_SEARCH_WINDOW: usize = 1024;
const STARTXREF_MARKER: &[u8] = b"startxref";
const MAX_NESTING: usize = 256;
const DEFAULT_VERSION: &str = "1.4";

/// Resolves an indirect `/Length` while a stream body is being delimited
pub type LengthResolver<'r> = &'r dyn Fn(ObjectId) -> Option<usize>;

/// Parses objects out of a byte buffer
#[derive(Debug, Clone)]
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { lexer: Lexer::new(data) }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { lexer: Lexer::at(data, pos) }
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Parse the next direct object
    pub fn parse_object(&mut self) -> PdfResult<Object> {
        let pos = self.lexer.position();
        let token = self
            .lexer
            .next_token()?
            .ok_or_else(|| PdfError::parse(pos, "Unexpected end of input"))?;
        self.parse_token(token, 0)
    }

    /// Parse an object whose first token has already been read
    pub fn parse_with_token(&mut self, token: Token) -> PdfResult<Object> {
        self.parse_token(token, 0)
    }

    fn parse_token(&mut self, token: Token, depth: usize) -> PdfResult<Object> {
        let pos = self.lexer.position();
        if depth > MAX_NESTING {
            return Err(PdfError::parse(pos, "Objects nested too deeply"));
        }

        match token {
            Token::Integer(n) => Ok(self.integer_or_reference(n)),
            Token::Real(n) => Ok(Object::Real(n)),
            Token::LiteralString(s) => Ok(Object::String(s, StringFormat::Literal)),
            Token::HexString(s) => Ok(Object::String(s, StringFormat::Hexadecimal)),
            Token::Name(name) => Ok(Object::Name(name)),
            Token::ArrayStart => self.parse_array(depth),
            Token::DictStart => self.parse_dictionary(depth).map(Object::Dictionary),
            Token::Keyword(keyword) => match keyword.as_slice() {
                b"true" => Ok(Object::Boolean(true)),
                b"false" => Ok(Object::Boolean(false)),
                b"null" => Ok(Object::Null),
                other => Err(PdfError::parse(
                    pos,
                    format!("Unexpected keyword '{}'", String::from_utf8_lossy(other)),
                )),
            },
            Token::ArrayEnd | Token::DictEnd => Err(PdfError::parse(pos, "Unbalanced closing delimiter")),
        }
    }

    /// `N G R` lookahead
    fn integer_or_reference(&mut self, number: i64) -> Object {
        let checkpoint = self.lexer.position();
        if let (Ok(Some(Token::Integer(generation))), Ok(Some(Token::Keyword(keyword)))) =
            (self.lexer.next_token(), self.lexer.next_token())
        {
            if keyword == b"R"
                && (0..=u32::MAX as i64).contains(&number)
                && (0..=u16::MAX as i64).contains(&generation)
            {
                return Object::Reference((number as u32, generation as u16));
            }
        }
        self.lexer.set_position(checkpoint);
        Object::Integer(number)
    }

    fn parse_array(&mut self, depth: usize) -> PdfResult<Object> {
        let mut items = Vec::new();
        loop {
            let pos = self.lexer.position();
            match self.lexer.next_token()? {
                None => return Err(PdfError::parse(pos, "Unterminated array")),
                Some(Token::ArrayEnd) => break,
                Some(token) => items.push(self.parse_token(token, depth + 1)?),
            }
        }
        Ok(Object::Array(items))
    }

    fn parse_dictionary(&mut self, depth: usize) -> PdfResult<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let pos = self.lexer.position();
            let key = match self.lexer.next_token()? {
                None => return Err(PdfError::parse(pos, "Unterminated dictionary")),
                Some(Token::DictEnd) => break,
                Some(Token::Name(key)) => key,
                Some(other) => {
                    return Err(PdfError::parse(pos, format!("Dictionary key must be a name, found {:?}", other)))
                }
            };

            let pos = self.lexer.position();
            match self.lexer.next_token()? {
                None => return Err(PdfError::parse(pos, "Unterminated dictionary")),
                Some(Token::DictEnd) => {
                    warn!("Dictionary key /{} has no value", String::from_utf8_lossy(&key));
                    dict.set(key, Object::Null);
                    break;
                }
                Some(token) => {
                    let value = self.parse_token(token, depth + 1)?;
                    dict.set(key, value);
                }
            }
        }
        Ok(dict)
    }

    /// Parse `N G obj ... endobj`, including a trailing stream body
    pub fn parse_indirect_object(&mut self, length_of: LengthResolver) -> PdfResult<(ObjectId, Object)> {
        let start = self.lexer.position();
        let number = match self.lexer.next_token()? {
            Some(Token::Integer(n)) if (0..=u32::MAX as i64).contains(&n) => n as u32,
            _ => return Err(PdfError::parse(start, "Expected object number")),
        };
        let generation = match self.lexer.next_token()? {
            Some(Token::Integer(g)) if (0..=u16::MAX as i64).contains(&g) => g as u16,
            _ => return Err(PdfError::parse(start, "Expected generation number")),
        };
        match self.lexer.next_token()? {
            Some(token) if token.is_keyword(b"obj") => {}
            _ => return Err(PdfError::parse(start, "Expected 'obj' keyword")),
        }

        let id = (number, generation);
        trace!("Parsing object {} {} at offset {}", number, generation, start);

        let pos = self.lexer.position();
        let object = match self.lexer.next_token()? {
            // Empty object body reads as null
            Some(token) if token.is_keyword(b"endobj") => {
                self.lexer.set_position(pos);
                Object::Null
            }
            Some(token) => self.parse_token(token, 0)?,
            None => return Err(PdfError::parse(pos, "Unexpected end of input")),
        };

        let object = match object {
            Object::Dictionary(dict) => {
                self.lexer.skip_whitespace();
                if self.lexer.starts_with_keyword(b"stream") {
                    let after = self.lexer.position() + b"stream".len();
                    self.lexer.set_position(after);
                    Object::Stream(self.parse_stream_body(dict, length_of)?)
                } else {
                    Object::Dictionary(dict)
                }
            }
            other => other,
        };

        self.lexer.skip_whitespace();
        if self.lexer.starts_with_keyword(b"endobj") {
            let after = self.lexer.position() + b"endobj".len();
            self.lexer.set_position(after);
        } else {
            trace!("Object {} {} has no endobj", number, generation);
        }

        Ok((id, object))
    }

    fn parse_stream_body(&mut self, dict: Dictionary, length_of: LengthResolver) -> PdfResult<Stream> {
        self.lexer.skip_stream_eol();
        let data = self.lexer.data();
        let start = self.lexer.position();

        let declared = match dict.get("Length") {
            Some(Object::Integer(n)) if *n >= 0 => Some(*n as usize),
            Some(Object::Reference(id)) => length_of(*id),
            _ => None,
        };

        let end = match declared {
            Some(len) if endstream_follows(data, start.saturating_add(len)) => start + len,
            _ => {
                let end = scan_for_endstream(data, start)
                    .ok_or_else(|| PdfError::parse(start, "Stream without endstream"))?;
                if declared.is_some() {
                    warn!("Stream /Length at offset {} is wrong; delimited by endstream", start);
                }
                end
            }
        };

        let after = find_bytes(data, b"endstream", end).map_or(data.len(), |pos| pos + b"endstream".len());
        self.lexer.set_position(after);

        Ok(Stream::new(dict, data[start..end].to_vec()))
    }
}

/// Resolver for contexts where no other object is reachable
pub(crate) fn unknown_length(_: ObjectId) -> Option<usize> {
    None
}

fn endstream_follows(data: &[u8], pos: usize) -> bool {
    if pos > data.len() {
        return false;
    }
    let mut cursor = pos;
    while data.get(cursor).is_some_and(|&b| is_whitespace(b)) {
        cursor += 1;
    }
    data[cursor..].starts_with(b"endstream")
}

/// End of stream payload when `/Length` cannot be trusted; the EOL before
/// `endstream` is not part of the data
fn scan_for_endstream(data: &[u8], start: usize) -> Option<usize> {
    let mut end = find_bytes(data, b"endstream", start)?;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some(end)
}

/// Extract the objects packed in an object stream (`/Type /ObjStm`)
pub(crate) fn load_object_stream(stream: &Stream) -> PdfResult<Vec<(u32, Object)>> {
    let count = stream
        .dict
        .get_integer("N")
        .ok_or_else(|| PdfError::MissingDictionaryEntry("N".to_string()))?
        .max(0) as usize;
    let first = stream
        .dict
        .get_integer("First")
        .ok_or_else(|| PdfError::MissingDictionaryEntry("First".to_string()))?
        .max(0) as usize;
    let data = stream.decompressed_content()?;

    let mut header = Lexer::new(&data);
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        match (header.next_token()?, header.next_token()?) {
            (Some(Token::Integer(number)), Some(Token::Integer(offset))) if number >= 0 && offset >= 0 => {
                slots.push((number as u32, offset as usize));
            }
            _ => return Err(PdfError::parse(header.position(), "Invalid object stream header")),
        }
    }

    let mut objects = Vec::with_capacity(count);
    for (number, offset) in slots {
        let pos = first + offset;
        if pos >= data.len() {
            warn!("Object {} lies outside its object stream", number);
            continue;
        }
        match ObjectParser::at(&data, pos).parse_object() {
            Ok(object) => objects.push((number, object)),
            Err(e) => warn!("Skipping object {} in object stream: {}", number, e),
        }
    }
    Ok(objects)
}

/// Loads a whole document: header, xref chain, trailer, objects
#[derive(Debug, Clone)]
pub struct DocumentParser<'a> {
    data: &'a [u8],
    repair: bool,
    strict: bool,
}

impl<'a> DocumentParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            repair: true,
            strict: false,
        }
    }

    /// Fall back to an object scan when the xref data is unusable
    pub fn with_repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }

    /// Fail on individual unreadable objects instead of skipping them
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Parse the document
    pub fn parse(&self) -> PdfResult<Document> {
        debug!("Parsing PDF document ({} bytes)", self.data.len());
        let (header_offset, version) = self.read_header()?;
        trace!("Found PDF header version {} at offset {}", version, header_offset);

        let failure = match self.load_with_xref(header_offset, &version) {
            Ok(document) => match document.catalog().err() {
                None => {
                    debug!("Loaded {} objects through the xref chain", document.objects.len());
                    return Ok(document);
                }
                Some(e) => e,
            },
            Err(e) => e,
        };

        if !self.repair {
            return Err(match failure {
                PdfError::MalformedDocument(_) => failure,
                other => PdfError::malformed(other.to_string()),
            });
        }

        warn!("Cross-reference data unusable ({}); rebuilding by object scan", failure);
        repair::rebuild_document(self.data, version)
    }

    fn read_header(&self) -> PdfResult<(usize, String)> {
        let window = &self.data[..self.data.len().min(HEADER_SEARCH_WINDOW)];
        let offset = find_bytes(window, PDF_MAGIC, 0)
            .ok_or_else(|| PdfError::malformed("PDF header not found"))?;

        let version_start = offset + PDF_MAGIC.len();
        let version: String = self.data[version_start..]
            .iter()
            .take_while(|&&b| b.is_ascii_digit() || b == b'.')
            .map(|&b| b as char)
            .collect();

        if version.is_empty() {
            warn!("PDF header carries no version, assuming {}", DEFAULT_VERSION);
            return Ok((offset, DEFAULT_VERSION.to_string()));
        }
        Ok((offset, version))
    }

    fn find_startxref(&self) -> PdfResult<usize> {
        let marker = rfind_bytes(self.data, STARTXREF_MARKER)
            .ok_or_else(|| PdfError::malformed("startxref not found"))?;
        let mut lexer = Lexer::at(self.data, marker + STARTXREF_MARKER.len());
        match lexer.next_token()? {
            Some(Token::Integer(offset)) if offset >= 0 && (offset as usize) < self.data.len() => Ok(offset as usize),
            _ => Err(PdfError::malformed("Invalid startxref offset")),
        }
    }

    /// Read one xref section (classic or stream) at `offset`
    fn read_xref_section(&self, offset: usize) -> PdfResult<(XrefTable, Dictionary)> {
        let mut lexer = Lexer::at(self.data, offset);
        lexer.skip_whitespace();

        if lexer.starts_with_keyword(b"xref") {
            let after = lexer.position() + b"xref".len();
            lexer.set_position(after);
            let table = XrefTable::parse_table(&mut lexer)?;

            match lexer.next_token()? {
                Some(token) if token.is_keyword(b"trailer") => {}
                _ => return Err(PdfError::parse(lexer.position(), "Expected trailer")),
            }
            let mut parser = ObjectParser::at(self.data, lexer.position());
            let trailer = match parser.parse_object()? {
                Object::Dictionary(dict) => dict,
                other => {
                    return Err(PdfError::InvalidObjectType {
                        expected: "Dictionary",
                        found: other.type_name(),
                    })
                }
            };
            return Ok((table, trailer));
        }

        let (_, object) = ObjectParser::at(self.data, lexer.position()).parse_indirect_object(&unknown_length)?;
        if !is_xref_stream(&object) {
            return Err(PdfError::parse(offset, "startxref does not point at an xref section"));
        }
        let stream = object.as_stream()?;
        Ok((XrefTable::parse_stream(stream)?, trailer_from_xref_stream(&stream.dict)))
    }

    /// Follow the `/Prev` chain from the newest section
    fn read_xref_chain(&self) -> PdfResult<(XrefTable, Dictionary)> {
        let start = self.find_startxref()?;
        let (mut xref, trailer) = self.read_xref_section(start)?;
        let mut visited = HashSet::from([start]);

        self.merge_hybrid_stream(&mut xref, &trailer)?;

        let mut prev = prev_offset(&trailer);
        while let Some(offset) = prev {
            if !visited.insert(offset) {
                warn!("Cycle in /Prev chain at offset {}", offset);
                break;
            }
            trace!("Following /Prev to offset {}", offset);
            let (mut older, older_trailer) = match self.read_xref_section(offset) {
                Ok(section) => section,
                Err(e) if !self.strict => {
                    warn!("Ignoring unreadable older xref section at {}: {}", offset, e);
                    break;
                }
                Err(e) => return Err(e),
            };
            self.merge_hybrid_stream(&mut older, &older_trailer)?;
            xref.merge_older(older);
            prev = prev_offset(&older_trailer);
        }

        Ok((xref, trailer))
    }

    /// Hybrid files list compressed objects in an `/XRefStm` next to the classic table
    fn merge_hybrid_stream(&self, xref: &mut XrefTable, trailer: &Dictionary) -> PdfResult<()> {
        let Some(offset) = trailer.get_integer("XRefStm") else {
            return Ok(());
        };
        match self.read_xref_section(offset.max(0) as usize) {
            Ok((stream_table, _)) => {
                for (number, entry) in stream_table.iter() {
                    if matches!(xref.get(number), None | Some(XrefEntry::Free)) {
                        xref.insert(number, *entry);
                    }
                }
                Ok(())
            }
            Err(e) if !self.strict => {
                warn!("Ignoring unreadable /XRefStm at {}: {}", offset, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn read_object_at(&self, offset: usize, header_offset: usize, xref: &XrefTable) -> PdfResult<(ObjectId, Object)> {
        let length_of = |id: ObjectId| self.resolve_length(id, xref, header_offset);
        match ObjectParser::at(self.data, offset).parse_indirect_object(&length_of) {
            Ok(found) => Ok(found),
            // Offsets written relative to a header that is not at byte 0
            Err(_) if header_offset > 0 => {
                ObjectParser::at(self.data, offset + header_offset).parse_indirect_object(&length_of)
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_length(&self, id: ObjectId, xref: &XrefTable, header_offset: usize) -> Option<usize> {
        let XrefEntry::Normal { offset, .. } = xref.get(id.0)? else {
            return None;
        };
        [*offset, offset + header_offset].iter().find_map(|&pos| {
            let (_, object) = ObjectParser::at(self.data, pos).parse_indirect_object(&unknown_length).ok()?;
            object.as_i64().ok().filter(|&n| n >= 0).map(|n| n as usize)
        })
    }

    fn load_with_xref(&self, header_offset: usize, version: &str) -> PdfResult<Document> {
        let (xref, trailer) = self.read_xref_chain()?;
        debug!("Cross-reference chain lists {} objects", xref.len());

        if let Some(size) = trailer.get_integer("Size") {
            let max = xref.iter().map(|(number, _)| number as i64).max().unwrap_or(0);
            if size <= max {
                warn!("Trailer /Size {} does not cover object {}", size, max);
            }
        }

        let mut objects = ObjectTable::new();
        let mut failed = Vec::new();
        let mut compressed: BTreeMap<u32, Vec<(u32, usize)>> = BTreeMap::new();

        for (number, entry) in xref.iter() {
            match *entry {
                XrefEntry::Free => {}
                XrefEntry::Normal { offset, generation } => {
                    match self.read_object_at(offset, header_offset, &xref) {
                        Ok((found, object)) if found.0 == number => {
                            if found.1 != generation {
                                warn!("Object {} has generation {} but xref says {}", number, found.1, generation);
                            }
                            objects.insert((number, generation), object);
                        }
                        Ok((found, _)) => {
                            if self.strict {
                                return Err(PdfError::parse(
                                    offset,
                                    format!("Expected object {} but found {}", number, found.0),
                                ));
                            }
                            failed.push((number, generation));
                        }
                        Err(e) if self.strict => return Err(e),
                        Err(e) => {
                            warn!("Object {} unreadable at offset {}: {}", number, offset, e);
                            failed.push((number, generation));
                        }
                    }
                }
                XrefEntry::Compressed { container, index } => {
                    compressed.entry(container).or_default().push((number, index));
                }
            }
        }

        for (container, wanted) in compressed {
            self.load_compressed(&mut objects, container, &wanted)?;
        }

        if !failed.is_empty() && self.repair {
            warn!("Recovering {} misplaced objects by object scan", failed.len());
            let scanned = repair::scan_objects(self.data);
            for id in failed {
                if let Some(object) = scanned.get(id) {
                    objects.insert(id, object.clone());
                }
            }
        }

        if objects.is_empty() {
            return Err(PdfError::malformed("No objects found through the xref table"));
        }

        Ok(Document {
            version: version.to_string(),
            trailer,
            objects,
        })
    }

    fn load_compressed(&self, objects: &mut ObjectTable, container: u32, wanted: &[(u32, usize)]) -> PdfResult<()> {
        let unpacked = match objects.get((container, 0)) {
            Some(Object::Stream(stream)) => load_object_stream(stream),
            _ => Err(PdfError::UnresolvedReference((container, 0))),
        };
        let unpacked = match unpacked {
            Ok(unpacked) => unpacked,
            Err(e) if self.strict => return Err(e),
            Err(e) => {
                warn!("Object stream {} unusable: {}", container, e);
                return Ok(());
            }
        };

        for &(number, index) in wanted {
            let object = match unpacked.get(index) {
                Some((found, object)) if *found == number => Some(object),
                _ => unpacked.iter().find(|(found, _)| *found == number).map(|(_, object)| object),
            };
            match object {
                Some(object) => {
                    objects.insert((number, 0), object.clone());
                }
                None => warn!("Object {} missing from object stream {}", number, container),
            }
        }
        Ok(())
    }
}

fn prev_offset(trailer: &Dictionary) -> Option<usize> {
    trailer.get_integer("Prev").filter(|&n| n >= 0).map(|n| n as usize)
}
