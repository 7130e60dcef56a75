//! Read-only access to a parsed document and its pages

use std::fs;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::content::{decode_text_string, TextExtractor, TextOptions};
use crate::document::Document;
use crate::error::{PdfError, PdfResult};
use crate::pdf::{Dictionary, DocumentParser, Object, ObjectId};

/// Parser settings for [`PdfReader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Rebuild the object table by scanning when the xref data is unusable
    pub repair: bool,
    /// Fail on individual unreadable objects instead of skipping them
    pub strict: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            repair: true,
            strict: false,
        }
    }
}

/// A parsed PDF document with its page list
///
/// The reader never mutates the document it holds.
#[derive(Debug, Clone)]
pub struct PdfReader {
    document: Document,
    page_ids: Vec<ObjectId>,
}

impl PdfReader {
    /// Parse a document held in memory
    pub fn from_bytes(data: impl AsRef<[u8]>) -> PdfResult<Self> {
        Self::from_bytes_with_options(data, ReaderOptions::default())
    }

    pub fn from_bytes_with_options(data: impl AsRef<[u8]>, options: ReaderOptions) -> PdfResult<Self> {
        let document = DocumentParser::new(data.as_ref())
            .with_repair(options.repair)
            .with_strict(options.strict)
            .parse()?;
        Self::from_document(document)
    }

    /// Read and parse a file
    pub fn open(path: impl AsRef<Path>) -> PdfResult<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: ReaderOptions) -> PdfResult<Self> {
        debug!("Opening {}", path.as_ref().display());
        let data = fs::read(path)?;
        Self::from_bytes_with_options(data, options)
    }

    /// Drain `source` and parse the bytes
    pub fn from_reader(source: impl Read) -> PdfResult<Self> {
        Self::from_reader_with_options(source, ReaderOptions::default())
    }

    pub fn from_reader_with_options(mut source: impl Read, options: ReaderOptions) -> PdfResult<Self> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        Self::from_bytes_with_options(data, options)
    }

    /// Wrap an already assembled document
    pub fn from_document(document: Document) -> PdfResult<Self> {
        let page_ids = document.page_ids()?;
        debug!("Document has {} pages", page_ids.len());
        Ok(Self { document, page_ids })
    }

    pub fn num_pages(&self) -> usize {
        self.page_ids.len()
    }

    /// Page at `index` in page tree order
    ///
    /// Negative indices are rejected, not counted from the end.
    pub fn get_page(&self, index: isize) -> PdfResult<Page<'_>> {
        let count = self.page_ids.len();
        if index < 0 || index as usize >= count {
            return Err(PdfError::PageIndexOutOfRange { index, count });
        }
        let index = index as usize;
        Ok(Page {
            reader: self,
            index,
            id: self.page_ids[index],
        })
    }

    pub fn pages(&self) -> impl Iterator<Item = Page<'_>> + '_ {
        self.page_ids.iter().enumerate().map(move |(index, &id)| Page {
            reader: self,
            index,
            id,
        })
    }

    pub fn catalog(&self) -> PdfResult<&Dictionary> {
        self.document.catalog()
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.document.trailer
    }

    /// Entries of the `/Info` dictionary that hold text
    pub fn document_info(&self) -> PdfResult<IndexMap<String, String>> {
        let mut info = IndexMap::new();
        let Some(dict) = self.document.trailer.get("Info") else {
            return Ok(info);
        };

        for (key, value) in self.document.resolve_dict(dict)?.iter() {
            let text = match self.document.dereference(value)? {
                Object::String(bytes, _) => decode_text_string(bytes),
                Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
                other => {
                    warn!("Skipping /Info entry of type {}", other.type_name());
                    continue;
                }
            };
            info.insert(String::from_utf8_lossy(key).into_owned(), text);
        }
        Ok(info)
    }

    pub fn get_object(&self, id: ObjectId) -> PdfResult<&Object> {
        self.document.get_object(id)
    }

    /// Follow `object` through any indirect references
    pub fn resolve<'a>(&'a self, object: &'a Object) -> PdfResult<&'a Object> {
        self.document.dereference(object)
    }

    /// The document carries an `/Encrypt` dictionary; contents stay encrypted
    pub fn is_encrypted(&self) -> bool {
        self.document.is_encrypted()
    }

    pub fn version(&self) -> &str {
        &self.document.version
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

/// One leaf of the page tree
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    reader: &'a PdfReader,
    index: usize,
    id: ObjectId,
}

impl<'a> Page<'a> {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Position in the page list
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reader(&self) -> &'a PdfReader {
        self.reader
    }

    pub fn dictionary(&self) -> PdfResult<&'a Dictionary> {
        self.reader.document.get_dictionary(self.id)
    }

    /// Resource dictionary, inherited from ancestors when absent
    pub fn resources(&self) -> PdfResult<Option<&'a Dictionary>> {
        let document = &self.reader.document;
        document
            .inherited_attribute(self.id, "Resources")?
            .map(|resources| document.resolve_dict(resources))
            .transpose()
    }

    /// `[llx lly urx ury]`, inherited when absent
    pub fn media_box(&self) -> PdfResult<Option<[f64; 4]>> {
        let document = &self.reader.document;
        let Some(media_box) = document.inherited_attribute(self.id, "MediaBox")? else {
            return Ok(None);
        };
        let values = document
            .resolve_array(media_box)?
            .iter()
            .map(|value| document.dereference(value)?.as_f64())
            .collect::<PdfResult<Vec<f64>>>()?;
        match <[f64; 4]>::try_from(values.as_slice()) {
            Ok(rect) => Ok(Some(rect)),
            Err(_) => Err(PdfError::malformed(format!("MediaBox has {} entries", values.len()))),
        }
    }

    /// Clockwise rotation in degrees
    pub fn rotation(&self) -> PdfResult<i64> {
        let document = &self.reader.document;
        match document.inherited_attribute(self.id, "Rotate")? {
            Some(rotate) => document.dereference(rotate)?.as_i64(),
            None => Ok(0),
        }
    }

    /// Decoded content streams in declared order, joined by a newline
    ///
    /// A stream whose filter cannot be decoded contributes its raw bytes.
    pub fn content(&self) -> PdfResult<Vec<u8>> {
        let document = &self.reader.document;
        let Some(contents) = self.dictionary()?.get("Contents") else {
            return Ok(Vec::new());
        };

        let streams = match document.dereference(contents)? {
            Object::Array(parts) => parts
                .iter()
                .map(|part| document.dereference(part))
                .collect::<PdfResult<Vec<_>>>()?,
            single => vec![single],
        };

        let mut content = Vec::new();
        for (i, object) in streams.into_iter().enumerate() {
            let stream = document.with_direct_params(object.as_stream()?)?;
            let data = match stream.decompressed_content() {
                Ok(data) => data,
                Err(e) if e.is_recoverable() => {
                    warn!("Using raw bytes of content stream {} on page {}: {}", i, self.index, e);
                    stream.content.clone()
                }
                Err(e) => return Err(e),
            };
            if i > 0 {
                content.push(b'\n');
            }
            content.extend_from_slice(&data);
        }
        Ok(content)
    }

    pub fn extract_text(&self) -> PdfResult<String> {
        self.extract_text_with_options(TextOptions::default())
    }

    pub fn extract_text_with_options(&self, options: TextOptions) -> PdfResult<String> {
        let content = self.content()?;
        let resources = self.resources()?;
        Ok(TextExtractor::new(&self.reader.document, resources, options).extract(&content))
    }
}
