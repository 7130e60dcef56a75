//! Assembling new documents from pages of parsed ones
//!
//! A [`PdfWriter`] owns its own object table. Pages are deep-copied in from
//! a [`PdfReader`]; everything the page reaches is renumbered into the
//! writer, and identical resources are stored once for the writer's whole
//! lifetime. [`PdfWriter::write`] serializes the table with a fresh xref.

mod copy;
mod dedup;
mod serialize;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, trace, warn};
use rand::Rng;

use crate::document::ObjectTable;
use crate::error::{PdfError, PdfResult};
use crate::pdf::{Dictionary, Object, ObjectId};
use crate::reader::{Page, PdfReader};
use copy::CopySession;
use dedup::{fingerprint, DedupIndex};

const PAGES_ID: ObjectId = (1, 0);
const CATALOG_ID: ObjectId = (2, 0);
const FIRST_FREE_NUMBER: u32 = 3;

/// Random bytes in a script name key
const SCRIPT_KEY_BYTES: usize = 16;

/// Writer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Version written in the `%PDF-` header
    pub version: String,
    /// Flate-encode unfiltered streams on output
    pub compress_streams: bool,
    /// Store identical copied objects once
    pub deduplicate: bool,
    /// `/Producer` entry of the document information dictionary
    pub producer: Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            version: "1.3".to_string(),
            compress_streams: false,
            deduplicate: true,
            producer: None,
        }
    }
}

/// Object storage with monotonic numbering
#[derive(Debug)]
pub(crate) struct Arena {
    objects: ObjectTable,
    next_number: u32,
    dedup: Option<DedupIndex>,
}

impl Arena {
    fn new(first_number: u32, deduplicate: bool) -> Self {
        Self {
            objects: ObjectTable::new(),
            next_number: first_number,
            dedup: deduplicate.then(DedupIndex::new),
        }
    }

    /// Reserve the next object id without storing anything
    fn allocate(&mut self) -> ObjectId {
        let id = (self.next_number, 0);
        self.next_number += 1;
        id
    }

    fn insert(&mut self, id: ObjectId, object: Object) {
        self.objects.insert(id, object);
    }

    fn add(&mut self, object: Object) -> ObjectId {
        let id = self.allocate();
        self.objects.insert(id, object);
        id
    }

    /// Store `object`, or return an equal object stored earlier
    fn add_shared(&mut self, object: Object) -> ObjectId {
        let Some(index) = self.dedup.as_mut() else {
            return self.add(object);
        };
        let digest = fingerprint(&object);
        if let Some(existing) = index.find(&digest, &object, &self.objects) {
            return existing;
        }
        let id = (self.next_number, 0);
        self.next_number += 1;
        index.record(digest, id);
        self.objects.insert(id, object);
        id
    }

    fn checkpoint(&self) -> u32 {
        self.next_number
    }

    /// Discard everything stored since `checkpoint`
    fn rollback(&mut self, checkpoint: u32) {
        self.objects.truncate_from(checkpoint);
        if let Some(index) = self.dedup.as_mut() {
            index.forget_from(checkpoint);
            trace!("Rolled back to object {}; {} shared objects indexed", checkpoint, index.len());
        }
        self.next_number = checkpoint;
    }
}

/// Builds a new PDF file from copied pages, blank pages and scripts
#[derive(Debug)]
pub struct PdfWriter {
    options: WriterOptions,
    arena: Arena,
    catalog: Dictionary,
    kids: Vec<ObjectId>,
    info: Dictionary,
    info_id: Option<ObjectId>,
    script_keys: HashSet<String>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    /// Empty document: a catalog and a page tree root without kids
    pub fn new() -> Self {
        Self::with_options(WriterOptions::default())
    }

    pub fn with_options(options: WriterOptions) -> Self {
        let mut catalog = Dictionary::new();
        catalog.set_name("Type", "Catalog");
        catalog.set_reference("Pages", PAGES_ID);

        let mut writer = Self {
            arena: Arena::new(FIRST_FREE_NUMBER, options.deduplicate),
            options,
            catalog,
            kids: Vec::new(),
            info: Dictionary::new(),
            info_id: None,
            script_keys: HashSet::new(),
        };
        if let Some(producer) = writer.options.producer.clone() {
            writer.add_metadata([("Producer", producer)]);
        }
        writer
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn num_pages(&self) -> usize {
        self.kids.len()
    }

    /// Ids of the pages in output order
    pub fn page_ids(&self) -> &[ObjectId] {
        &self.kids
    }

    /// The catalog
    pub fn root_object(&self) -> &Dictionary {
        &self.catalog
    }

    pub fn root_id(&self) -> ObjectId {
        CATALOG_ID
    }

    /// The root `Pages` node as it will be written
    pub fn pages_object(&self) -> Dictionary {
        let mut pages = Dictionary::new();
        pages.set_name("Type", "Pages");
        pages.set(
            "Kids",
            self.kids.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
        );
        pages.set("Count", self.kids.len());
        pages
    }

    pub fn pages_id(&self) -> ObjectId {
        PAGES_ID
    }

    /// An object stored in the writer; the catalog, `Pages` and `/Info`
    /// dictionaries are built at write time and are not included
    pub fn get_object(&self, id: ObjectId) -> Option<&Object> {
        self.arena.objects.get(id)
    }

    /// Copy `page` (from any reader) to the end of the document
    pub fn add_page(&mut self, page: &Page<'_>) -> PdfResult<ObjectId> {
        self.insert_page(page, self.kids.len())
    }

    /// Copy `page` so it becomes page number `index`
    pub fn insert_page(&mut self, page: &Page<'_>, index: usize) -> PdfResult<ObjectId> {
        if index > self.kids.len() {
            return Err(PdfError::PageIndexOutOfRange {
                index: index as isize,
                count: self.kids.len(),
            });
        }

        let checkpoint = self.arena.checkpoint();
        let copied = CopySession::new(page.reader().document(), &mut self.arena, PAGES_ID).copy_page(page.id());
        match copied {
            Ok(id) => {
                self.kids.insert(index, id);
                Ok(id)
            }
            Err(e) => {
                self.arena.rollback(checkpoint);
                Err(e)
            }
        }
    }

    /// Copy every page of `reader`, in order, to the end of the document
    ///
    /// Either all pages are added or, on error, none are.
    pub fn append_pages_from_reader(&mut self, reader: &PdfReader) -> PdfResult<Vec<ObjectId>> {
        debug!("Appending {} pages", reader.num_pages());
        let checkpoint = self.arena.checkpoint();
        match copy_all_pages(&mut self.arena, reader) {
            Ok(ids) => {
                self.kids.extend_from_slice(&ids);
                Ok(ids)
            }
            Err(e) => {
                warn!("Page append failed, discarding partial copy: {}", e);
                self.arena.rollback(checkpoint);
                Err(e)
            }
        }
    }

    /// Append an empty page
    ///
    /// Missing dimensions are taken from the last page.
    pub fn add_blank_page(&mut self, width: Option<f64>, height: Option<f64>) -> PdfResult<ObjectId> {
        let (width, height) = match (width, height) {
            (Some(width), Some(height)) => (width, height),
            _ => {
                let (last_width, last_height) = self
                    .last_page_size()
                    .ok_or_else(|| PdfError::MissingDictionaryEntry("MediaBox".to_string()))?;
                (width.unwrap_or(last_width), height.unwrap_or(last_height))
            }
        };
        if !(width > 0.0 && height > 0.0) {
            return Err(PdfError::InvalidDictionaryValue {
                key: "MediaBox".to_string(),
                message: format!("{} x {} is not a page size", width, height),
            });
        }

        let mut page = Dictionary::new();
        page.set_name("Type", "Page");
        page.set_reference("Parent", PAGES_ID);
        page.set(
            "MediaBox",
            vec![Object::Integer(0), Object::Integer(0), Object::Real(width), Object::Real(height)],
        );
        page.set("Resources", Dictionary::new());

        let id = self.arena.add(page.into());
        self.kids.push(id);
        Ok(id)
    }

    fn last_page_size(&self) -> Option<(f64, f64)> {
        let resolve = |object: &'_ Object| -> Option<Object> {
            match object {
                Object::Reference(id) => self.arena.objects.get(*id).cloned(),
                other => Some(other.clone()),
            }
        };
        let page = self.arena.objects.get(*self.kids.last()?)?.as_dict().ok()?;
        let media_box = resolve(page.get("MediaBox")?)?;
        let values = media_box
            .as_array()
            .ok()?
            .iter()
            .map(|value| resolve(value).and_then(|value| value.as_f64().ok()))
            .collect::<Option<Vec<f64>>>()?;
        match values.as_slice() {
            [llx, lly, urx, ury] => Some(((urx - llx).abs(), (ury - lly).abs())),
            _ => None,
        }
    }

    /// Set entries of the document information dictionary
    ///
    /// A leading `/` on keys is accepted and dropped.
    pub fn add_metadata<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in entries {
            let key = key.as_ref().trim_start_matches('/');
            trace!("Setting /Info /{}", key);
            self.info.set(key, Object::text(value.as_ref()));
        }
        if self.info_id.is_none() {
            self.info_id = Some(self.arena.allocate());
        }
    }

    /// Document information entries set so far
    pub fn metadata(&self) -> &Dictionary {
        &self.info
    }

    /// Run `script` when the document is opened
    ///
    /// The script is registered in the `/JavaScript` name tree under a new
    /// random key, replacing any script added before, and the catalog's
    /// `/OpenAction` points at it. Returns the key.
    pub fn add_js(&mut self, script: &str) -> String {
        let mut action = Dictionary::new();
        action.set_name("Type", "Action");
        action.set_name("S", "JavaScript");
        action.set("JS", Object::text(script));
        let action_id = self.arena.add(action.into());

        let key = self.fresh_script_key();
        let mut tree = Dictionary::new();
        tree.set("Names", vec![Object::text(&key), Object::Reference(action_id)]);

        let mut names = match self.catalog.remove("Names") {
            Some(Object::Dictionary(names)) => names,
            _ => Dictionary::new(),
        };
        names.set("JavaScript", tree);
        self.catalog.set("Names", names);
        self.catalog.set_reference("OpenAction", action_id);

        debug!("Added document script {} as {} {} R", key, action_id.0, action_id.1);
        key
    }

    fn fresh_script_key(&mut self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let bytes: [u8; SCRIPT_KEY_BYTES] = rng.gen();
            let key = hex::encode(bytes);
            if self.script_keys.insert(key.clone()) {
                return key;
            }
        }
    }

    /// Key of the script in the `/JavaScript` name tree, if any
    pub fn javascript_name(&self) -> Option<String> {
        self.catalog
            .get_dict("Names")?
            .get_dict("JavaScript")?
            .get_array("Names")?
            .first()?
            .as_text()
            .ok()
    }

    /// Serialize the whole document
    pub fn write_to_vec(&self) -> PdfResult<Vec<u8>> {
        let pages = Object::Dictionary(self.pages_object());
        let catalog = Object::Dictionary(self.catalog.clone());
        let info = Object::Dictionary(self.info.clone());

        let mut objects: BTreeMap<ObjectId, &Object> = self.arena.objects.iter().collect();
        objects.insert(PAGES_ID, &pages);
        objects.insert(CATALOG_ID, &catalog);

        let mut trailer = Dictionary::new();
        trailer.set_reference("Root", CATALOG_ID);
        if let Some(info_id) = self.info_id {
            objects.insert(info_id, &info);
            trailer.set_reference("Info", info_id);
        }

        serialize::write_file(&self.options.version, objects, &trailer, self.options.compress_streams)
    }

    pub fn write(&self, output: &mut impl Write) -> PdfResult<()> {
        output.write_all(&self.write_to_vec()?)?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PdfResult<()> {
        debug!("Saving {}", path.as_ref().display());
        fs::write(path, self.write_to_vec()?)?;
        Ok(())
    }
}

fn copy_all_pages(arena: &mut Arena, reader: &PdfReader) -> PdfResult<Vec<ObjectId>> {
    let mut session = CopySession::new(reader.document(), arena, PAGES_ID);
    // Reserved up front so links between the copied pages survive
    let ids: Vec<ObjectId> = reader.pages().map(|page| session.reserve_page(page.id())).collect();
    for page in reader.pages() {
        session.copy_page(page.id())?;
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::pdf::Stream;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn one_page_reader(text: &str) -> PdfReader {
        let mut doc = Document::new("1.4");

        let mut catalog = Dictionary::new();
        catalog.set_name("Type", "Catalog");
        catalog.set_reference("Pages", (2, 0));
        doc.objects.insert((1, 0), catalog.into());

        let mut pages = Dictionary::new();
        pages.set_name("Type", "Pages");
        pages.set("Kids", vec![Object::Reference((3, 0))]);
        pages.set("Count", 1);
        doc.objects.insert((2, 0), pages.into());

        let mut page = Dictionary::new();
        page.set_name("Type", "Page");
        page.set_reference("Parent", (2, 0));
        page.set(
            "MediaBox",
            vec![Object::Integer(0), Object::Integer(0), Object::Integer(300), Object::Integer(400)],
        );
        page.set_reference("Contents", (4, 0));
        doc.objects.insert((3, 0), page.into());

        let content = format!("BT ({}) Tj ET", text);
        doc.objects.insert((4, 0), Stream::new(Dictionary::new(), content.into_bytes()).into());

        doc.trailer.set_reference("Root", (1, 0));
        PdfReader::from_document(doc).unwrap()
    }

    #[test]
    fn test_new_writer_skeleton() {
        let writer = PdfWriter::new();
        assert_eq!(writer.num_pages(), 0);
        assert_eq!(writer.root_object().get_reference("Pages"), Some(writer.pages_id()));
        assert_eq!(writer.pages_object().get_integer("Count"), Some(0));
        assert!(writer.javascript_name().is_none());
    }

    #[test]
    fn test_add_js_builds_catalog_entries() {
        let mut writer = PdfWriter::new();
        let key = writer.add_js("this.print({bUI:true,bSilent:false,bShrinkToFit:true});");

        let root = writer.root_object();
        let tree = root.get_dict("Names").and_then(|names| names.get_dict("JavaScript")).unwrap();
        let entries = tree.get_array("Names").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(writer.javascript_name(), Some(key));

        let action = root.get_reference("OpenAction").unwrap();
        assert_eq!(entries[1], Object::Reference(action));
        let action = writer.get_object(action).unwrap().as_dict().unwrap();
        assert_eq!(action.get_name("S"), Some("JavaScript"));
    }

    #[test]
    fn test_add_js_replaces_previous_script() {
        let mut writer = PdfWriter::new();
        let first = writer.add_js("app.alert('one');");
        let second = writer.add_js("app.alert('two');");
        assert!(first != second);

        let tree = writer
            .root_object()
            .get_dict("Names")
            .and_then(|names| names.get_dict("JavaScript"))
            .unwrap();
        assert_eq!(tree.get_array("Names").unwrap().len(), 2);
        assert_eq!(writer.javascript_name(), Some(second));
    }

    #[test]
    fn test_add_js_keeps_other_name_trees() {
        let mut writer = PdfWriter::new();
        let mut names = Dictionary::new();
        names.set("Dests", Dictionary::new());
        writer.catalog.set("Names", names);

        writer.add_js("1;");
        let names = writer.root_object().get_dict("Names").unwrap();
        assert!(names.has("Dests"));
        assert!(names.has("JavaScript"));
    }

    #[test]
    fn test_blank_pages() -> PdfResult<()> {
        let mut writer = PdfWriter::new();
        assert!(matches!(
            writer.add_blank_page(None, None),
            Err(PdfError::MissingDictionaryEntry(_))
        ));
        assert!(matches!(
            writer.add_blank_page(Some(0.0), Some(10.0)),
            Err(PdfError::InvalidDictionaryValue { .. })
        ));

        writer.add_page(&one_page_reader("x").get_page(0)?)?;
        let blank = writer.add_blank_page(None, Some(500.0))?;
        let page = writer.get_object(blank).unwrap().as_dict()?;
        assert_eq!(
            page.get_array("MediaBox"),
            Some(&vec![Object::Integer(0), Object::Integer(0), Object::Real(300.0), Object::Real(500.0)])
        );
        assert_eq!(writer.num_pages(), 2);
        Ok(())
    }

    #[test]
    fn test_insert_page() -> PdfResult<()> {
        let mut writer = PdfWriter::new();
        let first = writer.add_page(&one_page_reader("a").get_page(0)?)?;
        let front = writer.insert_page(&one_page_reader("b").get_page(0)?, 0)?;
        assert_eq!(writer.page_ids(), &[front, first]);

        let err = writer.insert_page(&one_page_reader("c").get_page(0)?, 5).unwrap_err();
        assert!(matches!(err, PdfError::PageIndexOutOfRange { index: 5, count: 2 }));
        Ok(())
    }

    #[test]
    fn test_failed_append_leaves_writer_unchanged() -> PdfResult<()> {
        let good = one_page_reader("good");
        let mut writer = PdfWriter::new();
        writer.append_pages_from_reader(&good)?;
        let before = writer.write_to_vec()?;

        let mut doc = one_page_reader("bad").document().clone();
        if let Some(Object::Dictionary(page)) = doc.objects.get_mut((3, 0)) {
            page.set_reference("Thumb", (42, 0));
        }
        let bad = PdfReader::from_document(doc)?;
        let err = writer.append_pages_from_reader(&bad).unwrap_err();
        assert!(matches!(err, PdfError::UnresolvedReference((42, 0))));

        assert_eq!(writer.num_pages(), 1);
        assert_eq!(writer.write_to_vec()?, before);
        Ok(())
    }

    #[test]
    fn test_metadata_and_producer() -> PdfResult<()> {
        let options = WriterOptions {
            producer: Some("pdf-assembler".to_string()),
            ..WriterOptions::default()
        };
        let mut writer = PdfWriter::with_options(options);
        writer.add_metadata([("/Title", "Merged"), ("Author", "Nobody")]);

        let reader = PdfReader::from_bytes(writer.write_to_vec()?)?;
        let info = reader.document_info()?;
        assert_eq!(info.get("Producer").map(String::as_str), Some("pdf-assembler"));
        assert_eq!(info.get("Title").map(String::as_str), Some("Merged"));
        assert_eq!(info.get("Author").map(String::as_str), Some("Nobody"));
        Ok(())
    }

    #[test]
    fn test_round_trip_of_copied_page() -> PdfResult<()> {
        let source = one_page_reader("The Crazy Ones");
        let mut writer = PdfWriter::new();
        writer.append_pages_from_reader(&source)?;

        let output = PdfReader::from_bytes(writer.write_to_vec()?)?;
        assert_eq!(output.num_pages(), 1);
        assert_eq!(output.get_page(0)?.extract_text()?, "The Crazy Ones");
        assert_eq!(output.get_page(0)?.media_box()?, Some([0.0, 0.0, 300.0, 400.0]));
        Ok(())
    }
}
