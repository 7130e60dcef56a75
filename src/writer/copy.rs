//! Deep copy of pages and everything they reach into a writer's arena

use std::collections::HashMap;

use log::{debug, trace};

use crate::document::{Document, INHERITABLE_PAGE_KEYS};
use crate::error::PdfResult;
use crate::pdf::{Dictionary, Object, ObjectId, Stream};
use super::Arena;

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Being copied; holds the destination id once a cycle needed one
    Open(Option<ObjectId>),
    Done(ObjectId),
}

#[derive(Debug)]
struct Frame {
    source: ObjectId,
    cyclic: bool,
}

/// One pass of copying from a single source document
///
/// Within a session each source object is copied once, so objects shared
/// by several pages stay shared. Objects are numbered after their children,
/// which lets finished bodies be matched against the dedup index.
pub(crate) struct CopySession<'s, 'w> {
    source: &'s Document,
    arena: &'w mut Arena,
    pages_root: ObjectId,
    page_map: HashMap<ObjectId, ObjectId>,
    memo: HashMap<ObjectId, Slot>,
    open: Vec<Frame>,
}

impl<'s, 'w> CopySession<'s, 'w> {
    /// `pages_root` is the destination node copied pages hang from
    pub fn new(source: &'s Document, arena: &'w mut Arena, pages_root: ObjectId) -> Self {
        Self {
            source,
            arena,
            pages_root,
            page_map: HashMap::new(),
            memo: HashMap::new(),
            open: Vec::new(),
        }
    }

    /// Reserve the destination id of a page copied in this session
    ///
    /// References between reserved pages are kept; references to any other
    /// source page become `null`.
    pub fn reserve_page(&mut self, page: ObjectId) -> ObjectId {
        if let Some(&dest) = self.page_map.get(&page) {
            return dest;
        }
        let dest = self.arena.allocate();
        self.page_map.insert(page, dest);
        dest
    }

    /// Copy one page with its inherited attributes made explicit
    pub fn copy_page(&mut self, page: ObjectId) -> PdfResult<ObjectId> {
        let source = self.source;
        let dest = self.reserve_page(page);
        let original = source.get_dictionary(page)?;
        debug!("Copying page {} {} R as {} {} R", page.0, page.1, dest.0, dest.1);

        let mut copied = Dictionary::new();
        for (key, value) in original.iter() {
            if key == b"Parent" {
                copied.set_reference("Parent", self.pages_root);
            } else {
                copied.set(key.clone(), self.copy_object(value)?);
            }
        }
        for key in INHERITABLE_PAGE_KEYS {
            if copied.has(key) {
                continue;
            }
            if let Some(value) = source.inherited_attribute(page, key)? {
                trace!("Materialising inherited /{} on page {} {} R", key, page.0, page.1);
                copied.set(key, self.copy_object(value)?);
            }
        }
        if !copied.has("Parent") {
            copied.set_reference("Parent", self.pages_root);
        }
        if !copied.has("Type") {
            copied.set_name("Type", "Page");
        }

        self.arena.insert(dest, copied.into());
        Ok(dest)
    }

    fn copy_object(&mut self, object: &'s Object) -> PdfResult<Object> {
        match object {
            Object::Reference(id) => self.copy_reference(*id),
            Object::Array(items) => items
                .iter()
                .map(|item| self.copy_object(item))
                .collect::<PdfResult<Vec<_>>>()
                .map(Object::Array),
            Object::Dictionary(dict) => self.copy_dictionary(dict).map(Object::Dictionary),
            Object::Stream(stream) => Ok(Object::Stream(Stream {
                dict: self.copy_dictionary(&stream.dict)?,
                content: stream.content.clone(),
            })),
            Object::Null
            | Object::Boolean(_)
            | Object::Integer(_)
            | Object::Real(_)
            | Object::String(..)
            | Object::Name(_) => Ok(object.clone()),
        }
    }

    fn copy_dictionary(&mut self, dict: &'s Dictionary) -> PdfResult<Dictionary> {
        let mut copied = Dictionary::new();
        for (key, value) in dict.iter() {
            copied.set(key.clone(), self.copy_object(value)?);
        }
        Ok(copied)
    }

    fn copy_reference(&mut self, id: ObjectId) -> PdfResult<Object> {
        if let Some(&dest) = self.page_map.get(&id) {
            return Ok(Object::Reference(dest));
        }
        match self.memo.get(&id).copied() {
            Some(Slot::Done(dest)) => return Ok(Object::Reference(dest)),
            Some(Slot::Open(_)) => return Ok(Object::Reference(self.close_cycle(id))),
            None => {}
        }

        let source = self.source;
        let target = source.get_object(id)?;
        if let Object::Dictionary(dict) = target {
            if dict.type_is("Page") || dict.type_is("Pages") || dict.type_is("Catalog") {
                trace!("Dropping reference to {} {} R outside the copied pages", id.0, id.1);
                return Ok(Object::Null);
            }
        }

        self.memo.insert(id, Slot::Open(None));
        self.open.push(Frame { source: id, cyclic: false });
        let body = self.copy_object(target);
        let frame = self.open.pop();
        let body = body?;

        let dest = match self.memo.get(&id).copied() {
            Some(Slot::Open(Some(reserved))) => {
                self.arena.insert(reserved, body);
                reserved
            }
            _ if frame.is_some_and(|frame| frame.cyclic) => self.arena.add(body),
            _ => self.arena.add_shared(body),
        };
        trace!("Copied {} {} R as {} {} R", id.0, id.1, dest.0, dest.1);
        self.memo.insert(id, Slot::Done(dest));
        Ok(Object::Reference(dest))
    }

    /// Give an open object its id now and mark the cycle through it
    fn close_cycle(&mut self, id: ObjectId) -> ObjectId {
        let dest = match self.memo.get(&id).copied() {
            Some(Slot::Open(Some(dest))) | Some(Slot::Done(dest)) => dest,
            _ => {
                let dest = self.arena.allocate();
                self.memo.insert(id, Slot::Open(Some(dest)));
                dest
            }
        };
        if let Some(start) = self.open.iter().rposition(|frame| frame.source == id) {
            for frame in &mut self.open[start..] {
                frame.cyclic = true;
            }
        }
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdfError;
    use pretty_assertions::assert_eq;
    use test_log::test;

    /// Catalog 1, Pages 2 (with Resources), pages 3 and 4 sharing font 5;
    /// page 4 carries an annotation that links back to page 3
    fn source_document() -> Document {
        let mut doc = Document::new("1.4");

        let mut catalog = Dictionary::new();
        catalog.set_name("Type", "Catalog");
        catalog.set_reference("Pages", (2, 0));
        doc.objects.insert((1, 0), catalog.into());

        let mut fonts = Dictionary::new();
        fonts.set_reference("F1", (5, 0));
        let mut resources = Dictionary::new();
        resources.set("Font", fonts);

        let mut pages = Dictionary::new();
        pages.set_name("Type", "Pages");
        pages.set("Kids", vec![Object::Reference((3, 0)), Object::Reference((4, 0))]);
        pages.set("Count", 2);
        pages.set("Resources", resources);
        doc.objects.insert((2, 0), pages.into());

        let mut first = Dictionary::new();
        first.set_name("Type", "Page");
        first.set_reference("Parent", (2, 0));
        doc.objects.insert((3, 0), first.into());

        let mut link = Dictionary::new();
        link.set_name("Subtype", "Link");
        link.set("Dest", vec![Object::Reference((3, 0)), Object::name("Fit")]);
        link.set_reference("P", (4, 0));
        let mut second = Dictionary::new();
        second.set_name("Type", "Page");
        second.set_reference("Parent", (2, 0));
        second.set("Annots", vec![Object::Dictionary(link)]);
        doc.objects.insert((4, 0), second.into());

        let mut font = Dictionary::new();
        font.set_name("Type", "Font");
        font.set_name("BaseFont", "Helvetica");
        doc.objects.insert((5, 0), font.into());

        doc.trailer.set_reference("Root", (1, 0));
        doc
    }

    fn page_font(arena: &Arena, page: ObjectId) -> Object {
        let page = arena.objects.get(page).unwrap().as_dict().unwrap();
        page.get_dict("Resources")
            .and_then(|resources| resources.get_dict("Font"))
            .and_then(|fonts| fonts.get("F1"))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_shared_objects_stay_shared() -> PdfResult<()> {
        let source = source_document();
        let mut arena = Arena::new(3, false);
        let mut session = CopySession::new(&source, &mut arena, (1, 0));
        let first = session.reserve_page((3, 0));
        let second = session.reserve_page((4, 0));
        session.copy_page((3, 0))?;
        session.copy_page((4, 0))?;

        assert_eq!(page_font(&arena, first), page_font(&arena, second));
        Ok(())
    }

    #[test]
    fn test_page_references() -> PdfResult<()> {
        let source = source_document();

        let mut arena = Arena::new(3, false);
        let mut session = CopySession::new(&source, &mut arena, (1, 0));
        let first = session.reserve_page((3, 0));
        let second = session.reserve_page((4, 0));
        session.copy_page((4, 0))?;
        let page = arena.objects.get(second).unwrap().as_dict().unwrap();
        assert_eq!(page.get_reference("Parent"), Some((1, 0)));
        let link = page.get_array("Annots").unwrap()[0].as_dict().unwrap();
        assert_eq!(link.get_array("Dest").unwrap()[0], Object::Reference(first));
        assert_eq!(link.get_reference("P"), Some(second));

        // Copied alone, the link target is not part of the output
        let mut arena = Arena::new(3, false);
        let second = CopySession::new(&source, &mut arena, (1, 0)).copy_page((4, 0))?;
        let page = arena.objects.get(second).unwrap().as_dict().unwrap();
        let link = page.get_array("Annots").unwrap()[0].as_dict().unwrap();
        assert_eq!(link.get_array("Dest").unwrap()[0], Object::Null);
        Ok(())
    }

    #[test]
    fn test_inherited_resources_are_materialised() -> PdfResult<()> {
        let source = source_document();
        let mut arena = Arena::new(3, false);
        let page = CopySession::new(&source, &mut arena, (1, 0)).copy_page((3, 0))?;
        let font = page_font(&arena, page).as_reference()?;
        assert_eq!(arena.objects.get(font).unwrap().as_dict()?.get_name("BaseFont"), Some("Helvetica"));
        Ok(())
    }

    #[test]
    fn test_cycles_are_copied() -> PdfResult<()> {
        let mut source = source_document();
        let mut a = Dictionary::new();
        a.set_reference("Next", (11, 0));
        let mut b = Dictionary::new();
        b.set_reference("Next", (10, 0));
        source.objects.insert((10, 0), a.into());
        source.objects.insert((11, 0), b.into());
        if let Some(Object::Dictionary(page)) = source.objects.get_mut((3, 0)) {
            page.set_reference("Chain", (10, 0));
        }

        let mut arena = Arena::new(3, true);
        let page = CopySession::new(&source, &mut arena, (1, 0)).copy_page((3, 0))?;
        let a = arena.objects.get(page).unwrap().as_dict()?.get_reference("Chain").unwrap();
        let b = arena.objects.get(a).unwrap().as_dict()?.get_reference("Next").unwrap();
        assert_eq!(arena.objects.get(b).unwrap().as_dict()?.get_reference("Next"), Some(a));
        Ok(())
    }

    #[test]
    fn test_unresolved_reference_is_reported() {
        let mut source = source_document();
        if let Some(Object::Dictionary(page)) = source.objects.get_mut((3, 0)) {
            page.set_reference("Contents", (99, 0));
        }
        let mut arena = Arena::new(3, false);
        let err = CopySession::new(&source, &mut arena, (1, 0)).copy_page((3, 0)).unwrap_err();
        assert!(matches!(err, PdfError::UnresolvedReference((99, 0))));
    }
}
