//! In-memory document: the object table arena plus trailer

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use log::{trace, warn};

use crate::error::{PdfError, PdfResult};
use crate::pdf::{Dictionary, Object, ObjectId, Stream};

/// Keys a page inherits from its ancestor `Pages` nodes
pub const INHERITABLE_PAGE_KEYS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

const DEREF_LIMIT: usize = 64;

/// Indirect objects keyed by (object number, generation)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectTable {
    objects: BTreeMap<ObjectId, Object>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    /// Insert or replace, returning the previous body
    pub fn insert(&mut self, id: ObjectId, object: Object) -> Option<Object> {
        self.objects.insert(id, object)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().map(|(&id, object)| (id, object))
    }

    /// Drop every object numbered `number` or higher
    pub(crate) fn truncate_from(&mut self, number: u32) {
        self.objects.split_off(&(number, 0));
    }

    /// Highest object number in use, 0 for an empty table
    pub fn max_number(&self) -> u32 {
        self.objects.keys().next_back().map_or(0, |&(number, _)| number)
    }
}

impl FromIterator<(ObjectId, Object)> for ObjectTable {
    fn from_iter<T: IntoIterator<Item = (ObjectId, Object)>>(iter: T) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

/// A parsed or assembled PDF document
#[derive(Debug, Clone)]
pub struct Document {
    /// Header version, e.g. "1.4"
    pub version: String,
    pub trailer: Dictionary,
    pub objects: ObjectTable,
}

impl Document {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            trailer: Dictionary::new(),
            objects: ObjectTable::new(),
        }
    }

    /// Look up an indirect object without following reference chains
    pub fn get_object(&self, id: ObjectId) -> PdfResult<&Object> {
        self.objects.get(id).ok_or(PdfError::UnresolvedReference(id))
    }

    /// Follow references until a direct object is reached
    pub fn dereference<'a>(&'a self, mut object: &'a Object) -> PdfResult<&'a Object> {
        let mut hops = 0;
        while let Object::Reference(id) = object {
            object = self.get_object(*id)?;
            hops += 1;
            if hops > DEREF_LIMIT {
                return Err(PdfError::malformed(format!("Reference chain through {} {} R is too long", id.0, id.1)));
            }
        }
        Ok(object)
    }

    /// Dictionary (or stream dictionary) behind an object id
    pub fn get_dictionary(&self, id: ObjectId) -> PdfResult<&Dictionary> {
        self.dereference(self.get_object(id)?)?.as_dict()
    }

    /// Dereference and view as a dictionary
    pub fn resolve_dict<'a>(&'a self, object: &'a Object) -> PdfResult<&'a Dictionary> {
        self.dereference(object)?.as_dict()
    }

    /// Dereference and view as an array
    pub fn resolve_array<'a>(&'a self, object: &'a Object) -> PdfResult<&'a Vec<Object>> {
        self.dereference(object)?.as_array()
    }

    pub fn catalog_id(&self) -> PdfResult<ObjectId> {
        self.trailer
            .get_reference("Root")
            .ok_or_else(|| PdfError::MissingDictionaryEntry("Root".to_string()))
    }

    /// The document catalog
    pub fn catalog(&self) -> PdfResult<&Dictionary> {
        self.get_dictionary(self.catalog_id()?)
    }

    /// Root node of the page tree
    pub fn pages_root(&self) -> PdfResult<ObjectId> {
        self.catalog()?
            .get_reference("Pages")
            .ok_or_else(|| PdfError::MissingDictionaryEntry("Pages".to_string()))
    }

    pub fn is_encrypted(&self) -> bool {
        self.trailer.has("Encrypt")
    }

    /// Leaf page ids in pre-order, left to right
    ///
    /// Broken kids are skipped with a warning; a node reached twice is a
    /// cycle and is not descended into again.
    pub fn page_ids(&self) -> PdfResult<Vec<ObjectId>> {
        let root = self.pages_root()?;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                warn!("Page tree node {} {} R visited twice, skipping", id.0, id.1);
                continue;
            }
            let node = match self.get_dictionary(id) {
                Ok(node) => node,
                Err(e) if id == root => return Err(e),
                Err(e) => {
                    warn!("Skipping unreadable page tree node {} {} R: {}", id.0, id.1, e);
                    continue;
                }
            };

            let kids = node.get("Kids").and_then(|kids| self.resolve_array(kids).ok());
            match kids {
                Some(kids) if !node.type_is("Page") => {
                    trace!("Pages node {} {} R with {} kids", id.0, id.1, kids.len());
                    for kid in kids.iter().rev() {
                        match kid {
                            Object::Reference(kid_id) => stack.push(*kid_id),
                            other => warn!("Ignoring direct {} in /Kids", other.type_name()),
                        }
                    }
                }
                _ if node.type_is("Pages") => {
                    warn!("Pages node {} {} R has no usable /Kids, skipping", id.0, id.1);
                }
                _ => pages.push(id),
            }
        }

        Ok(pages)
    }

    /// `stream` with indirect `/DecodeParms` entries replaced by their targets
    pub fn with_direct_params<'s>(&self, stream: &'s Stream) -> PdfResult<Cow<'s, Stream>> {
        let key = if stream.dict.has("DecodeParms") { "DecodeParms" } else { "DP" };
        let direct = match stream.dict.get(key) {
            Some(params @ Object::Reference(_)) => self.dereference(params)?.clone(),
            Some(Object::Array(items)) if items.iter().any(|item| matches!(item, Object::Reference(_))) => {
                Object::Array(
                    items
                        .iter()
                        .map(|item| self.dereference(item).cloned())
                        .collect::<PdfResult<_>>()?,
                )
            }
            _ => return Ok(Cow::Borrowed(stream)),
        };
        let mut stream = stream.clone();
        stream.dict.set(key, direct);
        Ok(Cow::Owned(stream))
    }

    /// Whether `id` is a `/Type /Pages` node
    pub fn is_pages_node(&self, id: ObjectId) -> bool {
        self.get_dictionary(id)
            .map(|dict| dict.type_is("Pages"))
            .unwrap_or(false)
    }

    /// Look `key` up on the node and then on its `/Parent` chain
    pub fn inherited_attribute(&self, page_id: ObjectId, key: &str) -> PdfResult<Option<&Object>> {
        let mut visited = HashSet::new();
        let mut current = page_id;

        loop {
            if !visited.insert(current) {
                warn!("Cycle in /Parent chain at {} {} R", current.0, current.1);
                return Ok(None);
            }
            let node = self.get_dictionary(current)?;
            if let Some(value) = node.get(key) {
                return Ok(Some(value));
            }
            match node.get_reference("Parent") {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }
}
