//! Content-addressed index of objects copied into a writer

use std::collections::HashMap;

use log::trace;
use sha2::{Digest, Sha256};

use crate::document::ObjectTable;
use crate::pdf::{Object, ObjectId, WritePdf};

/// SHA-256 of an object's canonical serialization
pub(crate) type Fingerprint = [u8; 32];

pub(crate) fn fingerprint(object: &Object) -> Fingerprint {
    Sha256::digest(object.to_pdf_bytes()).into()
}

/// Maps fingerprints to the objects that produced them
///
/// A fingerprint match is only a candidate; reuse requires the stored body
/// to be structurally equal as well.
#[derive(Debug, Default)]
pub(crate) struct DedupIndex {
    entries: HashMap<Fingerprint, Vec<ObjectId>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing object equal to `object`
    pub fn find(&self, digest: &Fingerprint, object: &Object, objects: &ObjectTable) -> Option<ObjectId> {
        let found = self
            .entries
            .get(digest)?
            .iter()
            .copied()
            .find(|&id| objects.get(id) == Some(object));
        if let Some(id) = found {
            trace!("Reusing object {} {} R for identical content", id.0, id.1);
        }
        found
    }

    pub fn record(&mut self, digest: Fingerprint, id: ObjectId) {
        self.entries.entry(digest).or_default().push(id);
    }

    /// Forget objects numbered `number` or higher
    pub fn forget_from(&mut self, number: u32) {
        self.entries.retain(|_, ids| {
            ids.retain(|id| id.0 < number);
            !ids.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}
