//! Object-scan recovery for files whose cross-reference data is unusable
//!
//! Every `N G obj` header in the file is parsed in file order, so a later
//! definition of the same object (an incremental update) replaces an
//! earlier one. The trailer is taken from the last `trailer` keyword, then
//! from the last xref stream dictionary naming a `/Root`, and is finally
//! synthesised around the first catalog found.

use log::{debug, trace, warn};

use crate::document::{Document, ObjectTable};
use crate::error::{PdfError, PdfResult};
use super::parser::{load_object_stream, unknown_length};
use super::xref::{is_xref_stream, trailer_from_xref_stream};
use super::{find_bytes, is_whitespace, rfind_bytes, Dictionary, Object, ObjectId, ObjectParser};

const OBJ_KEYWORD: &[u8] = b"obj";
const TRAILER_KEYWORD: &[u8] = b"trailer";

/// Rebuild a whole document from an object scan
pub(crate) fn rebuild_document(data: &[u8], version: String) -> PdfResult<Document> {
    let objects = scan_objects(data);
    if objects.is_empty() {
        return Err(PdfError::malformed("No objects found by repair scan"));
    }
    debug!("Repair scan recovered {} objects", objects.len());

    let trailer = rebuild_trailer(data, &objects)
        .ok_or_else(|| PdfError::malformed("No trailer or catalog found by repair scan"))?;

    Ok(Document {
        version,
        trailer,
        objects,
    })
}

/// Parse every `N G obj` found in `data`, expanding object streams
pub(crate) fn scan_objects(data: &[u8]) -> ObjectTable {
    let mut objects = ObjectTable::new();
    let mut cursor = 0;

    while let Some(found) = find_bytes(data, OBJ_KEYWORD, cursor) {
        cursor = found + OBJ_KEYWORD.len();
        let Some(start) = object_header_start(data, found) else {
            continue;
        };

        let mut parser = ObjectParser::at(data, start);
        match parser.parse_indirect_object(&unknown_length) {
            Ok((id, object)) => {
                trace!("Recovered object {} {} at offset {}", id.0, id.1, start);
                objects.insert(id, object);
                cursor = cursor.max(parser.position());
            }
            Err(e) => trace!("Skipping unparsable object header at {}: {}", start, e),
        }
    }

    expand_object_streams(&mut objects);
    objects
}

/// Walk back from `obj` over `G` and `N`; `None` unless the bytes spell
/// `<boundary>digits ws digits ws obj<boundary>`
fn object_header_start(data: &[u8], keyword: usize) -> Option<usize> {
    let after = keyword + OBJ_KEYWORD.len();
    if data.get(after).is_some_and(|&b| !is_whitespace(b) && !super::is_delimiter(b)) {
        return None;
    }

    let mut pos = keyword;
    let skip_ws = |mut pos: usize| {
        while pos > 0 && is_whitespace(data[pos - 1]) {
            pos -= 1;
        }
        pos
    };
    let skip_digits = |mut pos: usize| {
        while pos > 0 && data[pos - 1].is_ascii_digit() {
            pos -= 1;
        }
        pos
    };

    let before_gen = skip_ws(pos);
    if before_gen == pos {
        return None;
    }
    pos = skip_digits(before_gen);
    if pos == before_gen {
        return None;
    }
    let before_num = skip_ws(pos);
    if before_num == pos {
        return None;
    }
    pos = skip_digits(before_num);
    if pos == before_num {
        return None;
    }
    if pos > 0 && super::is_regular(data[pos - 1]) {
        return None;
    }
    Some(pos)
}

fn expand_object_streams(objects: &mut ObjectTable) {
    let containers: Vec<(ObjectId, Vec<(u32, Object)>)> = objects
        .iter()
        .filter_map(|(id, object)| match object {
            Object::Stream(stream) if stream.dict.type_is("ObjStm") => match load_object_stream(stream) {
                Ok(unpacked) => Some((id, unpacked)),
                Err(e) => {
                    warn!("Object stream {} {} R unusable during repair: {}", id.0, id.1, e);
                    None
                }
            },
            _ => None,
        })
        .collect();

    for (container, unpacked) in containers {
        for (number, object) in unpacked {
            // Objects written uncompressed elsewhere take precedence
            if !objects.contains((number, 0)) {
                trace!("Recovered object {} from object stream {}", number, container.0);
                objects.insert((number, 0), object);
            }
        }
    }
}

/// Find a trailer whose `/Root` resolves to a dictionary
pub(crate) fn rebuild_trailer(data: &[u8], objects: &ObjectTable) -> Option<Dictionary> {
    let root_is_valid = |trailer: &Dictionary| {
        trailer
            .get_reference("Root")
            .and_then(|id| objects.get(id))
            .is_some_and(|root| matches!(root, Object::Dictionary(_)))
    };

    let mut search_end = data.len();
    while let Some(pos) = rfind_bytes(&data[..search_end], TRAILER_KEYWORD) {
        let mut parser = ObjectParser::at(data, pos + TRAILER_KEYWORD.len());
        if let Ok(Object::Dictionary(trailer)) = parser.parse_object() {
            if root_is_valid(&trailer) {
                debug!("Using trailer dictionary at offset {}", pos);
                return Some(trailer);
            }
        }
        search_end = pos;
    }

    let from_xref_stream = objects
        .iter()
        .filter(|(_, object)| is_xref_stream(object))
        .filter_map(|(_, object)| object.as_dict().ok().map(trailer_from_xref_stream))
        .filter(|trailer| root_is_valid(trailer))
        .last();
    if let Some(trailer) = from_xref_stream {
        debug!("Using trailer from an xref stream dictionary");
        return Some(trailer);
    }

    let catalog = objects.iter().find_map(|(id, object)| match object {
        Object::Dictionary(dict) if dict.type_is("Catalog") => Some(id),
        _ => None,
    })?;
    warn!("No trailer found; synthesising one around catalog {} {} R", catalog.0, catalog.1);

    let mut trailer = Dictionary::new();
    trailer.set("Size", objects.max_number() as i64 + 1);
    trailer.set_reference("Root", catalog);
    Some(trailer)
}
