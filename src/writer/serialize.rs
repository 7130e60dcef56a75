//! Full-file serialization with a freshly built xref table

use std::borrow::Cow;
use std::collections::BTreeMap;

use log::{debug, trace};

use crate::error::PdfResult;
use crate::pdf::{Dictionary, IndirectObject, Object, ObjectId, WritePdf, XrefTable};

/// Marks the file as binary for transfer tools
const BINARY_COMMENT: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Write `objects` (ascending id order) as a complete PDF file
///
/// `trailer` supplies `/Root` and optional `/Info`; `/Size` is computed.
pub(crate) fn write_file<'a>(
    version: &str,
    objects: impl IntoIterator<Item = (ObjectId, &'a Object)>,
    trailer: &Dictionary,
    compress_streams: bool,
) -> PdfResult<Vec<u8>> {
    let mut output = Vec::new();
    output.extend_from_slice(format!("%PDF-{}\n", version).as_bytes());
    output.extend_from_slice(BINARY_COMMENT);

    let mut offsets = BTreeMap::new();
    for (id, object) in objects {
        let object = if compress_streams {
            compressed(object)?
        } else {
            Cow::Borrowed(object)
        };
        trace!("Writing object {} {} R at offset {}", id.0, id.1, output.len());
        offsets.insert(id.0, (output.len(), id.1));
        IndirectObject::new(id, &object).write_to(&mut output);
    }

    let xref_offset = output.len();
    XrefTable::write_classic(&offsets, &mut output);

    let mut trailer = trailer.clone();
    let size = offsets.keys().next_back().map_or(1, |&max| max + 1);
    trailer.set("Size", size);
    output.extend_from_slice(b"trailer\n");
    trailer.write_to(&mut output);
    output.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());

    debug!("Wrote {} objects, {} bytes", offsets.len(), output.len());
    Ok(output)
}

/// Flate-encode a stream that has no filter yet
fn compressed(object: &Object) -> PdfResult<Cow<'_, Object>> {
    match object {
        Object::Stream(stream) if !stream.is_compressed() => {
            let mut stream = stream.clone();
            stream.compress()?;
            Ok(Cow::Owned(Object::Stream(stream)))
        }
        _ => Ok(Cow::Borrowed(object)),
    }
}
