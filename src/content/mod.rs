//! Content streams: operations, font decoding and text extraction

pub(crate) mod encoding;
mod operation;
mod text;

pub use encoding::{decode_text_string, encode_text_string, BaseEncoding, CMap, FontDecoder};
pub use operation::{decode_operations, Operation};
pub use text::{TextExtractor, TextOptions};
