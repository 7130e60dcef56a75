//! PDF parsing and object model module

mod dict;
mod filter;
mod lexer;
mod object;
mod parser;
mod repair;
mod stream;
mod xref;

pub use dict::Dictionary;
pub use filter::Filter;
pub use object::{IndirectObject, Object, ObjectId, StringFormat};
pub use stream::Stream;

pub(crate) use lexer::{Lexer, Token};
pub(crate) use parser::{DocumentParser, ObjectParser};
pub(crate) use xref::XrefTable;

/// Canonical PDF serialization shared by the writer and the fingerprinting code
pub trait WritePdf {
    /// Append the PDF syntax for `self` to `output`
    fn write_to(&self, output: &mut Vec<u8>);

    /// Serialize into a fresh buffer
    fn to_pdf_bytes(&self) -> Vec<u8> {
        let mut output = Vec::new();
        self.write_to(&mut output);
        output
    }
}

/// PDF whitespace characters (ISO 32000-1, table 1)
pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

/// PDF delimiter characters (ISO 32000-1, table 2)
pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

pub(crate) fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// Find `needle` in `haystack` starting at `from`
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| from + idx)
}

/// Find the last occurrence of `needle` in `haystack`
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|window| window == needle)
}
