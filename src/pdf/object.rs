//! PDF object types and serialization

use crate::content::encoding::{decode_text_string, encode_text_string};
use crate::error::{PdfError, PdfResult};
use super::{is_regular, Dictionary, Stream, WritePdf};

/// Object number and generation number of an indirect object
pub type ObjectId = (u32, u16);

/// How a string was spelled in the source, kept so rewriting preserves it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringFormat {
    /// `(text)` form
    Literal,
    /// `<hex>` form
    Hexadecimal,
}

/// PDF object types
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer number
    Integer(i64),
    /// Real number
    Real(f64),
    /// String value (literal or hexadecimal)
    String(Vec<u8>, StringFormat),
    /// Name object, `#xx` escapes already decoded
    Name(Vec<u8>),
    /// Array object
    Array(Vec<Object>),
    /// Dictionary object
    Dictionary(Dictionary),
    /// Stream object
    Stream(Stream),
    /// Indirect reference
    Reference(ObjectId),
}

impl Object {
    /// Create a name object
    pub fn name(name: impl Into<Vec<u8>>) -> Self {
        Object::Name(name.into())
    }

    /// Create a literal string object from raw bytes
    pub fn string_literal(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into(), StringFormat::Literal)
    }

    /// Create a text string, PDFDocEncoded when possible and UTF-16BE otherwise
    pub fn text(text: &str) -> Self {
        Object::String(encode_text_string(text), StringFormat::Literal)
    }

    /// Name of the variant, used in type mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(..) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    fn mismatch(&self, expected: &'static str) -> PdfError {
        PdfError::InvalidObjectType {
            expected,
            found: self.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn as_bool(&self) -> PdfResult<bool> {
        match self {
            Object::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch("Boolean")),
        }
    }

    pub fn as_i64(&self) -> PdfResult<i64> {
        match self {
            Object::Integer(n) => Ok(*n),
            _ => Err(self.mismatch("Integer")),
        }
    }

    /// Numeric value of an integer or real
    pub fn as_f64(&self) -> PdfResult<f64> {
        match self {
            Object::Integer(n) => Ok(*n as f64),
            Object::Real(n) => Ok(*n),
            _ => Err(self.mismatch("Number")),
        }
    }

    pub fn as_name(&self) -> PdfResult<&[u8]> {
        match self {
            Object::Name(name) => Ok(name),
            _ => Err(self.mismatch("Name")),
        }
    }

    /// Name as UTF-8, lossless names only
    pub fn as_name_str(&self) -> PdfResult<&str> {
        std::str::from_utf8(self.as_name()?)
            .map_err(|_| PdfError::InvalidObjectType {
                expected: "UTF-8 Name",
                found: "Name",
            })
    }

    /// Raw bytes of a string object
    pub fn as_str(&self) -> PdfResult<&[u8]> {
        match self {
            Object::String(bytes, _) => Ok(bytes),
            _ => Err(self.mismatch("String")),
        }
    }

    /// Decode a text string (UTF-16BE with BOM, UTF-8 with BOM, or PDFDocEncoding)
    pub fn as_text(&self) -> PdfResult<String> {
        Ok(decode_text_string(self.as_str()?))
    }

    pub fn as_array(&self) -> PdfResult<&Vec<Object>> {
        match self {
            Object::Array(array) => Ok(array),
            _ => Err(self.mismatch("Array")),
        }
    }

    pub fn as_array_mut(&mut self) -> PdfResult<&mut Vec<Object>> {
        match self {
            Object::Array(array) => Ok(array),
            _ => Err(self.mismatch("Array")),
        }
    }

    /// Dictionary of a dictionary or stream object
    pub fn as_dict(&self) -> PdfResult<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Ok(dict),
            Object::Stream(stream) => Ok(&stream.dict),
            _ => Err(self.mismatch("Dictionary")),
        }
    }

    pub fn as_dict_mut(&mut self) -> PdfResult<&mut Dictionary> {
        match self {
            Object::Dictionary(dict) => Ok(dict),
            Object::Stream(stream) => Ok(&mut stream.dict),
            _ => Err(self.mismatch("Dictionary")),
        }
    }

    pub fn as_stream(&self) -> PdfResult<&Stream> {
        match self {
            Object::Stream(stream) => Ok(stream),
            _ => Err(self.mismatch("Stream")),
        }
    }

    pub fn as_stream_mut(&mut self) -> PdfResult<&mut Stream> {
        match self {
            Object::Stream(stream) => Ok(stream),
            _ => Err(self.mismatch("Stream")),
        }
    }

    pub fn as_reference(&self) -> PdfResult<ObjectId> {
        match self {
            Object::Reference(id) => Ok(*id),
            _ => Err(self.mismatch("Reference")),
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(value)
    }
}

impl From<Dictionary> for Object {
    fn from(value: Dictionary) -> Self {
        Object::Dictionary(value)
    }
}

impl From<Stream> for Object {
    fn from(value: Stream) -> Self {
        Object::Stream(value)
    }
}

impl From<ObjectId> for Object {
    fn from(value: ObjectId) -> Self {
        Object::Reference(value)
    }
}

impl WritePdf for Object {
    fn write_to(&self, output: &mut Vec<u8>) {
        match self {
            Object::Null => output.extend_from_slice(b"null"),
            Object::Boolean(true) => output.extend_from_slice(b"true"),
            Object::Boolean(false) => output.extend_from_slice(b"false"),
            Object::Integer(n) => output.extend_from_slice(n.to_string().as_bytes()),
            Object::Real(n) => write_real(*n, output),
            Object::String(bytes, StringFormat::Literal) => write_literal_string(bytes, output),
            Object::String(bytes, StringFormat::Hexadecimal) => {
                output.push(b'<');
                output.extend_from_slice(hex::encode_upper(bytes).as_bytes());
                output.push(b'>');
            }
            Object::Name(name) => write_name(name, output),
            Object::Array(items) => {
                output.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        output.push(b' ');
                    }
                    item.write_to(output);
                }
                output.push(b']');
            }
            Object::Dictionary(dict) => dict.write_to(output),
            Object::Stream(stream) => stream.write_to(output),
            Object::Reference((number, generation)) => {
                output.extend_from_slice(format!("{} {} R", number, generation).as_bytes());
            }
        }
    }
}

/// Reals never use exponent notation in PDF
fn write_real(value: f64, output: &mut Vec<u8>) {
    if !value.is_finite() {
        output.push(b'0');
        return;
    }
    let mut text = format!("{:.6}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.push('0');
    }
    if text == "-0.0" {
        text = "0.0".to_string();
    }
    output.extend_from_slice(text.as_bytes());
}

fn write_literal_string(bytes: &[u8], output: &mut Vec<u8>) {
    output.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                output.push(b'\\');
                output.push(byte);
            }
            b'\r' => output.extend_from_slice(b"\\r"),
            _ => output.push(byte),
        }
    }
    output.push(b')');
}

pub(crate) fn write_name(name: &[u8], output: &mut Vec<u8>) {
    output.push(b'/');
    for &byte in name {
        if is_regular(byte) && byte != b'#' && (0x21..=0x7e).contains(&byte) {
            output.push(byte);
        } else {
            output.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

/// An object body paired with its identity, as written to a file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndirectObject<'a> {
    /// Object number and generation
    pub id: ObjectId,
    /// Object body
    pub object: &'a Object,
}

impl<'a> IndirectObject<'a> {
    pub fn new(id: ObjectId, object: &'a Object) -> Self {
        Self { id, object }
    }
}

impl WritePdf for IndirectObject<'_> {
    fn write_to(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(format!("{} {} obj\n", self.id.0, self.id.1).as_bytes());
        self.object.write_to(output);
        output.extend_from_slice(b"\nendobj\n");
    }
}
