//! PDF document engine for Rust
//!
//! Parses PDF files into an in-memory object graph, extracts text from page
//! content streams, and assembles new files from pages of existing ones.
//! Copied resources that are byte-identical are stored once.
//!
//! ```no_run
//! use pdf_assembler::{PdfReader, PdfWriter};
//!
//! # fn main() -> pdf_assembler::PdfResult<()> {
//! let reader = PdfReader::open("crazyones.pdf")?;
//! println!("{}", reader.get_page(0)?.extract_text()?);
//!
//! let mut writer = PdfWriter::new();
//! writer.append_pages_from_reader(&reader)?;
//! writer.add_js("this.print({bUI:true,bSilent:false,bShrinkToFit:true});");
//! writer.save("out.pdf")?;
//! # Ok(())
//! # }
//! ```

mod content;
mod document;
mod error;
mod pdf;
mod reader;
mod writer;

pub use content::{
    decode_operations, decode_text_string, encode_text_string, BaseEncoding, CMap, FontDecoder, Operation,
    TextExtractor, TextOptions,
};
pub use document::{Document, ObjectTable, INHERITABLE_PAGE_KEYS};
pub use error::{PdfError, PdfResult};
pub use pdf::{Dictionary, Filter, IndirectObject, Object, ObjectId, Stream, StringFormat, WritePdf};
pub use reader::{Page, PdfReader, ReaderOptions};
pub use writer::{PdfWriter, WriterOptions};
