//! In-memory PDF fixtures with correctly computed xref offsets

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

pub const CRAZY_ONES_TEXT: &str = "The Crazy Ones";
pub const CRAZY_ONES_CONTENT: &[u8] = b"BT\n/F1 24 Tf\n72 700 Td\n(The Crazy Ones) Tj\nET";

/// Writes objects and records where each one starts
pub struct PdfBuilder {
    data: Vec<u8>,
    /// Object offsets not yet covered by an xref section
    pending: BTreeMap<u32, usize>,
    /// Objects stored in object streams: number -> (container, index)
    compressed: BTreeMap<u32, (u32, u16)>,
    max_number: u32,
    last_xref: Option<usize>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut data = format!("%PDF-{}\n", version).into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            data,
            pending: BTreeMap::new(),
            compressed: BTreeMap::new(),
            max_number: 0,
            last_xref: None,
        }
    }

    fn record(&mut self, number: u32) {
        self.pending.insert(number, self.data.len());
        self.max_number = self.max_number.max(number);
    }

    pub fn object(mut self, number: u32, body: &str) -> Self {
        self.record(number);
        self.data
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
        self
    }

    pub fn stream(mut self, number: u32, dict: &str, content: &[u8]) -> Self {
        self.record(number);
        self.data.extend_from_slice(
            format!("{} 0 obj\n<< /Length {} {} >>\nstream\n", number, content.len(), dict).as_bytes(),
        );
        self.data.extend_from_slice(content);
        self.data.extend_from_slice(b"\nendstream\nendobj\n");
        self
    }

    pub fn flate_stream(self, number: u32, dict: &str, content: &[u8]) -> Self {
        let compressed = deflate(content);
        self.stream(number, &format!("/Filter /FlateDecode {}", dict), &compressed)
    }

    /// Pack `objects` into an object stream
    pub fn object_stream(mut self, number: u32, objects: &[(u32, &str)]) -> Self {
        let mut header = String::new();
        let mut bodies = String::new();
        for (index, (inner, body)) in objects.iter().enumerate() {
            header.push_str(&format!("{} {} ", inner, bodies.len()));
            bodies.push_str(body);
            bodies.push('\n');
            self.compressed.insert(*inner, (number, index as u16));
            self.max_number = self.max_number.max(*inner);
        }
        let dict = format!("/Type /ObjStm /N {} /First {}", objects.len(), header.len());
        let content = format!("{}{}", header, bodies);
        self.stream(number, &dict, content.as_bytes())
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Classic xref section for objects written since the previous one
    pub fn xref(mut self, trailer: &str) -> Self {
        let xref_offset = self.data.len();
        let mut section = String::from("xref\n");
        if self.last_xref.is_none() {
            section.push_str("0 1\n0000000000 65535 f \n");
        }
        for (number, offset) in &self.pending {
            section.push_str(&format!("{} 1\n{:010} 00000 n \n", number, offset));
        }
        let prev = self
            .last_xref
            .map(|offset| format!(" /Prev {}", offset))
            .unwrap_or_default();
        section.push_str(&format!(
            "trailer\n<< /Size {}{} {} >>\nstartxref\n{}\n%%EOF\n",
            self.max_number + 1,
            prev,
            trailer,
            xref_offset
        ));
        self.data.extend_from_slice(section.as_bytes());
        self.pending.clear();
        self.last_xref = Some(xref_offset);
        self
    }

    /// Cross-reference stream as object `number`, covering every object
    pub fn xref_stream(mut self, number: u32, trailer: &str) -> Self {
        let xref_offset = self.data.len();
        self.record(number);
        let size = self.max_number + 1;

        let mut offsets = BTreeMap::new();
        offsets.extend(self.pending.iter().map(|(&n, &offset)| (n, offset)));
        let mut rows = Vec::new();
        for n in 0..size {
            let (kind, field2, field3): (u8, u32, u16) = match (offsets.get(&n), self.compressed.get(&n)) {
                (Some(&offset), _) => (1, offset as u32, 0),
                (None, Some(&(container, index))) => (2, container, index),
                (None, None) => (0, 0, if n == 0 { 65535 } else { 0 }),
            };
            rows.push(kind);
            rows.extend_from_slice(&field2.to_be_bytes());
            rows.extend_from_slice(&field3.to_be_bytes());
        }

        self.data.extend_from_slice(
            format!(
                "{} 0 obj\n<< /Type /XRef /Size {} /W [1 4 2] /Length {} {} >>\nstream\n",
                number,
                size,
                rows.len(),
                trailer
            )
            .as_bytes(),
        );
        self.data.extend_from_slice(&rows);
        self.data.extend_from_slice(b"\nendstream\nendobj\n");
        self.data
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        self.pending.clear();
        self.last_xref = Some(xref_offset);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Objects 1-5 of the one-page "crazy ones" document, without xref
fn crazy_ones_body() -> PdfBuilder {
    PdfBuilder::new("1.4")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>",
        )
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
        )
        .flate_stream(4, "", CRAZY_ONES_CONTENT)
        .object(
            5,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        )
}

/// One page showing "The Crazy Ones" through a Flate content stream
pub fn crazy_ones() -> Vec<u8> {
    crazy_ones_body()
        .object(6, "<< /Title (Crazy Ones) /Producer <FEFF0070006400660074006B> >>")
        .xref("/Root 1 0 R /Info 6 0 R")
        .build()
}

/// Two pages, each drawing its own large image; both share a font
pub fn two_image_pages() -> Vec<u8> {
    PdfBuilder::new("1.4")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 9 0 R >> /XObject << /Im1 7 0 R >> >> /Contents 5 0 R >>",
        )
        .object(
            4,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 9 0 R >> /XObject << /Im1 8 0 R >> >> /Contents 6 0 R >>",
        )
        .stream(5, "", b"q 100 0 0 100 72 500 cm /Im1 Do Q BT /F1 12 Tf 72 72 Td (First image) Tj ET")
        .stream(6, "", b"q 100 0 0 100 72 500 cm /Im1 Do Q BT /F1 12 Tf 72 72 Td (Second image) Tj ET")
        .stream(7, &image_dict(), &image_bytes(1))
        .stream(8, &image_dict(), &image_bytes(2))
        .object(9, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")
        .xref("/Root 1 0 R")
        .build()
}

fn image_dict() -> String {
    "/Type /XObject /Subtype /Image /Width 64 /Height 64 /ColorSpace /DeviceGray \
     /BitsPerComponent 8 /Filter /DCTDecode"
        .to_string()
}

/// Pseudo image payload; different seeds give different bytes
pub fn image_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    let mut state = (seed as u32).wrapping_mul(2_654_435_761);
    for _ in 0..16_384 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        bytes.push((state >> 16) as u8);
    }
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

/// Two levels of `Pages`; resources and media box live on the root node
pub fn nested_page_tree() -> Vec<u8> {
    PdfBuilder::new("1.5")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R 6 0 R] /Count 3 /MediaBox [0 0 595 842] /Rotate 90 \
             /Resources << /Font << /F1 9 0 R >> >> >>",
        )
        .object(3, "<< /Type /Pages /Parent 2 0 R /Kids [4 0 R 5 0 R] /Count 2 >>")
        .object(4, "<< /Type /Page /Parent 3 0 R /Contents 7 0 R >>")
        .object(5, "<< /Type /Page /Parent 3 0 R /Rotate 0 /Contents [8 0 R 10 0 R] >>")
        .object(6, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents 11 0 R >>")
        .stream(7, "", b"BT /F1 12 Tf 72 700 Td (first) Tj ET")
        .stream(8, "", b"BT /F1 12 Tf 72 700 Td (second) Tj")
        .object(9, "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>")
        .stream(10, "", b"0 -14 Td (page) Tj ET")
        .stream(11, "", b"BT /F1 12 Tf 10 10 Td [(third) -400 (page)] TJ ET")
        .xref("/Root 1 0 R")
        .build()
}

/// Valid objects followed by an unreadable xref table
pub fn broken_xref() -> Vec<u8> {
    crazy_ones_body()
        .raw(b"xref\n0 6\n0000000000 65535 f \nthis is not an xref row\n")
        .raw(b"trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n")
        .raw(b"9999999\n%%EOF\n")
        .build()
}

/// A valid xref table whose offsets all point a few bytes early
pub fn shifted_offsets() -> Vec<u8> {
    let mut builder = crazy_ones_body();
    let pending: Vec<(u32, usize)> = builder.pending.iter().map(|(&n, &o)| (n, o)).collect();
    builder.pending = pending.into_iter().map(|(n, offset)| (n, offset - 3)).collect();
    builder.xref("/Root 1 0 R").build()
}

/// No xref and no trailer at all
pub fn objects_only() -> Vec<u8> {
    crazy_ones_body().build()
}

/// The crazy ones document with an incremental update replacing the content
pub fn incremental_update() -> Vec<u8> {
    crazy_ones_body()
        .xref("/Root 1 0 R")
        .stream(4, "", b"BT /F1 24 Tf 72 700 Td (Here's to the crazy ones) Tj ET")
        .object(6, "<< /Title (Updated) >>")
        .xref("/Root 1 0 R /Info 6 0 R")
        .build()
}

/// Catalog, page tree and page inside an object stream, indexed by an xref stream
pub fn xref_stream_document() -> Vec<u8> {
    PdfBuilder::new("1.5")
        .stream(4, "", CRAZY_ONES_CONTENT)
        .object_stream(
            5,
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>"),
            ],
        )
        .xref_stream(6, "/Root 1 0 R")
        .build()
}

/// Header only
pub fn empty_file() -> Vec<u8> {
    b"%PDF-1.4\n%%EOF\n".to_vec()
}
