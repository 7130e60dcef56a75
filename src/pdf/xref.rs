//! PDF cross-reference table implementation

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder};
use log::{trace, warn};

use crate::error::{PdfError, PdfResult};
use super::{Dictionary, Lexer, Object, Stream, Token};

/// Location of one object number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free,
    /// Uncompressed object at a byte offset
    Normal { offset: usize, generation: u16 },
    /// Object stored inside an object stream
    Compressed { container: u32, index: usize },
}

/// PDF cross-reference table
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: BTreeMap<u32, XrefEntry>,
}

impl XrefTable {
    /// Create new xref table
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    pub fn insert(&mut self, number: u32, entry: XrefEntry) {
        self.entries.insert(number, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &XrefEntry)> {
        self.entries.iter().map(|(&number, entry)| (number, entry))
    }

    /// Fold in an older section; entries already present are newer and win
    pub fn merge_older(&mut self, older: XrefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
    }

    /// Parse a classic table; `lexer` is positioned right after the `xref` keyword.
    /// Stops before the `trailer` keyword.
    pub fn parse_table(lexer: &mut Lexer) -> PdfResult<XrefTable> {
        let mut table = XrefTable::new();

        loop {
            let checkpoint = lexer.position();
            let start = match lexer.next_token()? {
                Some(Token::Integer(start)) => u32::try_from(start)
                    .map_err(|_| PdfError::parse(checkpoint, format!("Xref subsection start {} out of range", start)))?,
                Some(Token::Keyword(ref k)) if k == b"trailer" => {
                    lexer.set_position(checkpoint);
                    break;
                }
                other => {
                    return Err(PdfError::parse(
                        checkpoint,
                        format!("Invalid xref subsection header: {:?}", other),
                    ))
                }
            };
            let count = match lexer.next_token()? {
                Some(Token::Integer(count)) => u32::try_from(count)
                    .map_err(|_| PdfError::parse(lexer.position(), format!("Xref count {} out of range", count)))?,
                _ => return Err(PdfError::parse(lexer.position(), "Invalid xref count")),
            };
            if count > 0 && start.checked_add(count - 1).is_none() {
                return Err(PdfError::parse(
                    checkpoint,
                    format!("Xref subsection {} +{} exceeds object number range", start, count),
                ));
            }
            trace!("Xref subsection {} +{}", start, count);

            // Each entry takes 20 bytes, so the remaining data bounds the count
            let remaining = lexer.data().len().saturating_sub(lexer.position()) / 20;
            let mut section = Vec::with_capacity((count as usize).min(remaining));
            for _ in 0..count {
                let offset = match lexer.next_token()? {
                    Some(Token::Integer(offset)) if offset >= 0 => offset as usize,
                    _ => return Err(PdfError::parse(lexer.position(), "Invalid xref offset")),
                };
                let generation = match lexer.next_token()? {
                    Some(Token::Integer(generation)) => generation.clamp(0, u16::MAX as i64) as u16,
                    _ => return Err(PdfError::parse(lexer.position(), "Invalid xref generation")),
                };
                let entry = match lexer.next_token()? {
                    Some(Token::Keyword(ref k)) if k == b"n" => XrefEntry::Normal { offset, generation },
                    Some(Token::Keyword(ref k)) if k == b"f" => XrefEntry::Free,
                    _ => return Err(PdfError::parse(lexer.position(), "Invalid xref entry type")),
                };
                section.push(entry);
            }

            // Some writers number the first subsection from 1 while still
            // listing the free head entry of object 0
            let start = if start == 1 && section.first() == Some(&XrefEntry::Free) {
                warn!("Xref subsection starts at 1 with a free head entry; renumbering from 0");
                0
            } else {
                start
            };

            for (number, entry) in (start..=u32::MAX).zip(section) {
                table.entries.entry(number).or_insert(entry);
            }
        }

        Ok(table)
    }

    /// Decode a cross-reference stream (`/Type /XRef`)
    pub fn parse_stream(stream: &Stream) -> PdfResult<XrefTable> {
        let dict = &stream.dict;
        let widths = dict
            .get_array("W")
            .ok_or_else(|| PdfError::MissingDictionaryEntry("W".to_string()))?
            .iter()
            .map(|w| w.as_i64().map(|w| w.max(0) as usize))
            .collect::<PdfResult<Vec<_>>>()?;
        if widths.len() < 3 || widths.iter().any(|&w| w > 8) {
            return Err(PdfError::malformed("Invalid /W in xref stream"));
        }

        let size = dict.get_integer("Size").unwrap_or(0).max(0);
        let index = match dict.get_array("Index") {
            Some(array) => array
                .chunks(2)
                .filter_map(|pair| match pair {
                    [first, count] => Some((first.as_i64().ok()?, count.as_i64().ok()?)),
                    _ => None,
                })
                .collect(),
            None => vec![(0, size)],
        };

        let data = stream.decompressed_content()?;
        let row_len: usize = widths.iter().sum();
        if row_len == 0 {
            return Err(PdfError::malformed("Zero-width xref stream rows"));
        }

        let mut table = XrefTable::new();
        let mut rows = data.chunks_exact(row_len);
        for (first, count) in index {
            let Some(range) = index_range(first, count) else {
                warn!("Skipping invalid xref stream /Index pair [{} {}]", first, count);
                continue;
            };
            for number in range {
                let Some(row) = rows.next() else {
                    warn!("Xref stream ended before its /Index was exhausted");
                    return Ok(table);
                };
                let (a, rest) = row.split_at(widths[0]);
                let (b, c) = rest.split_at(widths[1]);
                // A zero-width type field defaults to type 1
                let kind = if widths[0] == 0 { 1 } else { read_field(a) };
                let entry = match kind {
                    0 => XrefEntry::Free,
                    1 => XrefEntry::Normal {
                        offset: read_field(b) as usize,
                        generation: read_field(c) as u16,
                    },
                    2 => XrefEntry::Compressed {
                        container: read_field(b) as u32,
                        index: read_field(c) as usize,
                    },
                    // Unknown types are treated as null references
                    _ => XrefEntry::Free,
                };
                table.entries.entry(number).or_insert(entry);
            }
        }

        trace!("Decoded xref stream with {} entries", table.len());
        Ok(table)
    }

    /// Write a classic table for objects at known offsets, one subsection `0..=max`
    pub fn write_classic(offsets: &BTreeMap<u32, (usize, u16)>, output: &mut Vec<u8>) {
        let size = offsets.keys().next_back().map_or(1, |&max| max + 1);
        output.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        output.extend_from_slice(b"0000000000 65535 f \n");
        for number in 1..size {
            match offsets.get(&number) {
                Some((offset, generation)) => {
                    output.extend_from_slice(format!("{:010} {:05} n \n", offset, generation).as_bytes());
                }
                None => output.extend_from_slice(b"0000000000 00001 f \n"),
            }
        }
    }
}

fn read_field(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        BigEndian::read_uint(bytes, bytes.len())
    }
}

/// Trailer keys carried over from an xref stream dictionary
pub(crate) fn trailer_from_xref_stream(dict: &Dictionary) -> Dictionary {
    dict.iter()
        .filter(|(key, _)| {
            !matches!(
                key.as_slice(),
                b"Type" | b"W" | b"Index" | b"Length" | b"Filter" | b"DecodeParms"
            )
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<Dictionary>()
}

/// Object numbers covered by an `/Index` pair, if they fit in `u32`
fn index_range(first: i64, count: i64) -> Option<std::ops::Range<u32>> {
    let first = u32::try_from(first).ok()?;
    let count = u32::try_from(count).ok()?;
    let end = first.checked_add(count)?;
    Some(first..end)
}

/// Whether a dictionary looks like an xref stream
pub(crate) fn is_xref_stream(object: &Object) -> bool {
    matches!(object, Object::Stream(stream) if stream.dict.type_is("XRef"))
}
