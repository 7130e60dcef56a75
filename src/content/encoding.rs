//! Font encodings, ToUnicode CMaps and PDF text strings

use std::collections::HashMap;

use encoding_rs::{Encoding, MACINTOSH, UTF_16BE, WINDOWS_1252};
use log::{debug, trace, warn};

use crate::document::Document;
use crate::error::PdfError;
use crate::pdf::{Dictionary, Lexer, Object, Token};

const REPLACEMENT: char = '\u{FFFD}';
const MAX_BFRANGE_SPAN: u32 = 0x1_0000;

/// PDFDocEncoding 0x18..=0x1F
const PDF_DOC_LOW: [char; 8] = [
    '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}',
];

/// PDFDocEncoding 0x80..=0x9E
const PDF_DOC_HIGH: [char; 31] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}',
];

fn pdf_doc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1f => PDF_DOC_LOW[(byte - 0x18) as usize],
        0x80..=0x9e => PDF_DOC_HIGH[(byte - 0x80) as usize],
        0xa0 => '\u{20AC}',
        0x7f | 0x9f | 0xad => REPLACEMENT,
        _ => byte as char,
    }
}

/// Decode a PDF text string: UTF-16BE or UTF-8 with a byte order mark,
/// PDFDocEncoding otherwise
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xfe, 0xff]) {
        let (text, _) = UTF_16BE.decode_without_bom_handling(utf16);
        return text.into_owned();
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xef, 0xbb, 0xbf]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| pdf_doc_char(b)).collect()
}

/// Encode text as PDFDocEncoding when every character has a code, UTF-16BE with BOM otherwise
pub fn encode_text_string(text: &str) -> Vec<u8> {
    let pdf_doc: Option<Vec<u8>> = text.chars().map(pdf_doc_byte).collect();
    match pdf_doc {
        Some(bytes) => bytes,
        None => {
            let mut bytes = vec![0xfe, 0xff];
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            bytes
        }
    }
}

fn pdf_doc_byte(c: char) -> Option<u8> {
    let code = c as u32;
    if code < 0x80 && code != 0x7f && !(0x18..=0x1f).contains(&code) {
        return Some(code as u8);
    }
    (0x18..=0xffu8).find(|&b| (b < 0x20 || b >= 0x80) && pdf_doc_char(b) == c)
}

/// Single-byte base encodings a simple font can name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseEncoding {
    Standard,
    WinAnsi,
    MacRoman,
    PdfDoc,
}

impl BaseEncoding {
    /// Encoding for an `/Encoding` or `/BaseEncoding` name
    pub fn from_name(name: &[u8]) -> Result<Self, PdfError> {
        match name {
            b"StandardEncoding" => Ok(Self::Standard),
            b"WinAnsiEncoding" => Ok(Self::WinAnsi),
            b"MacRomanEncoding" => Ok(Self::MacRoman),
            b"PDFDocEncoding" => Ok(Self::PdfDoc),
            other => Err(PdfError::UnsupportedEncoding(String::from_utf8_lossy(other).into_owned())),
        }
    }

    /// Full 256-entry code table
    pub fn table(self) -> Vec<char> {
        match self {
            Self::Standard => (0..=255u8).map(standard_char).collect(),
            Self::PdfDoc => (0..=255u8).map(pdf_doc_char).collect(),
            Self::WinAnsi => single_byte_table(WINDOWS_1252),
            Self::MacRoman => single_byte_table(MACINTOSH),
        }
    }
}

fn single_byte_table(encoding: &'static Encoding) -> Vec<char> {
    let all: Vec<u8> = (0..=255u8).collect();
    let (decoded, _) = encoding.decode_without_bom_handling(&all);
    let table: Vec<char> = decoded.chars().collect();
    if table.len() == 256 {
        table
    } else {
        (0..=255u8).map(|b| b as char).collect()
    }
}

/// Adobe StandardEncoding; unassigned codes fall back to Latin-1
fn standard_char(byte: u8) -> char {
    let code = match byte {
        0x27 => 0x2019,
        0x60 => 0x2018,
        0xa4 => 0x2044,
        0xa6 => 0x0192,
        0xa8 => 0x00a4,
        0xa9 => 0x0027,
        0xaa => 0x201c,
        0xac => 0x2039,
        0xad => 0x203a,
        0xae => 0xfb01,
        0xaf => 0xfb02,
        0xb1 => 0x2013,
        0xb2 => 0x2020,
        0xb3 => 0x2021,
        0xb4 => 0x00b7,
        0xb7 => 0x2022,
        0xb8 => 0x201a,
        0xb9 => 0x201e,
        0xba => 0x201d,
        0xbc => 0x2026,
        0xbd => 0x2030,
        0xc1 => 0x0060,
        0xc2 => 0x00b4,
        0xc3 => 0x02c6,
        0xc4 => 0x02dc,
        0xc5 => 0x00af,
        0xc6 => 0x02d8,
        0xc7 => 0x02d9,
        0xc8 => 0x00a8,
        0xca => 0x02da,
        0xcb => 0x00b8,
        0xcd => 0x02dd,
        0xce => 0x02db,
        0xcf => 0x02c7,
        0xd0 => 0x2014,
        0xe1 => 0x00c6,
        0xe3 => 0x00aa,
        0xe8 => 0x0141,
        0xe9 => 0x00d8,
        0xea => 0x0152,
        0xeb => 0x00ba,
        0xf1 => 0x00e6,
        0xf5 => 0x0131,
        0xf8 => 0x0142,
        0xf9 => 0x00f8,
        0xfa => 0x0153,
        0xfb => 0x00df,
        other => other as u32,
    };
    char::from_u32(code).unwrap_or(REPLACEMENT)
}

/// Map a glyph name to text: `uniXXXX`, `uXXXX[XX]`, ligatures joined by `_`,
/// suffixes after `.` ignored, and a list of common names
pub fn glyph_to_unicode(name: &str) -> Option<String> {
    let base = name.split('.').next().unwrap_or(name);
    if base.is_empty() {
        return None;
    }
    if base.contains('_') {
        return base.split('_').map(glyph_to_unicode).collect();
    }
    if let Some(hex) = base.strip_prefix("uni") {
        if hex.is_ascii() && hex.len() >= 4 && hex.len() % 4 == 0 {
            let units: Option<Vec<u16>> = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect();
            if let Some(units) = units {
                return Some(String::from_utf16_lossy(&units));
            }
        }
    }
    if let Some(hex) = base.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                return Some(c.to_string());
            }
        }
    }
    if base.len() == 1 && base.as_bytes()[0].is_ascii_alphabetic() {
        return Some(base.to_string());
    }
    named_glyph(base).map(|c| c.to_string())
}

fn named_glyph(name: &str) -> Option<char> {
    let c = match name {
        "space" | "nbspace" => ' ',
        "exclam" => '!',
        "quotedbl" => '"',
        "numbersign" => '#',
        "dollar" => '$',
        "percent" => '%',
        "ampersand" => '&',
        "quotesingle" => '\'',
        "parenleft" => '(',
        "parenright" => ')',
        "asterisk" => '*',
        "plus" => '+',
        "comma" => ',',
        "hyphen" | "sfthyphen" => '-',
        "period" => '.',
        "slash" => '/',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "colon" => ':',
        "semicolon" => ';',
        "less" => '<',
        "equal" => '=',
        "greater" => '>',
        "question" => '?',
        "at" => '@',
        "bracketleft" => '[',
        "backslash" => '\\',
        "bracketright" => ']',
        "asciicircum" => '^',
        "underscore" => '_',
        "grave" => '`',
        "braceleft" => '{',
        "bar" => '|',
        "braceright" => '}',
        "asciitilde" => '~',
        "quoteleft" => '\u{2018}',
        "quoteright" => '\u{2019}',
        "quotedblleft" => '\u{201C}',
        "quotedblright" => '\u{201D}',
        "quotesinglbase" => '\u{201A}',
        "quotedblbase" => '\u{201E}',
        "guillemotleft" => '\u{00AB}',
        "guillemotright" => '\u{00BB}',
        "guilsinglleft" => '\u{2039}',
        "guilsinglright" => '\u{203A}',
        "endash" => '\u{2013}',
        "emdash" => '\u{2014}',
        "minus" => '\u{2212}',
        "bullet" => '\u{2022}',
        "ellipsis" => '\u{2026}',
        "dagger" => '\u{2020}',
        "daggerdbl" => '\u{2021}',
        "perthousand" => '\u{2030}',
        "trademark" => '\u{2122}',
        "copyright" => '\u{00A9}',
        "registered" => '\u{00AE}',
        "degree" => '\u{00B0}',
        "section" => '\u{00A7}',
        "paragraph" => '\u{00B6}',
        "periodcentered" => '\u{00B7}',
        "exclamdown" => '\u{00A1}',
        "questiondown" => '\u{00BF}',
        "cent" => '\u{00A2}',
        "sterling" => '\u{00A3}',
        "yen" => '\u{00A5}',
        "Euro" | "euro" => '\u{20AC}',
        "currency" => '\u{00A4}',
        "florin" => '\u{0192}',
        "fraction" => '\u{2044}',
        "multiply" => '\u{00D7}',
        "divide" => '\u{00F7}',
        "plusminus" => '\u{00B1}',
        "onehalf" => '\u{00BD}',
        "onequarter" => '\u{00BC}',
        "threequarters" => '\u{00BE}',
        "ordfeminine" => '\u{00AA}',
        "ordmasculine" => '\u{00BA}',
        "acute" => '\u{00B4}',
        "dieresis" => '\u{00A8}',
        "macron" => '\u{00AF}',
        "cedilla" => '\u{00B8}',
        "circumflex" => '\u{02C6}',
        "tilde" => '\u{02DC}',
        "breve" => '\u{02D8}',
        "dotaccent" => '\u{02D9}',
        "ring" => '\u{02DA}',
        "ogonek" => '\u{02DB}',
        "caron" => '\u{02C7}',
        "hungarumlaut" => '\u{02DD}',
        "fi" => '\u{FB01}',
        "fl" => '\u{FB02}',
        "ff" => '\u{FB00}',
        "ffi" => '\u{FB03}',
        "ffl" => '\u{FB04}',
        "dotlessi" => '\u{0131}',
        "germandbls" => '\u{00DF}',
        "AE" => '\u{00C6}',
        "ae" => '\u{00E6}',
        "OE" => '\u{0152}',
        "oe" => '\u{0153}',
        "Oslash" => '\u{00D8}',
        "oslash" => '\u{00F8}',
        "Lslash" => '\u{0141}',
        "lslash" => '\u{0142}',
        "Eth" => '\u{00D0}',
        "eth" => '\u{00F0}',
        "Thorn" => '\u{00DE}',
        "thorn" => '\u{00FE}',
        "Scaron" => '\u{0160}',
        "scaron" => '\u{0161}',
        "Zcaron" => '\u{017D}',
        "zcaron" => '\u{017E}',
        "Ydieresis" => '\u{0178}',
        _ => return accented_latin(name),
    };
    Some(c)
}

/// `Aacute`, `egrave`, `Ntilde` and friends in the Latin-1 block
fn accented_latin(name: &str) -> Option<char> {
    let mut chars = name.chars();
    let letter = chars.next()?;
    let accent = chars.as_str();
    let upper = letter.is_ascii_uppercase();
    let code: u32 = match (letter.to_ascii_lowercase(), accent) {
        ('a', "grave") => 0xe0,
        ('a', "acute") => 0xe1,
        ('a', "circumflex") => 0xe2,
        ('a', "tilde") => 0xe3,
        ('a', "dieresis") => 0xe4,
        ('a', "ring") => 0xe5,
        ('c', "cedilla") => 0xe7,
        ('e', "grave") => 0xe8,
        ('e', "acute") => 0xe9,
        ('e', "circumflex") => 0xea,
        ('e', "dieresis") => 0xeb,
        ('i', "grave") => 0xec,
        ('i', "acute") => 0xed,
        ('i', "circumflex") => 0xee,
        ('i', "dieresis") => 0xef,
        ('n', "tilde") => 0xf1,
        ('o', "grave") => 0xf2,
        ('o', "acute") => 0xf3,
        ('o', "circumflex") => 0xf4,
        ('o', "tilde") => 0xf5,
        ('o', "dieresis") => 0xf6,
        ('u', "grave") => 0xf9,
        ('u', "acute") => 0xfa,
        ('u', "circumflex") => 0xfb,
        ('u', "dieresis") => 0xfc,
        ('y', "acute") => 0xfd,
        ('y', "dieresis") if !upper => 0xff,
        _ => return None,
    };
    char::from_u32(if upper { code - 0x20 } else { code })
}

/// A parsed `/ToUnicode` CMap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CMap {
    mappings: HashMap<u32, String>,
    /// Code widths in bytes, ascending
    code_lengths: Vec<usize>,
}

impl CMap {
    /// Parse `bfchar`, `bfrange` and `codespacerange` sections; anything else is ignored
    pub fn parse(data: &[u8]) -> Self {
        let mut cmap = CMap::default();
        let mut lexer = Lexer::new(data);
        let mut operands: Vec<Token> = Vec::new();
        let mut section: Option<Vec<u8>> = None;

        loop {
            let token = match lexer.next_token() {
                Ok(Some(token)) => token,
                Ok(None) => break,
                Err(e) => {
                    trace!("Skipping malformed CMap token: {}", e);
                    let pos = lexer.position();
                    lexer.set_position(pos + 1);
                    continue;
                }
            };

            match token {
                Token::Keyword(keyword) => match keyword.as_slice() {
                    b"begincodespacerange" | b"beginbfchar" | b"beginbfrange" => {
                        section = Some(keyword);
                        operands.clear();
                    }
                    b"endcodespacerange" | b"endbfchar" | b"endbfrange" => {
                        section = None;
                        operands.clear();
                    }
                    _ => operands.clear(),
                },
                Token::ArrayStart if section.as_deref() == Some(&b"beginbfrange"[..]) => {
                    let mut items = Vec::new();
                    while let Ok(Some(item)) = lexer.next_token() {
                        match item {
                            Token::ArrayEnd => break,
                            Token::HexString(bytes) => items.push(bytes),
                            _ => {}
                        }
                    }
                    if let [Token::HexString(lo), Token::HexString(hi)] = operands.as_slice() {
                        cmap.add_range_array(lo, hi, &items);
                    }
                    operands.clear();
                }
                token => {
                    operands.push(token);
                    cmap.consume(section.as_deref(), &mut operands);
                }
            }
        }

        cmap.code_lengths.sort_unstable();
        cmap.code_lengths.dedup();
        debug!("Parsed ToUnicode CMap with {} mappings", cmap.mappings.len());
        cmap
    }

    fn consume(&mut self, section: Option<&[u8]>, operands: &mut Vec<Token>) {
        match (section, operands.as_slice()) {
            (Some(b"begincodespacerange"), [Token::HexString(lo), Token::HexString(_)]) => {
                self.note_length(lo.len());
                operands.clear();
            }
            (Some(b"beginbfchar"), [Token::HexString(src), dst]) => {
                let text = match dst {
                    Token::HexString(bytes) => Some(utf16_to_string(bytes)),
                    Token::Name(name) => glyph_to_unicode(&String::from_utf8_lossy(name)),
                    _ => None,
                };
                if let Some(text) = text {
                    self.note_length(src.len());
                    self.mappings.insert(code_value(src), text);
                }
                operands.clear();
            }
            (Some(b"beginbfrange"), [Token::HexString(lo), Token::HexString(hi), Token::HexString(dst)]) => {
                let (lo_code, hi_code) = (code_value(lo), code_value(hi));
                if hi_code >= lo_code && hi_code - lo_code < MAX_BFRANGE_SPAN {
                    self.note_length(lo.len());
                    let mut units = utf16_units(dst);
                    for code in lo_code..=hi_code {
                        self.mappings.insert(code, String::from_utf16_lossy(&units));
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add(1);
                        }
                    }
                }
                operands.clear();
            }
            (Some(b"begincodespacerange" | b"beginbfchar" | b"beginbfrange"), ops) if ops.len() < 3 => {}
            _ => operands.clear(),
        }
    }

    fn add_range_array(&mut self, lo: &[u8], hi: &[u8], items: &[Vec<u8>]) {
        let (lo_code, hi_code) = (code_value(lo), code_value(hi));
        if hi_code < lo_code {
            return;
        }
        self.note_length(lo.len());
        for (code, dst) in (lo_code..=hi_code).zip(items) {
            self.mappings.insert(code, utf16_to_string(dst));
        }
    }

    fn note_length(&mut self, len: usize) {
        if (1..=4).contains(&len) && !self.code_lengths.contains(&len) {
            self.code_lengths.push(len);
        }
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.mappings.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().take(4).fold(0, |acc, &b| (acc << 8) | b as u32)
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    if bytes.len() == 1 {
        return vec![bytes[0] as u16];
    }
    bytes.chunks(2).map(|pair| match pair {
        [hi, lo] => u16::from_be_bytes([*hi, *lo]),
        [single] => *single as u16,
        _ => 0,
    }).collect()
}

fn utf16_to_string(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

#[derive(Debug, Clone, PartialEq)]
enum FontKind {
    /// One byte per code, mapped through a 256-entry table
    Simple(Vec<char>),
    /// Type0 font; only a ToUnicode map can make sense of its codes
    Composite,
}

/// Turns string operand bytes into text for one font
#[derive(Debug, Clone, PartialEq)]
pub struct FontDecoder {
    kind: FontKind,
    to_unicode: Option<CMap>,
}

impl Default for FontDecoder {
    fn default() -> Self {
        Self::standard()
    }
}

impl FontDecoder {
    /// Decoder used when no usable font is selected
    pub fn standard() -> Self {
        Self {
            kind: FontKind::Simple(BaseEncoding::Standard.table()),
            to_unicode: None,
        }
    }

    pub fn with_encoding(encoding: BaseEncoding) -> Self {
        Self {
            kind: FontKind::Simple(encoding.table()),
            to_unicode: None,
        }
    }

    /// Build a decoder from a font dictionary. Never fails: problems degrade
    /// to best-effort output and are logged.
    pub fn from_font(document: &Document, font: &Dictionary) -> Self {
        let to_unicode = font
            .get("ToUnicode")
            .and_then(|obj| document.dereference(obj).ok())
            .and_then(|obj| match obj {
                Object::Stream(stream) => {
                    let data = stream.decompressed_content().unwrap_or_else(|e| {
                        warn!("ToUnicode stream not decodable, using raw bytes: {}", e);
                        stream.content.clone()
                    });
                    Some(CMap::parse(&data))
                }
                _ => None,
            })
            .filter(|cmap| !cmap.is_empty());

        if font.get_name("Subtype") == Some("Type0") {
            if to_unicode.is_none() {
                debug!("Type0 font without ToUnicode; glyphs will be replaced");
            }
            return Self {
                kind: FontKind::Composite,
                to_unicode,
            };
        }

        Self {
            kind: FontKind::Simple(simple_font_table(document, font)),
            to_unicode,
        }
    }

    /// Decode the bytes of a string operand
    pub fn decode(&self, bytes: &[u8]) -> String {
        match (&self.kind, &self.to_unicode) {
            (FontKind::Simple(table), None) => bytes.iter().map(|&b| table[b as usize]).collect(),
            (FontKind::Simple(table), Some(cmap)) => {
                let mut text = String::new();
                for &byte in bytes {
                    match cmap.get(byte as u32) {
                        Some(mapped) => text.push_str(mapped),
                        None => text.push(table[byte as usize]),
                    }
                }
                text
            }
            (FontKind::Composite, None) => bytes.chunks(2).map(|_| REPLACEMENT).collect(),
            (FontKind::Composite, Some(cmap)) => decode_multibyte(cmap, bytes),
        }
    }
}

fn decode_multibyte(cmap: &CMap, bytes: &[u8]) -> String {
    let lengths: &[usize] = if cmap.code_lengths.is_empty() { &[2] } else { &cmap.code_lengths };
    let mut text = String::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let matched = lengths.iter().find_map(|&len| {
            let code = bytes.get(pos..pos + len)?;
            cmap.get(code_value(code)).map(|mapped| (len, mapped))
        });
        match matched {
            Some((len, mapped)) => {
                text.push_str(mapped);
                pos += len;
            }
            None => {
                text.push(REPLACEMENT);
                pos += lengths[0];
            }
        }
    }
    text
}

fn simple_font_table(document: &Document, font: &Dictionary) -> Vec<char> {
    let base_from_name = |name: &[u8]| match BaseEncoding::from_name(name) {
        Ok(encoding) => encoding,
        Err(e) => {
            warn!("{}; falling back to StandardEncoding", e);
            BaseEncoding::Standard
        }
    };

    let encoding = font.get("Encoding").and_then(|obj| document.dereference(obj).ok());
    match encoding {
        Some(Object::Name(name)) => base_from_name(name).table(),
        Some(Object::Dictionary(dict)) => {
            let mut table = match dict.get("BaseEncoding") {
                Some(Object::Name(name)) => base_from_name(name).table(),
                _ => BaseEncoding::Standard.table(),
            };
            if let Some(differences) = dict.get("Differences").and_then(|d| document.resolve_array(d).ok()) {
                apply_differences(&mut table, differences);
            }
            table
        }
        _ => BaseEncoding::Standard.table(),
    }
}

/// `[code /name /name code /name ...]`; names past 255 or unknown glyphs are ignored
fn apply_differences(table: &mut [char], differences: &[Object]) {
    let mut code: Option<usize> = None;
    for item in differences {
        match item {
            Object::Integer(n) => code = usize::try_from(*n).ok(),
            Object::Name(name) => {
                let Some(current) = code else { continue };
                if current < table.len() {
                    let glyph = String::from_utf8_lossy(name);
                    match glyph_to_unicode(&glyph).and_then(|text| text.chars().next()) {
                        Some(c) => table[current] = c,
                        None => trace!("Unknown glyph name /{} at code {}", glyph, current),
                    }
                }
                code = Some(current + 1);
            }
            _ => {}
        }
    }
}
