//! PDF stream filter implementation

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{trace, warn};

use crate::error::{PdfError, PdfResult};
use super::{is_whitespace, Dictionary};

const MAX_LZW_BITS: usize = 12;
const LZW_CLEAR_CODE: usize = 256;
const LZW_EOD_CODE: usize = 257;
const LZW_FIRST_CODE: usize = 258;

/// PDF stream filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCII85Decode,
    ASCIIHexDecode,
    FlateDecode,
    LZWDecode,
    RunLengthDecode,
    CCITTFaxDecode,
    DCTDecode,
    JBIG2Decode,
    JPXDecode,
    Crypt,
}

/// Filter processing context
#[derive(Debug, Clone)]
struct FilterContext {
    predictor: Option<PredictorParams>,
    early_change: bool,
}

impl Default for FilterContext {
    fn default() -> Self {
        Self {
            predictor: None,
            early_change: true,
        }
    }
}

/// Predictor parameters
#[derive(Debug, Clone)]
struct PredictorParams {
    predictor: i64,
    columns: usize,
    colors: usize,
    bits_per_component: usize,
}

impl Filter {
    /// Create filter from its name or inline-image abbreviation
    pub fn from_name(name: &[u8]) -> PdfResult<Self> {
        match name {
            b"ASCII85Decode" | b"A85" => Ok(Filter::ASCII85Decode),
            b"ASCIIHexDecode" | b"AHx" => Ok(Filter::ASCIIHexDecode),
            b"FlateDecode" | b"Fl" => Ok(Filter::FlateDecode),
            b"LZWDecode" | b"LZW" => Ok(Filter::LZWDecode),
            b"RunLengthDecode" | b"RL" => Ok(Filter::RunLengthDecode),
            b"CCITTFaxDecode" | b"CCF" => Ok(Filter::CCITTFaxDecode),
            b"DCTDecode" | b"DCT" => Ok(Filter::DCTDecode),
            b"JBIG2Decode" => Ok(Filter::JBIG2Decode),
            b"JPXDecode" => Ok(Filter::JPXDecode),
            b"Crypt" => Ok(Filter::Crypt),
            _ => Err(PdfError::undecodable(String::from_utf8_lossy(name))),
        }
    }

    /// PDF name of the filter
    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::LZWDecode => "LZWDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::DCTDecode => "DCTDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::JPXDecode => "JPXDecode",
            Filter::Crypt => "Crypt",
        }
    }

    /// Process filter parameters
    fn get_context(&self, params: Option<&Dictionary>) -> FilterContext {
        let mut ctx = FilterContext::default();

        if let Some(params) = params {
            if let Some(predictor) = params.get_integer("Predictor") {
                ctx.predictor = Some(PredictorParams {
                    predictor,
                    columns: params.get_integer("Columns").unwrap_or(1).max(1) as usize,
                    colors: params.get_integer("Colors").unwrap_or(1).max(1) as usize,
                    bits_per_component: params.get_integer("BitsPerComponent").unwrap_or(8).max(1) as usize,
                });
            }
            if *self == Filter::LZWDecode {
                ctx.early_change = params.get_integer("EarlyChange").unwrap_or(1) != 0;
            }
        }

        ctx
    }

    /// Decode data using this filter
    pub fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> PdfResult<Vec<u8>> {
        let ctx = self.get_context(params);
        let result = match self {
            Filter::ASCII85Decode => decode_ascii85(data)?,
            Filter::ASCIIHexDecode => decode_ascii_hex(data)?,
            Filter::FlateDecode => decode_flate(data)?,
            Filter::LZWDecode => LzwDecoder::new(ctx.early_change).decode(data)?,
            Filter::RunLengthDecode => decode_run_length(data)?,
            Filter::CCITTFaxDecode
            | Filter::DCTDecode
            | Filter::JBIG2Decode
            | Filter::JPXDecode
            | Filter::Crypt => return Err(PdfError::undecodable(self.name())),
        };

        match (&ctx.predictor, self) {
            (Some(predictor), Filter::FlateDecode | Filter::LZWDecode) if predictor.predictor > 1 => {
                apply_predictor(&result, predictor)
            }
            _ => Ok(result),
        }
    }

    /// Encode data using this filter; only Flate is produced by the writer
    pub fn encode(&self, data: &[u8]) -> PdfResult<Vec<u8>> {
        match self {
            Filter::FlateDecode => {
                let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
                encoder
                    .write_all(data)
                    .map_err(|e| PdfError::CompressionError(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| PdfError::CompressionError(e.to_string()))
            }
            Filter::ASCIIHexDecode => {
                let mut output = hex::encode_upper(data).into_bytes();
                output.push(b'>');
                Ok(output)
            }
            _ => Err(PdfError::CompressionError(format!("{} encoding not supported", self.name()))),
        }
    }
}

fn decode_ascii85(data: &[u8]) -> PdfResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    let data = data.strip_prefix(b"<~").unwrap_or(data);
    for &byte in data {
        match byte {
            b'~' => break,
            b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    output.extend_from_slice(&ascii85_group_value(&group).to_be_bytes());
                    count = 0;
                }
            }
            b if is_whitespace(b) => continue,
            _ => {
                return Err(PdfError::DecompressionError(format!(
                    "Invalid ASCII85 character: {}",
                    byte
                )))
            }
        }
    }

    if count == 1 {
        return Err(PdfError::DecompressionError("Truncated ASCII85 group".to_string()));
    }
    if count > 1 {
        for digit in group.iter_mut().skip(count) {
            *digit = 84;
        }
        let bytes = ascii85_group_value(&group).to_be_bytes();
        output.extend_from_slice(&bytes[..count - 1]);
    }

    Ok(output)
}

fn ascii85_group_value(group: &[u8; 5]) -> u32 {
    group
        .iter()
        .fold(0u32, |acc, &digit| acc.wrapping_mul(85).wrapping_add(digit as u32))
}

fn decode_ascii_hex(data: &[u8]) -> PdfResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'A'..=b'F' => byte - b'A' + 10,
            b'a'..=b'f' => byte - b'a' + 10,
            b'>' => break,
            b if is_whitespace(b) => continue,
            _ => {
                return Err(PdfError::DecompressionError(format!(
                    "Invalid hex character: {}",
                    byte
                )))
            }
        };
        match high.take() {
            Some(h) => output.push(h << 4 | digit),
            None => high = Some(digit),
        }
    }

    if let Some(h) = high {
        output.push(h << 4);
    }

    Ok(output)
}

fn decode_run_length(data: &[u8]) -> PdfResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let end = (i + count).min(data.len());
                output.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let Some(&byte) = data.get(i) else {
                    return Err(PdfError::DecompressionError("Invalid run length data".to_string()));
                };
                let count = 257 - length as usize;
                output.extend(std::iter::repeat(byte).take(count));
                i += 1;
            }
        }
    }

    Ok(output)
}

/// Inflate; a damaged tail keeps the bytes recovered so far
fn decode_flate(data: &[u8]) -> PdfResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::with_capacity(data.len() * 2);

    match decoder.read_to_end(&mut output) {
        Ok(_) => Ok(output),
        Err(e) if !output.is_empty() => {
            warn!("Flate stream truncated after {} bytes: {}", output.len(), e);
            Ok(output)
        }
        Err(e) => Err(PdfError::DecompressionError(e.to_string())),
    }
}

fn apply_predictor(data: &[u8], params: &PredictorParams) -> PdfResult<Vec<u8>> {
    let oversized = || {
        PdfError::DecompressionError(format!(
            "Predictor row of {} columns x {} colors x {} bits does not fit {} bytes of data",
            params.columns,
            params.colors,
            params.bits_per_component,
            data.len()
        ))
    };
    let bits_per_pixel = params
        .colors
        .checked_mul(params.bits_per_component)
        .ok_or_else(oversized)?;
    let bits_per_row = params.columns.checked_mul(bits_per_pixel).ok_or_else(oversized)?;
    let bytes_per_pixel = bits_per_pixel.div_ceil(8);
    let bytes_per_row = bits_per_row.div_ceil(8);
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if bytes_per_row > data.len() {
        return Err(oversized());
    }
    let mut output = Vec::with_capacity(data.len());

    match params.predictor {
        2 => {
            // TIFF predictor, 8-bit components only
            for row in data.chunks(bytes_per_row) {
                let start = output.len();
                for (i, &byte) in row.iter().enumerate() {
                    let left = if i >= bytes_per_pixel { output[start + i - bytes_per_pixel] } else { 0 };
                    output.push(byte.wrapping_add(left));
                }
            }
            Ok(output)
        }
        10..=15 => {
            let mut prev_row = vec![0u8; bytes_per_row];
            let mut row_buf = vec![0u8; bytes_per_row];

            for row in data.chunks(bytes_per_row + 1) {
                let filter_type = row[0];
                let row_data = &row[1..];
                row_buf.iter_mut().for_each(|b| *b = 0);

                for i in 0..row_data.len() {
                    let left = if i >= bytes_per_pixel { row_buf[i - bytes_per_pixel] } else { 0 };
                    let up = prev_row[i];
                    let up_left = if i >= bytes_per_pixel { prev_row[i - bytes_per_pixel] } else { 0 };

                    row_buf[i] = match filter_type {
                        0 => row_data[i],
                        1 => row_data[i].wrapping_add(left),
                        2 => row_data[i].wrapping_add(up),
                        3 => row_data[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                        4 => row_data[i].wrapping_add(paeth(left, up, up_left)),
                        _ => {
                            return Err(PdfError::DecompressionError(format!(
                                "Invalid PNG filter type {}",
                                filter_type
                            )))
                        }
                    };
                }

                output.extend_from_slice(&row_buf[..row_data.len()]);
                prev_row.copy_from_slice(&row_buf);
            }
            Ok(output)
        }
        other => Err(PdfError::DecompressionError(format!("Invalid predictor {}", other))),
    }
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

/// LZW Decoder Implementation
struct LzwDecoder {
    early_change: bool,
    table: Vec<Vec<u8>>,
}

impl LzwDecoder {
    fn new(early_change: bool) -> Self {
        let mut decoder = Self {
            early_change,
            table: Vec::with_capacity(1 << MAX_LZW_BITS),
        };
        decoder.reset();
        decoder
    }

    fn reset(&mut self) {
        self.table.clear();
        self.table.extend((0..=255u8).map(|b| vec![b]));
        // Clear and EOD placeholders
        self.table.push(Vec::new());
        self.table.push(Vec::new());
    }

    fn code_bits(&self) -> usize {
        let next = self.table.len() + self.early_change as usize;
        match next {
            n if n >= 2048 => 12,
            n if n >= 1024 => 11,
            n if n >= 512 => 10,
            _ => 9,
        }
    }

    fn decode(&mut self, data: &[u8]) -> PdfResult<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() * 2);
        let mut bit_reader = BitReader::new(data);
        let mut prev_code: Option<usize> = None;

        while let Some(code) = bit_reader.read_code(self.code_bits()) {
            match code {
                LZW_CLEAR_CODE => {
                    self.reset();
                    prev_code = None;
                }
                LZW_EOD_CODE => break,
                code => {
                    let sequence = if code < LZW_CLEAR_CODE || (LZW_FIRST_CODE..self.table.len()).contains(&code) {
                        self.table[code].clone()
                    } else if let (true, Some(prev)) = (code == self.table.len(), prev_code) {
                        let mut seq = self.table[prev].clone();
                        seq.push(seq[0]);
                        seq
                    } else {
                        return Err(PdfError::DecompressionError(format!("Invalid LZW code {}", code)));
                    };

                    output.extend_from_slice(&sequence);

                    if let Some(prev) = prev_code {
                        if self.table.len() < (1 << MAX_LZW_BITS) {
                            let mut entry = self.table[prev].clone();
                            entry.push(sequence[0]);
                            self.table.push(entry);
                        }
                    }

                    prev_code = Some(code);
                }
            }
        }

        trace!("LZW decoded {} bytes into {}", data.len(), output.len());
        Ok(output)
    }
}

/// MSB-first bit reader
struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_buffer: u32,
    bits_in_buffer: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_buffer: 0,
            bits_in_buffer: 0,
        }
    }

    fn read_code(&mut self, bits: usize) -> Option<usize> {
        while self.bits_in_buffer < bits {
            let byte = *self.data.get(self.byte_pos)?;
            self.bit_buffer = (self.bit_buffer << 8) | byte as u32;
            self.bits_in_buffer += 8;
            self.byte_pos += 1;
        }

        let shift = self.bits_in_buffer - bits;
        let code = (self.bit_buffer >> shift) & ((1u32 << bits) - 1);
        self.bit_buffer &= (1u32 << shift) - 1;
        self.bits_in_buffer -= bits;
        Some(code as usize)
    }
}
