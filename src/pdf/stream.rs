//! PDF stream object implementation

use log::{trace, warn};

use crate::error::{PdfError, PdfResult};
use super::{Dictionary, Filter, Object, WritePdf};

/// PDF stream object
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    pub dict: Dictionary,
    /// Raw stream data, still encoded by the filters named in `dict`
    pub content: Vec<u8>,
}

impl Stream {
    /// Create new stream object; `/Length` follows the content
    pub fn new(mut dict: Dictionary, content: Vec<u8>) -> Self {
        dict.set("Length", content.len());
        Self { dict, content }
    }

    /// Filters applied to the stream, in decoding order
    pub fn filters(&self) -> PdfResult<Vec<Filter>> {
        match self.dict.get("Filter") {
            None | Some(Object::Null) => Ok(Vec::new()),
            Some(Object::Name(name)) => Ok(vec![Filter::from_name(name)?]),
            Some(Object::Array(array)) => array
                .iter()
                .map(|item| Filter::from_name(item.as_name()?))
                .collect(),
            Some(other) => Err(PdfError::InvalidObjectType {
                expected: "Name or Array",
                found: other.type_name(),
            }),
        }
    }

    /// Parameters for the filter at `index`
    ///
    /// Indirect parameter objects are not resolved here; see
    /// `Document::with_direct_params`.
    fn decode_params(&self, index: usize) -> Option<&Dictionary> {
        let params = match self.dict.get("DecodeParms").or_else(|| self.dict.get("DP")) {
            Some(Object::Array(array)) => array.get(index),
            params if index == 0 => params,
            _ => None,
        };
        match params {
            Some(Object::Dictionary(params)) => Some(params),
            Some(Object::Reference(id)) => {
                warn!("Ignoring indirect /DecodeParms {} {} R for filter {}", id.0, id.1, index);
                None
            }
            _ => None,
        }
    }

    /// Check whether any filter is declared
    pub fn is_compressed(&self) -> bool {
        !matches!(self.dict.get("Filter"), None | Some(Object::Null))
    }

    /// Decode stream data through the whole filter chain
    ///
    /// Fails with [`PdfError::UndecodableStream`] for image codecs and unknown
    /// filters; callers that can work on raw bytes fall back to `content`.
    pub fn decompressed_content(&self) -> PdfResult<Vec<u8>> {
        let filters = self.filters()?;
        if filters.is_empty() {
            return Ok(self.content.clone());
        }

        trace!("Decoding stream with {} filters", filters.len());
        let mut data = self.content.clone();
        for (index, filter) in filters.iter().enumerate() {
            trace!("Applying filter: {:?}", filter);
            data = filter.decode(&data, self.decode_params(index))?;
        }
        Ok(data)
    }

    /// Replace raw (still encoded) content
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.dict.set("Length", content.len());
        self.content = content;
    }

    /// Replace content with unfiltered bytes
    pub fn set_plain_content(&mut self, content: Vec<u8>) {
        self.dict.remove("Filter");
        self.dict.remove("DecodeParms");
        self.set_content(content);
    }

    /// Flate-encode an unfiltered stream
    pub fn compress(&mut self) -> PdfResult<()> {
        if self.is_compressed() {
            return Ok(());
        }
        let encoded = Filter::FlateDecode.encode(&self.content)?;
        self.dict.set_name("Filter", "FlateDecode");
        self.set_content(encoded);
        Ok(())
    }
}

impl WritePdf for Stream {
    fn write_to(&self, output: &mut Vec<u8>) {
        let mut dict = self.dict.clone();
        dict.set("Length", self.content.len());
        dict.write_to(output);
        output.extend_from_slice(b"\nstream\n");
        output.extend_from_slice(&self.content);
        output.extend_from_slice(b"\nendstream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn create_test_stream(data: &[u8], filter: Option<&str>) -> Stream {
        let mut dict = Dictionary::new();
        if let Some(name) = filter {
            dict.set_name("Filter", name);
        }
        Stream::new(dict, data.to_vec())
    }

    #[test]
    fn test_length_tracks_content() {
        let mut stream = create_test_stream(b"Hello World", None);
        assert_eq!(stream.dict.get_integer("Length"), Some(11));

        stream.set_content(b"Bye".to_vec());
        assert_eq!(stream.dict.get_integer("Length"), Some(3));
    }

    #[test]
    fn test_flate_round_trip() -> PdfResult<()> {
        let original = b"BT /F1 24 Tf 72 700 Td (Test data for deflate) Tj ET";
        let mut stream = create_test_stream(original, None);
        stream.compress()?;

        assert!(stream.is_compressed());
        assert_ne!(stream.content, original.to_vec());
        assert_eq!(stream.decompressed_content()?, original.to_vec());
        Ok(())
    }

    #[test]
    fn test_filter_chain() -> PdfResult<()> {
        let mut dict = Dictionary::new();
        dict.set("Filter", vec![Object::name("ASCIIHexDecode"), Object::name("RunLengthDecode")]);
        // RunLength: 2 => copy 3 literal bytes, 128 => EOD
        let stream = Stream::new(dict, b"02 41 42 43 80>".to_vec());

        assert_eq!(stream.filters()?, vec![Filter::ASCIIHexDecode, Filter::RunLengthDecode]);
        assert_eq!(stream.decompressed_content()?, b"ABC".to_vec());
        Ok(())
    }

    #[test]
    fn test_image_codec_is_undecodable() {
        let stream = create_test_stream(&[0xff, 0xd8, 0xff], Some("DCTDecode"));
        let err = stream.decompressed_content().unwrap_err();
        assert!(matches!(err, PdfError::UndecodableStream(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_filter_is_undecodable() {
        let stream = create_test_stream(b"xx", Some("FancyDecode"));
        assert!(matches!(stream.filters(), Err(PdfError::UndecodableStream(_))));
    }

    #[test]
    fn test_serialization_rewrites_length() {
        let mut dict = Dictionary::new();
        dict.set("Length", Object::Reference((9, 0)));
        let stream = Stream { dict, content: b"abc".to_vec() };

        assert_eq!(
            String::from_utf8(stream.to_pdf_bytes()).unwrap(),
            "<</Length 3>>\nstream\nabc\nendstream"
        );
    }
}
