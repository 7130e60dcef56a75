mod common;

use std::io::Cursor;

use pdf_assembler::{Object, PdfError, PdfReader, PdfResult, ReaderOptions, TextOptions};
use pretty_assertions::assert_eq;
use rstest::rstest;
use test_log::test;

use common::*;

#[test]
fn test_crazy_ones_text() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(crazy_ones())?;
    assert_eq!(reader.num_pages(), 1);
    assert_eq!(reader.version(), "1.4");
    assert_eq!(reader.get_page(0)?.extract_text()?, CRAZY_ONES_TEXT);
    Ok(())
}

#[test]
fn test_extraction_is_deterministic() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(nested_page_tree())?;
    for page in reader.pages() {
        assert_eq!(page.extract_text()?, page.extract_text()?);
    }
    Ok(())
}

#[rstest]
#[test_log::test]
#[case(-1)]
#[case(1)]
fn test_page_index_bounds(#[case] index: isize) -> PdfResult<()> {
    let reader = PdfReader::from_bytes(crazy_ones())?;
    assert!(reader.get_page(0).is_ok());
    let err = reader.get_page(index).unwrap_err();
    assert!(matches!(err, PdfError::PageIndexOutOfRange { count: 1, .. }));
    Ok(())
}

#[test]
fn test_document_info() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(crazy_ones())?;
    let info = reader.document_info()?;
    assert_eq!(info.get("Title").map(String::as_str), Some("Crazy Ones"));
    assert_eq!(info.get("Producer").map(String::as_str), Some("pdftk"));
    Ok(())
}

#[test]
fn test_nested_page_tree() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(nested_page_tree())?;
    assert_eq!(reader.num_pages(), 3);

    let texts = reader
        .pages()
        .map(|page| page.extract_text())
        .collect::<PdfResult<Vec<_>>>()?;
    assert_eq!(texts, vec!["first", "second\npage", "third page"]);

    let first = reader.get_page(0)?;
    assert_eq!(first.media_box()?, Some([0.0, 0.0, 595.0, 842.0]));
    assert_eq!(first.rotation()?, 90);
    assert!(first.resources()?.unwrap().has("Font"));

    assert_eq!(reader.get_page(1)?.rotation()?, 0);
    assert_eq!(reader.get_page(2)?.media_box()?, Some([0.0, 0.0, 200.0, 200.0]));
    Ok(())
}

#[test]
fn test_text_options() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(nested_page_tree())?;
    let options = TextOptions {
        word_gap: 500.0,
        line_breaks: false,
    };
    assert_eq!(reader.get_page(2)?.extract_text_with_options(options.clone())?, "thirdpage");
    assert_eq!(reader.get_page(1)?.extract_text_with_options(options)?, "secondpage");
    Ok(())
}

#[test]
fn test_broken_xref_is_repaired() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(broken_xref())?;
    assert_eq!(reader.num_pages(), 1);
    assert_eq!(reader.get_page(0)?.extract_text()?, CRAZY_ONES_TEXT);
    Ok(())
}

#[test]
fn test_broken_xref_without_repair() {
    let options = ReaderOptions {
        repair: false,
        ..ReaderOptions::default()
    };
    let err = PdfReader::from_bytes_with_options(broken_xref(), options).unwrap_err();
    assert!(matches!(err, PdfError::MalformedDocument(_)));
}

#[test]
fn test_misplaced_objects_are_recovered() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(shifted_offsets())?;
    assert_eq!(reader.get_page(0)?.extract_text()?, CRAZY_ONES_TEXT);
    Ok(())
}

#[test]
fn test_missing_trailer_is_synthesised() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(objects_only())?;
    assert_eq!(reader.trailer().get_reference("Root"), Some((1, 0)));
    assert_eq!(reader.get_page(0)?.extract_text()?, CRAZY_ONES_TEXT);
    Ok(())
}

fn replace_once(data: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let at = data
        .windows(from.len())
        .position(|window| window == from)
        .expect("pattern present in fixture");
    [&data[..at], to, &data[at + from.len()..]].concat()
}

#[rstest]
#[test_log::test]
#[case(b"xref\n0 4000000000000\n".as_slice())]
#[case(b"xref\n4294967295 2\n0000000000 65535 f \n".as_slice())]
#[case(b"xref\n0 -7\n".as_slice())]
fn test_damaged_xref_header_is_repaired(#[case] header: &[u8]) -> PdfResult<()> {
    let data = replace_once(&crazy_ones(), b"xref\n0 1\n", header);
    let reader = PdfReader::from_bytes(data)?;
    assert_eq!(reader.num_pages(), 1);
    assert_eq!(reader.get_page(0)?.extract_text()?, CRAZY_ONES_TEXT);
    Ok(())
}

/// Crazy-ones page whose content stream is Flate-encoded with a PNG predictor
fn predictor_page(decode_parms: &str, extra: &str) -> Vec<u8> {
    // One row, PNG "Sub" filter: each byte stored as the difference to its left neighbour
    let mut row = vec![1u8];
    let mut left = 0u8;
    for &byte in CRAZY_ONES_CONTENT {
        row.push(byte.wrapping_sub(left));
        left = byte;
    }

    let mut builder = PdfBuilder::new("1.4")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
        )
        .stream(4, &format!("/Filter /FlateDecode /DecodeParms {}", decode_parms), &deflate(&row))
        .object(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
    if !extra.is_empty() {
        builder = builder.object(6, extra);
    }
    builder.xref("/Root 1 0 R").build()
}

#[test]
fn test_indirect_decode_parms_are_resolved() -> PdfResult<()> {
    let columns = CRAZY_ONES_CONTENT.len();
    let direct = predictor_page(&format!("<< /Predictor 11 /Columns {} >>", columns), "");
    let indirect = predictor_page("6 0 R", &format!("<< /Predictor 11 /Columns {} >>", columns));

    for data in [direct, indirect] {
        let reader = PdfReader::from_bytes(data)?;
        assert_eq!(reader.get_page(0)?.content()?, CRAZY_ONES_CONTENT.to_vec());
        assert_eq!(reader.get_page(0)?.extract_text()?, CRAZY_ONES_TEXT);
    }
    Ok(())
}

#[test]
fn test_oversized_predictor_row_is_an_error() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(predictor_page("<< /Predictor 12 /Columns 1000000000000000 >>", ""))?;
    let err = reader.get_page(0)?.extract_text().unwrap_err();
    assert!(matches!(err, PdfError::DecompressionError(_)));
    Ok(())
}

#[test]
fn test_empty_page_tree() -> PdfResult<()> {
    let data = PdfBuilder::new("1.4")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Count 0 >>")
        .xref("/Root 1 0 R")
        .build();
    let reader = PdfReader::from_bytes(data)?;
    assert_eq!(reader.num_pages(), 0);
    assert!(matches!(
        reader.get_page(0).unwrap_err(),
        PdfError::PageIndexOutOfRange { index: 0, count: 0 }
    ));
    Ok(())
}

#[rstest]
#[test_log::test]
#[case(empty_file())]
#[case(b"not a pdf at all".to_vec())]
fn test_unreadable_input(#[case] data: Vec<u8>) {
    let err = PdfReader::from_bytes(data).unwrap_err();
    assert!(matches!(err, PdfError::MalformedDocument(_)));
}

#[test]
fn test_incremental_update_wins() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(incremental_update())?;
    assert_eq!(reader.get_page(0)?.extract_text()?, "Here's to the crazy ones");
    assert_eq!(
        reader.document_info()?.get("Title").map(String::as_str),
        Some("Updated")
    );
    Ok(())
}

#[test]
fn test_xref_stream_and_object_stream() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(xref_stream_document())?;
    assert_eq!(reader.version(), "1.5");
    assert_eq!(reader.num_pages(), 1);
    assert!(reader.catalog()?.type_is("Catalog"));
    assert_eq!(reader.get_page(0)?.extract_text()?, CRAZY_ONES_TEXT);
    Ok(())
}

#[test]
fn test_object_access() -> PdfResult<()> {
    let reader = PdfReader::from_bytes(crazy_ones())?;
    let page = reader.get_page(0)?;
    let contents = page.dictionary()?.get("Contents").unwrap();
    let stream = reader.resolve(contents)?.as_stream()?;
    assert!(stream.is_compressed());
    assert_eq!(stream.decompressed_content()?, CRAZY_ONES_CONTENT.to_vec());

    let err = reader.get_object((77, 0)).unwrap_err();
    assert!(matches!(err, PdfError::UnresolvedReference((77, 0))));
    assert!(!reader.is_encrypted());
    assert_eq!(reader.trailer().get("Root"), Some(&Object::Reference((1, 0))));
    Ok(())
}

#[test]
fn test_open_and_from_reader() -> PdfResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("crazyones.pdf");
    std::fs::write(&path, crazy_ones())?;

    let from_file = PdfReader::open(&path)?;
    let from_reader = PdfReader::from_reader(Cursor::new(crazy_ones()))?;
    assert_eq!(from_file.num_pages(), from_reader.num_pages());
    assert_eq!(
        from_file.get_page(0)?.extract_text()?,
        from_reader.get_page(0)?.extract_text()?
    );

    let err = PdfReader::open(dir.path().join("missing.pdf")).unwrap_err();
    assert!(matches!(err, PdfError::IoError(_)));
    Ok(())
}
