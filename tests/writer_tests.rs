//! Serializer behaviour checked by loading the output back

mod common;

use common::simple_document;
use pdf_engine::{
    Dictionary, Document, EncryptionAlgorithm, LoadOptions, Metadata, PDFError, PDFPermissions, PDFResult,
    SaveOptions, XRefFormat,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test_log::test]
fn test_zero_stream_compresses() -> PDFResult<()> {
    let zeros = vec![0u8; 10 * 1024];
    let mut document = Document::new();
    document.add_page(Dictionary::new())?;
    document.set_page_contents(0, zeros.clone())?;

    let output = document.save(&SaveOptions::default().with_compression(true))?;
    assert!(output.len() < zeros.len());

    let reloaded = Document::load(&output)?;
    let page = reloaded.get_page(0)?;
    let stream = reloaded.get_stream(page.content_ids()?[0])?;
    assert_eq!(stream.dict().get_name("Filter"), Some("FlateDecode"));
    assert!(stream.raw_data().len() < zeros.len());
    assert_eq!(stream.dict().get_i64("Length"), Some(stream.raw_data().len() as i64));
    assert_eq!(stream.decoded_data()?, zeros.as_slice());
    Ok(())
}

#[rstest]
#[case::table(XRefFormat::Table, false)]
#[case::stream(XRefFormat::Stream, false)]
#[case::object_streams(XRefFormat::MatchSource, true)]
fn test_layouts_reload(#[case] format: XRefFormat, #[case] object_streams: bool) -> PDFResult<()> {
    let document = Document::load(&simple_document(5))?;
    let options = SaveOptions::default()
        .with_xref_format(format)
        .with_object_streams(object_streams)
        .with_compression(true);
    let output = document.save(&options)?;

    assert_eq!(contains(&output, b"/Type /XRef"), format == XRefFormat::Stream || object_streams);
    assert_eq!(contains(&output, b"/Type /ObjStm"), object_streams);

    let reloaded = Document::load(&output)?;
    assert_eq!(reloaded.page_count()?, 5);
    assert_eq!(reloaded.get_page(4)?.contents()?, b"BT /F1 12 Tf (page 5) Tj ET".to_vec());
    assert!(reloaded.diagnostics().is_empty());
    if format == XRefFormat::Stream || object_streams {
        assert!(reloaded.uses_xref_stream());
        assert_eq!(reloaded.version(), "1.7");
    }
    Ok(())
}

#[rstest]
#[case::rc4_40(EncryptionAlgorithm::RC4_40)]
#[case::rc4_128(EncryptionAlgorithm::RC4_128)]
#[case::aes_128(EncryptionAlgorithm::AES_128)]
#[case::aes_256(EncryptionAlgorithm::AES_256)]
fn test_encrypted_output(#[case] method: EncryptionAlgorithm) -> PDFResult<()> {
    let mut document = Document::load(&simple_document(2))?;
    document.set_metadata(&Metadata {
        title: Some("Confidential".to_string()),
        ..Metadata::default()
    })?;
    let permissions = PDFPermissions::new(PDFPermissions::PRINT);
    let options = SaveOptions::default()
        .with_encryption(method, "reader", "owner-secret")
        .with_permissions(permissions);
    let output = document.save(&options)?;

    assert!(!contains(&output, b"(page 1)"));
    assert!(!contains(&output, b"Confidential"));

    for password in ["reader", "owner-secret"] {
        let reloaded = Document::load_with_options(&output, &LoadOptions::new().with_password(password))?;
        let info = reloaded.encryption().ok_or(PDFError::encryption("not encrypted"))?;
        assert_eq!(info.algorithm, method);
        assert!(info.permissions.has_permission(PDFPermissions::PRINT));
        assert!(!info.permissions.has_permission(PDFPermissions::MODIFY));
        assert_eq!(reloaded.get_page(1)?.contents()?, b"BT /F1 12 Tf (page 2) Tj ET".to_vec());
        assert_eq!(reloaded.metadata()?.title.as_deref(), Some("Confidential"));
    }

    let wrong = Document::load_with_options(&output, &LoadOptions::new().with_password("guess"));
    assert!(wrong.is_err());
    Ok(())
}

#[test_log::test]
fn test_encryption_needs_owner_password() -> PDFResult<()> {
    let document = Document::load(&simple_document(1))?;
    let options = SaveOptions::default().with_encryption(EncryptionAlgorithm::AES_128, "user", "");
    assert!(matches!(document.save(&options), Err(PDFError::EncryptionError(_))));
    Ok(())
}

#[test_log::test]
fn test_reencrypt_loaded_document() -> PDFResult<()> {
    let first = Document::load(&simple_document(1))?
        .save(&SaveOptions::default().with_encryption(EncryptionAlgorithm::RC4_128, "", "owner"))?;

    let document = Document::load(&first)?;
    let plain = document.save(&SaveOptions::default())?;
    assert!(contains(&plain, b"(page 1)"));

    let reloaded = Document::load(&plain)?;
    assert!(reloaded.encryption().is_none());
    assert_eq!(reloaded.page_count()?, 1);
    Ok(())
}
