//! Integration tests for still-image encoding helpers.

use flowlens_core::{CoreError, ImageEncoding};

#[test]
fn image_encoding_tests_strips_data_url_tag() {
    let image = ImageEncoding::from_base64("image/jpeg", "AQID").expect("encoding should build");

    assert_eq!(image.as_str(), "data:image/jpeg;base64,AQID");
    assert_eq!(image.payload(), "AQID");
    assert_eq!(image.mime_type(), "image/jpeg");
    assert_eq!(image.payload_len(), 4);
}

#[test]
fn image_encoding_tests_rejects_blank_payloads() {
    assert!(matches!(ImageEncoding::new("   "), Err(CoreError::EmptyImage)));
    assert!(matches!(
        ImageEncoding::from_base64("image/png", ""),
        Err(CoreError::EmptyImage)
    ));
}

#[test]
fn image_encoding_tests_serializes_as_plain_string() {
    let image = ImageEncoding::new("data:image/png;base64,AAAA").expect("encoding should build");
    let json = serde_json::to_string(&image).expect("encoding should serialize");
    assert_eq!(json, "\"data:image/png;base64,AAAA\"");
}
