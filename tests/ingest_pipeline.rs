//! Template upload path: format sniffing, decode, and the dimension clamp.

use std::io::Cursor;

use scrivo::{MAX_DIMENSION, ScrivoError, ingest};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn encoded(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

#[test]
fn oversized_uploads_are_clamped_preserving_aspect_ratio() {
    init_logging();
    let bytes = encoded(1600, 1200, image::ImageFormat::Png);
    let uploaded = ingest(&bytes, Some("image/png"), "big.png").unwrap();
    assert_eq!((uploaded.width(), uploaded.height()), (1000, 750));
}

#[test]
fn clamp_applies_to_the_longer_side_in_portrait_too() {
    init_logging();
    let bytes = encoded(500, 2000, image::ImageFormat::Png);
    let uploaded = ingest(&bytes, Some("image/png"), "tall.png").unwrap();
    assert_eq!((uploaded.width(), uploaded.height()), (250, MAX_DIMENSION));
}

#[test]
fn small_uploads_keep_their_dimensions() {
    init_logging();
    let bytes = encoded(640, 480, image::ImageFormat::Png);
    let uploaded = ingest(&bytes, Some("image/png"), "small.png").unwrap();
    assert_eq!((uploaded.width(), uploaded.height()), (640, 480));
}

#[test]
fn jpeg_uploads_are_accepted_by_extension_alone() {
    init_logging();
    let img = image::RgbImage::from_pixel(32, 32, image::Rgb([200, 150, 100]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();

    let uploaded = ingest(&bytes, None, "photo.jpg").unwrap();
    assert_eq!((uploaded.width(), uploaded.height()), (32, 32));
}

#[test]
fn non_image_mime_is_rejected() {
    init_logging();
    let bytes = encoded(8, 8, image::ImageFormat::Png);
    let err = ingest(&bytes, Some("application/pdf"), "doc.pdf").unwrap_err();
    assert!(matches!(err, ScrivoError::UnsupportedFormat(_)));
}

#[test]
fn unknown_extension_without_mime_is_rejected() {
    init_logging();
    let err = ingest(b"whatever", None, "notes.txt").unwrap_err();
    assert!(matches!(err, ScrivoError::UnsupportedFormat(_)));
}

#[test]
fn corrupt_png_bytes_fail_decode() {
    init_logging();
    let err = ingest(b"\x89PNG\r\n\x1a\nnot really", Some("image/png"), "bad.png").unwrap_err();
    assert!(matches!(err, ScrivoError::DecodeFailure(_)));
}
