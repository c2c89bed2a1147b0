use std::{path::Path, process::Command, sync::Arc};

use tracing::debug;

use crate::error::{ScrivoError, ScrivoResult};

/// Longest side of an ingested image, in pixels. Larger uploads are scaled
/// down preserving aspect ratio so render and encode costs stay bounded.
pub const MAX_DIMENSION: u32 = 1000;

/// ffmpeg mjpeg qscale used for HEIF transcoding, roughly a 0.8 JPEG quality.
const TRANSCODE_QSCALE: &str = "5";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
    /// HEIC/HEIF family; requires a transcode before decode.
    Heif,
}

#[derive(Clone, Debug)]
/// Decoded raster in premultiplied RGBA8 form, already clamped to
/// [`MAX_DIMENSION`].
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

#[derive(Clone, Debug)]
/// Result of a successful ingest: the prepared raster plus the decodable
/// source bytes (post-transcode for HEIF) kept for the fallback background
/// construction path.
pub struct IngestedImage {
    pub prepared: PreparedImage,
    pub source_bytes: Vec<u8>,
}

impl IngestedImage {
    pub fn width(&self) -> u32 {
        self.prepared.width
    }

    pub fn height(&self) -> u32 {
        self.prepared.height
    }
}

/// Normalize an uploaded image into a decodable raster and report its
/// clamped dimensions.
///
/// HEIC/HEIF uploads are transcoded to JPEG via an `ffmpeg` subprocess
/// before decode; a failed transcode surfaces as [`ScrivoError::DecodeFailure`],
/// never as a raw-bytes fallback. Scratch files live in a temporary
/// directory that is removed on every path, success or error.
pub fn ingest(bytes: &[u8], mime_hint: Option<&str>, filename: &str) -> ScrivoResult<IngestedImage> {
    let format = sniff_format(mime_hint, filename)?;

    let source_bytes = match format {
        SourceFormat::Heif => transcode_heif_to_jpeg(bytes)?,
        SourceFormat::Png | SourceFormat::Jpeg => bytes.to_vec(),
    };

    let prepared = decode_clamped(&source_bytes)?;
    debug!(
        width = prepared.width,
        height = prepared.height,
        ?format,
        "ingested image"
    );

    Ok(IngestedImage {
        prepared,
        source_bytes,
    })
}

/// Classify an upload by MIME hint first, then by filename extension.
///
/// A non-image MIME hint rejects the upload outright even when the extension
/// looks plausible.
pub fn sniff_format(mime_hint: Option<&str>, filename: &str) -> ScrivoResult<SourceFormat> {
    if let Some(mime) = mime_hint {
        let mime = mime.trim().to_ascii_lowercase();
        if !mime.starts_with("image/") {
            return Err(ScrivoError::unsupported_format(format!(
                "mime type '{mime}' is not an image"
            )));
        }
        match mime.as_str() {
            "image/png" => return Ok(SourceFormat::Png),
            "image/jpeg" | "image/jpg" => return Ok(SourceFormat::Jpeg),
            "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence" => {
                return Ok(SourceFormat::Heif);
            }
            _ => {}
        }
    }

    let ext = Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => Ok(SourceFormat::Png),
        Some("jpg") | Some("jpeg") => Ok(SourceFormat::Jpeg),
        Some("heic") | Some("heif") => Ok(SourceFormat::Heif),
        _ => Err(ScrivoError::unsupported_format(format!(
            "'{filename}' is not a supported image (png, jpg, jpeg, heic, heif)"
        ))),
    }
}

/// Decode raster bytes, clamp to [`MAX_DIMENSION`], and premultiply.
pub fn decode_clamped(bytes: &[u8]) -> ScrivoResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| ScrivoError::decode_failure(format!("decode image from memory: {e}")))?;
    let mut rgba = dyn_img.to_rgba8();

    let (width, height) = rgba.dimensions();
    let (clamped_w, clamped_h) = clamp_dimensions(width, height);
    if (clamped_w, clamped_h) != (width, height) {
        rgba = image::imageops::resize(&rgba, clamped_w, clamped_h, image::imageops::Triangle);
    }

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width: clamped_w,
        height: clamped_h,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

/// Scale `(width, height)` down so the longer side equals [`MAX_DIMENSION`],
/// preserving aspect ratio with rounding. Dimensions already within bounds
/// pass through unchanged.
pub fn clamp_dimensions(width: u32, height: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= MAX_DIMENSION || longest == 0 {
        return (width, height);
    }
    let scale = f64::from(MAX_DIMENSION) / f64::from(longest);
    let scaled_w = ((f64::from(width) * scale).round() as u32).max(1);
    let scaled_h = ((f64::from(height) * scale).round() as u32).max(1);
    (scaled_w, scaled_h)
}

fn transcode_heif_to_jpeg(bytes: &[u8]) -> ScrivoResult<Vec<u8>> {
    let scratch = tempfile::tempdir()
        .map_err(|e| ScrivoError::decode_failure(format!("create transcode scratch dir: {e}")))?;
    let in_path = scratch.path().join("source.heic");
    let out_path = scratch.path().join("transcoded.jpg");

    std::fs::write(&in_path, bytes)
        .map_err(|e| ScrivoError::decode_failure(format!("write transcode input: {e}")))?;

    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-i"])
        .arg(&in_path)
        .args(["-frames:v", "1", "-q:v", TRANSCODE_QSCALE])
        .arg(&out_path)
        .output()
        .map_err(|e| ScrivoError::decode_failure(format!("failed to run ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(ScrivoError::decode_failure(format!(
            "heif transcode failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    std::fs::read(&out_path)
        .map_err(|e| ScrivoError::decode_failure(format!("read transcode output: {e}")))
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn sniff_prefers_mime_hint() {
        assert_eq!(
            sniff_format(Some("image/png"), "whatever.bin").unwrap(),
            SourceFormat::Png
        );
        assert_eq!(
            sniff_format(Some("image/heic"), "photo.jpg").unwrap(),
            SourceFormat::Heif
        );
    }

    #[test]
    fn sniff_falls_back_to_extension() {
        assert_eq!(
            sniff_format(None, "party.JPEG").unwrap(),
            SourceFormat::Jpeg
        );
        assert_eq!(sniff_format(None, "party.heif").unwrap(), SourceFormat::Heif);
    }

    #[test]
    fn sniff_rejects_non_image_mime() {
        let err = sniff_format(Some("application/pdf"), "file.png").unwrap_err();
        assert!(matches!(err, ScrivoError::UnsupportedFormat(_)));
    }

    #[test]
    fn sniff_rejects_unknown_extension() {
        let err = sniff_format(None, "notes.txt").unwrap_err();
        assert!(matches!(err, ScrivoError::UnsupportedFormat(_)));
    }

    #[test]
    fn clamp_scales_longest_side_to_max() {
        assert_eq!(clamp_dimensions(1600, 1200), (1000, 750));
        assert_eq!(clamp_dimensions(1200, 1600), (750, 1000));
        assert_eq!(clamp_dimensions(3000, 10), (1000, 3));
    }

    #[test]
    fn clamp_leaves_small_images_alone() {
        assert_eq!(clamp_dimensions(800, 600), (800, 600));
        assert_eq!(clamp_dimensions(1000, 1000), (1000, 1000));
        assert_eq!(clamp_dimensions(0, 0), (0, 0));
    }

    #[test]
    fn decode_clamped_premultiplies() {
        let src_rgba = vec![100u8, 50u8, 200u8, 128u8];
        let img = image::RgbaImage::from_raw(1, 1, src_rgba).unwrap();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let prepared = decode_clamped(&buf).unwrap();
        assert_eq!(prepared.width, 1);
        assert_eq!(prepared.height, 1);
        assert_eq!(
            prepared.rgba8_premul.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn ingest_clamps_oversized_uploads() {
        let buf = png_bytes(1600, 1200);
        let ingested = ingest(&buf, Some("image/png"), "big.png").unwrap();
        assert_eq!((ingested.width(), ingested.height()), (1000, 750));
    }

    #[test]
    fn corrupt_png_is_a_decode_failure() {
        let err = ingest(b"not a png", Some("image/png"), "bad.png").unwrap_err();
        assert!(matches!(err, ScrivoError::DecodeFailure(_)));
    }

    #[test]
    fn corrupt_heic_is_a_decode_failure_not_a_fallback() {
        // Fails either at the transcode step (ffmpeg present) or when
        // spawning ffmpeg (absent); both must surface as DecodeFailure.
        let err = ingest(b"definitely not heif", None, "bad.heic").unwrap_err();
        assert!(matches!(err, ScrivoError::DecodeFailure(_)));
    }
}
