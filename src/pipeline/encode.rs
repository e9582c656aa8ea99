//! Attachment encoding: raw PDF or rendered page → base64 `ImageData`.
//!
//! `edgequake-llm` carries every binary attachment as an [`ImageData`]:
//! base64 payload plus MIME type. Providers with native document input
//! (Gemini) receive the PDF itself as `application/pdf`; image-only
//! providers receive one lossless PNG per page.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// MIME type used for the native PDF attachment.
pub const PDF_MIME: &str = "application/pdf";

/// Attach the whole document as a base64 PDF part.
pub fn encode_document(pdf_bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(pdf_bytes);
    debug!("Encoded PDF → {} bytes base64", b64.len());
    ImageData::new(b64, PDF_MIME)
}

/// Encode a rasterised page as a base64 PNG.
///
/// `detail: "high"` keeps fine print legible to OpenAI-style tilers; small
/// amounts and account numbers are exactly what gets lost at low detail.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn document_round_trips_through_base64() {
        let pdf = b"%PDF-1.4\n%%EOF\n";
        let data = encode_document(pdf);
        assert_eq!(data.mime_type, PDF_MIME);
        assert_eq!(STANDARD.decode(&data.data).unwrap(), pdf);
    }

    #[test]
    fn page_is_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }
}
