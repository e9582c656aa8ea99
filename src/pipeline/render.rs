//! Page rasterisation via pdfium, for the rendered-pages payload.
//!
//! Only providers without native PDF input need this stage. pdfium wraps a
//! C++ library with thread-local state, so all work runs inside
//! `spawn_blocking`. Pages render at `dpi`, with the longest edge capped by
//! `max_rendered_pixels`; the normalized box space the model answers in does
//! not depend on the rendered resolution.

use crate::config::AnnotationConfig;
use crate::error::AnnotateError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Environment variable naming an existing pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise every page of the document, in page order.
pub async fn render_pages(
    pdf_bytes: &[u8],
    config: &AnnotationConfig,
) -> Result<Vec<DynamicImage>, AnnotateError> {
    let bytes = pdf_bytes.to_vec();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&bytes, dpi, max_pixels, password.as_deref())
    })
    .await
    .map_err(|e| AnnotateError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf_bytes: &[u8],
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, AnnotateError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, password)
        .map_err(|e| AnnotateError::CorruptPdf {
            origin: "<memory>".to_string(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    info!("Rasterising {} pages", pages.len());

    // Points are 1/72 inch; the pixel cap wins over the requested DPI.
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| AnnotateError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

/// Bind pdfium: `PDFIUM_LIB_PATH` first, then the system loader.
fn bind_pdfium() -> Result<Pdfium, AnnotateError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(p) if !p.is_empty() => {
            let lib = PathBuf::from(p);
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| AnnotateError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
