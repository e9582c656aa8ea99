//! Top-level entry points: extract the invoice fields, then annotate.
//!
//! The two stages run strictly one after the other. [`annotate_invoice`]
//! chains both; [`extract_fields`] and [`annotate_with_fields`] expose each
//! half so a caller can inspect the fields first, or annotate from a reply
//! saved earlier without calling the model at all.

use crate::config::{AnnotationConfig, DocumentPayload, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::AnnotateError;
use crate::fields::{invoice_schema, Invoice};
use crate::output::{AnnotationReport, ExtractionStats};
use crate::pipeline::input::{self, InputDocument};
use crate::geometry::PageGeometry;
use crate::pipeline::extract::{ExtractionBackend, ExtractionRequest};
use crate::pipeline::{assemble, encode, extract, render, response};
use edgequake_llm::{ImageData, LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extract the fields of the invoice at `input` and write an annotated copy
/// to `output`.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`: Local file path or HTTP/HTTPS URL to a PDF
/// * `output`: Destination of the annotated PDF
/// * `config`: Extraction and drawing configuration
///
/// # Errors
/// Every failure is fatal: unreadable input, an unusable provider, a failed
/// model call, a reply that is not valid JSON or breaks the schema, and any
/// error while reading, composing or writing the PDF. Per-field problems are
/// not errors; they are listed in [`AnnotationReport::issues`].
pub async fn annotate_invoice(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &AnnotationConfig,
) -> Result<AnnotationReport, AnnotateError> {
    let provider = resolve_provider(config)?;
    annotate_invoice_with(&provider, input_str, output_path, config).await
}

/// [`annotate_invoice`] with an explicit extraction backend.
///
/// The page tree is read before the model is called, so a PDF that could
/// never be annotated fails without spending a request.
pub async fn annotate_invoice_with(
    backend: &dyn ExtractionBackend,
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &AnnotationConfig,
) -> Result<AnnotationReport, AnnotateError> {
    let input_str = input_str.as_ref();
    info!("Annotating invoice: {}", input_str);

    let document = input::resolve_input(input_str, config.download_timeout_secs).await?;
    check_document(&document).await?;
    let (invoice, stats) = extract_fields_with(backend, &document, config).await?;
    annotate_document(&document, invoice, Some(stats), output_path.as_ref(), config).await
}

/// Annotate `input` from an already-validated field set, skipping the model.
pub async fn annotate_with_fields(
    input_str: impl AsRef<str>,
    invoice: Invoice,
    output_path: impl AsRef<Path>,
    config: &AnnotationConfig,
) -> Result<AnnotationReport, AnnotateError> {
    let document = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    annotate_document(&document, invoice, None, output_path.as_ref(), config).await
}

/// Run the extractor stage alone: one model call, one validated [`Invoice`].
pub async fn extract_fields(
    document: &InputDocument,
    config: &AnnotationConfig,
) -> Result<(Invoice, ExtractionStats), AnnotateError> {
    let provider = resolve_provider(config)?;
    extract_fields_with(&provider, document, config).await
}

/// [`extract_fields`] with an explicit extraction backend.
pub async fn extract_fields_with(
    backend: &dyn ExtractionBackend,
    document: &InputDocument,
    config: &AnnotationConfig,
) -> Result<(Invoice, ExtractionStats), AnnotateError> {
    let rendered_pages = config.payload == DocumentPayload::RenderedPages;
    let attachments = build_attachments(document, config).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(attachments.len());
    }

    let request = ExtractionRequest::new(attachments, &invoice_schema(), config, rendered_pages);
    let raw = extract::request_fields(backend, &request, config).await?;
    let invoice = response::parse_reply(&raw.text)?;

    let located = invoice
        .records()
        .iter()
        .filter(|r| !r.bounding_box.is_sentinel())
        .count();
    info!(
        "Extracted invoice fields ({} located) in {}ms",
        located, raw.stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(located);
    }

    Ok((invoice, raw.stats))
}

/// Read the page geometry of a document without changing it.
///
/// Fails with the same errors [`annotate_document`] would raise for an
/// unreadable page tree.
pub async fn check_document(document: &InputDocument) -> Result<Vec<PageGeometry>, AnnotateError> {
    let bytes = document.bytes.clone();
    let origin = document.origin.clone();
    let geometries = tokio::task::spawn_blocking(move || assemble::read_geometries(&bytes, &origin))
        .await
        .map_err(|e| AnnotateError::Internal(format!("Geometry task panicked: {}", e)))??;
    debug!("{} pages ready for annotation", geometries.len());
    Ok(geometries)
}

/// Run the annotator stage on a document already in memory.
pub async fn annotate_document(
    document: &InputDocument,
    invoice: Invoice,
    extraction: Option<ExtractionStats>,
    output_path: &Path,
    config: &AnnotationConfig,
) -> Result<AnnotationReport, AnnotateError> {
    let fields = invoice.records();

    let bytes = document.bytes.clone();
    let origin = document.origin.clone();
    let records = fields.clone();
    let policy = config.box_policy;
    let style = config.style;
    let progress = config.progress_callback.clone();
    let assembled = tokio::task::spawn_blocking(move || {
        assemble::assemble(&bytes, &origin, &records, policy, &style, progress.as_ref())
    })
    .await
    .map_err(|e| AnnotateError::Internal(format!("Assemble task panicked: {}", e)))??;

    for issue in &assembled.plan.issues {
        warn!("{}", issue);
    }

    assemble::write_output(output_path, &assembled.bytes).await?;

    let pages: Vec<_> = assembled.plan.pages.iter().map(|p| p.summary()).collect();
    let annotated = pages.iter().filter(|p| !p.marks.is_empty()).count() as u32;
    info!(
        "Annotation complete: {}/{} pages annotated → {}",
        annotated,
        pages.len(),
        output_path.display()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_annotation_complete(pages.len() as u32, annotated);
    }

    Ok(AnnotationReport {
        invoice,
        fields,
        pages,
        issues: assembled.plan.issues,
        output_path: output_path.to_path_buf(),
        extraction,
    })
}

/// Synchronous wrapper around [`annotate_invoice`].
///
/// Creates a temporary tokio runtime internally.
pub fn annotate_invoice_sync(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &AnnotationConfig,
) -> Result<AnnotationReport, AnnotateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnnotateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(annotate_invoice(input_str, output_path, config))
}

/// Load a saved model reply and validate it exactly like a live one.
pub fn load_fields_file(path: impl AsRef<Path>) -> Result<Invoice, AnnotateError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| AnnotateError::FieldsFileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded fields from {}", path.display());
    response::parse_reply(&text)
}

/// `<stem>_annotated.pdf` next to a local input, or in the working
/// directory for a URL.
pub fn default_output_path(input_str: &str) -> PathBuf {
    let name = if input::is_url(input_str) {
        input_str
            .split(['?', '#'])
            .next()
            .and_then(|s| s.rsplit('/').next())
            .unwrap_or_default()
    } else {
        input_str
    };
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "invoice".to_string());
    let file_name = format!("{stem}_annotated.pdf");

    if input::is_url(input_str) {
        PathBuf::from(file_name)
    } else {
        path.with_file_name(file_name)
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn build_attachments(
    document: &InputDocument,
    config: &AnnotationConfig,
) -> Result<Vec<ImageData>, AnnotateError> {
    match config.payload {
        DocumentPayload::NativePdf => Ok(vec![encode::encode_document(&document.bytes)]),
        DocumentPayload::RenderedPages => {
            let images = render::render_pages(&document.bytes, config).await?;
            images
                .iter()
                .enumerate()
                .map(|(idx, img)| {
                    encode::encode_page(img).map_err(|e| AnnotateError::RasterisationFailed {
                        page: idx + 1,
                        detail: format!("Image encoding failed: {}", e),
                    })
                })
                .collect()
        }
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AnnotateError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AnnotateError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`). The API key is
///    read from the environment by the factory.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both set and non-empty.
/// 4. **Default**: `gemini` with `gemini-2.5-flash` (or `config.model`),
///    which accepts PDF input natively.
/// 5. **Auto-detection** (`ProviderFactory::from_env`) when the default
///    provider has no API key.
fn resolve_provider(config: &AnnotationConfig) -> Result<Arc<dyn LLMProvider>, AnnotateError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model_for(name));
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    match create_provider(DEFAULT_PROVIDER, model) {
        Ok(provider) => Ok(provider),
        Err(e) => {
            debug!("Default provider unavailable ({}), auto-detecting", e);
            let (llm_provider, _embedding) =
                ProviderFactory::from_env().map_err(|e| AnnotateError::ProviderNotConfigured {
                    provider: "auto".to_string(),
                    hint: format!(
                        "No LLM provider could be auto-detected from environment.\n\
                        Set GEMINI_API_KEY (default provider), or pass --provider.\n\
                        Error: {}",
                        e
                    ),
                })?;
            Ok(llm_provider)
        }
    }
}

/// Model used when a provider is named without one.
fn default_model_for(provider_name: &str) -> &'static str {
    match provider_name.to_ascii_lowercase().as_str() {
        "openai" | "azure" => "gpt-4.1-nano",
        "anthropic" => "claude-sonnet-4-20250514",
        _ => DEFAULT_MODEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_sits_next_to_input() {
        assert_eq!(
            default_output_path("scans/march/invoice-0042.pdf"),
            PathBuf::from("scans/march/invoice-0042_annotated.pdf")
        );
        assert_eq!(default_output_path("inv.pdf"), PathBuf::from("inv_annotated.pdf"));
    }

    #[test]
    fn output_path_for_url_uses_last_segment() {
        assert_eq!(
            default_output_path("https://example.com/files/bill.pdf?token=abc"),
            PathBuf::from("bill_annotated.pdf")
        );
        assert_eq!(
            default_output_path("https://example.com/"),
            PathBuf::from("invoice_annotated.pdf")
        );
    }

    #[test]
    fn named_provider_gets_a_matching_model() {
        assert_eq!(default_model_for("gemini"), "gemini-2.5-flash");
        assert_eq!(default_model_for("OpenAI"), "gpt-4.1-nano");
    }

    #[test]
    fn missing_fields_file_is_reported() {
        let err = load_fields_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, AnnotateError::FieldsFileUnreadable { .. }), "{err:?}");
    }
}
