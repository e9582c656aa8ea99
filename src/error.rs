//! Error types for the invoice-annotate library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnnotateError`] is **fatal**: the run cannot produce an output document
//!   (unreadable input, provider not configured, reply that does not match
//!   the schema, unwritable destination). Returned as `Err(AnnotateError)`
//!   from every top-level entry point.
//!
//! * [`FieldIssue`] is **non-fatal**: one extracted field could not be drawn
//!   as reported (malformed box, page that does not exist). Collected in
//!   [`crate::output::AnnotationReport::issues`]; the other fields are still
//!   drawn.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the invoice-annotate library.
#[derive(Debug, Error)]
pub enum AnnotateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a readable path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The input was read, but is not a PDF.
    #[error("Input is not a valid PDF: '{origin}'\nFirst bytes: {magic:?}")]
    NotAPdf { origin: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF structure could not be parsed.
    #[error("PDF '{origin}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { origin: String, detail: String },

    /// A page has no usable MediaBox, so its size is unknown.
    #[error("Page {page} has no usable MediaBox: {detail}")]
    MissingPageGeometry { page: u32, detail: String },

    /// pdfium could not rasterise a page for the rendered-pages payload.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
pdfium is only needed for the rendered-pages payload. Either:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium, or\n\
  • Install libpdfium where the system loader finds it, or\n\
  • Use the native PDF payload (the default).\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM call itself failed (network, authentication, quota, ...).
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Reply validation errors ───────────────────────────────────────────
    /// The reply is not JSON at all.
    #[error("Model reply is not valid JSON: {detail}\nReply starts with: {excerpt:?}")]
    MalformedResponse { detail: String, excerpt: String },

    /// The reply is JSON but does not match the invoice schema.
    #[error("Model reply does not match the invoice schema:\n  - {}", violations.join("\n  - "))]
    SchemaViolation { violations: Vec<String> },

    /// A saved fields file could not be read.
    #[error("Failed to read fields file '{path}': {source}")]
    FieldsFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The overlay content stream could not be encoded.
    #[error("Failed to encode overlay for page {page}: {detail}")]
    OverlayEncodingFailed { page: u32, detail: String },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem with a single extracted field.
///
/// Recorded in the run report; the field in question is either skipped
/// or drawn in corrected form, as stated by the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldIssue {
    /// The box is inverted or outside 0–1000; the field was not drawn.
    #[error("field '{label}': malformed bounding box {bounding_box:?} skipped")]
    MalformedBox {
        label: String,
        bounding_box: [i32; 4],
    },

    /// The box was clamped into 0–1000 and re-ordered before drawing.
    #[error("field '{label}': bounding box {original:?} clamped to {clamped:?}")]
    ClampedBox {
        label: String,
        original: [i32; 4],
        clamped: [i32; 4],
    },

    /// The field points at a page the document does not have.
    #[error("field '{label}': page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { label: String, page: u32, total: u32 },
}

impl FieldIssue {
    /// Label of the field this issue belongs to.
    pub fn label(&self) -> &str {
        match self {
            FieldIssue::MalformedBox { label, .. }
            | FieldIssue::ClampedBox { label, .. }
            | FieldIssue::PageOutOfRange { label, .. } => label,
        }
    }

    /// Whether the field was left off the output document.
    pub fn is_skipped(&self) -> bool {
        !matches!(self, FieldIssue::ClampedBox { .. })
    }
}
