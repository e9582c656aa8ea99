//! # invoice-annotate
//!
//! Extract key fields from an invoice PDF with a multimodal model, then write
//! a copy of the PDF with every located field outlined and labelled.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL (in memory)
//!  ├─ 2. Extract   one model call: PDF (or page PNGs) + instruction + schema
//!  ├─ 3. Validate  JSON reply checked against the invoice schema
//!  ├─ 4. Plan      per page: which boxes to draw, in PDF points
//!  └─ 5. Assemble  overlays merged onto the original pages, written once
//! ```
//!
//! The model answers with boxes in a normalized `[y_min, x_min, y_max, x_max]`
//! space of 0–1000 with the origin at the top left. Each box is converted to
//! page points using the page's MediaBox; `[0, 0, 0, 0]` means the field was
//! not found and is never drawn.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_annotate::{annotate_invoice, AnnotationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Default provider: gemini / gemini-2.5-flash, key from GEMINI_API_KEY
//!     let config = AnnotationConfig::default();
//!     let report = annotate_invoice("invoice.pdf", "invoice_annotated.pdf", &config).await?;
//!     for field in &report.fields {
//!         println!("{field}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Offline Annotation
//!
//! A saved reply can be replayed without any model call:
//!
//! ```rust,no_run
//! use invoice_annotate::{annotate_with_fields, load_fields_file, AnnotationConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let invoice = load_fields_file("fields.json")?;
//! let config = AnnotationConfig::default();
//! annotate_with_fields("invoice.pdf", invoice, "out.pdf", &config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-annotate` binary (clap, anyhow, tracing-subscriber, indicatif, dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotate;
pub mod config;
pub mod error;
pub mod fields;
pub mod geometry;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use annotate::{
    annotate_document, annotate_invoice, annotate_invoice_sync, annotate_invoice_with, annotate_with_fields,
    check_document, default_output_path, extract_fields, extract_fields_with, load_fields_file,
};
pub use config::{AnnotationConfig, AnnotationConfigBuilder, BoxPolicy, DocumentPayload, OverlayStyle};
pub use error::{AnnotateError, FieldIssue};
pub use fields::{BoundingBox, FieldRecord, FieldValue, Invoice};
pub use geometry::{PageGeometry, PageRect};
pub use output::{AnnotationReport, ExtractionStats, MarkSummary, PageSummary};
pub use pipeline::extract::{BackendReply, ExtractionBackend, ExtractionRequest};
pub use pipeline::input::InputDocument;
pub use progress::{AnnotationProgressCallback, NoopProgressCallback, ProgressCallback};
