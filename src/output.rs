//! Result types returned by the top-level entry points.

use crate::error::FieldIssue;
use crate::fields::{FieldRecord, Invoice};
use crate::geometry::PageRect;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a run produced, besides the output file itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationReport {
    /// The validated model reply.
    pub invoice: Invoice,
    /// Field records in label order, as printed by the CLI.
    pub fields: Vec<FieldRecord>,
    /// One entry per page of the output document, in page order.
    pub pages: Vec<PageSummary>,
    /// Fields that were skipped or corrected.
    pub issues: Vec<FieldIssue>,
    /// Where the annotated document was written.
    pub output_path: PathBuf,
    /// Model-call statistics; `None` when fields came from a saved reply.
    pub extraction: Option<ExtractionStats>,
}

impl AnnotationReport {
    /// Number of pages that received an overlay.
    pub fn annotated_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.marks.is_empty()).count()
    }

    /// Total number of marks drawn across the document.
    pub fn total_marks(&self) -> usize {
        self.pages.iter().map(|p| p.marks.len()).sum()
    }
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-indexed page number.
    pub page_num: u32,
    pub width: f64,
    pub height: f64,
    /// Marks drawn on the page; empty means the page passed through.
    pub marks: Vec<MarkSummary>,
}

/// One drawn rectangle, in page space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkSummary {
    pub label: String,
    pub rect: PageRect,
}

/// Token and timing figures for the single model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Parts attached to the request (1 for native PDF).
    pub attachments: usize,
}
