//! Progress-callback trait for extraction and annotation events.
//!
//! Inject an [`Arc<dyn AnnotationProgressCallback>`] via
//! [`crate::config::AnnotationConfigBuilder::progress_callback`] to hear
//! about each stage of a run: the (possibly slow) model call, then one event
//! per page of the assembled document.
//!
//! # Example
//!
//! ```rust
//! use invoice_annotate::{AnnotationProgressCallback, AnnotationConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct MarkCounter {
//!     marks: AtomicUsize,
//! }
//!
//! impl AnnotationProgressCallback for MarkCounter {
//!     fn on_page_annotated(&self, page_num: u32, total_pages: u32, marks: usize) {
//!         self.marks.fetch_add(marks, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total_pages}: {marks} marks");
//!     }
//! }
//!
//! let config = AnnotationConfig::builder()
//!     .progress_callback(Arc::new(MarkCounter { marks: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it moves through a run.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline is sequential, but the trait is
/// `Send + Sync` so callbacks can be shared with other threads (a terminal
/// spinner, for instance).
pub trait AnnotationProgressCallback: Send + Sync {
    /// Called just before the document is sent to the model.
    ///
    /// # Arguments
    /// * `attachments`: number of parts attached (1 for a native PDF,
    ///   one per page for rendered pages)
    fn on_extraction_start(&self, attachments: usize) {
        let _ = attachments;
    }

    /// Called once the reply has been received and validated.
    ///
    /// # Arguments
    /// * `located`: number of fields the model located on a page; fields
    ///   reported with the `[0,0,0,0]` box are not counted
    fn on_extraction_complete(&self, located: usize) {
        let _ = located;
    }

    /// Called once per page, in page order, after its plan is applied.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: pages in the document
    /// * `marks`: marks drawn on this page (0 means passed through)
    fn on_page_annotated(&self, page_num: u32, total_pages: u32, marks: usize) {
        let _ = (page_num, total_pages, marks);
    }

    /// Called once after the output document has been written.
    fn on_annotation_complete(&self, total_pages: u32, annotated_pages: u32) {
        let _ = (total_pages, annotated_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnnotationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnnotationConfig`].
pub type ProgressCallback = Arc<dyn AnnotationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl AnnotationProgressCallback for Recorder {
        fn on_extraction_start(&self, attachments: usize) {
            self.events.lock().unwrap().push(format!("extract:{attachments}"));
        }

        fn on_page_annotated(&self, page_num: u32, total_pages: u32, marks: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("page:{page_num}/{total_pages}:{marks}"));
        }
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_extraction_start(1);
        rec.on_extraction_complete(5);
        rec.on_page_annotated(1, 2, 3);
        rec.on_page_annotated(2, 2, 0);
        rec.on_annotation_complete(2, 1);
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["extract:1", "page:1/2:3", "page:2/2:0"]
        );
    }

    #[test]
    fn noop_is_usable_as_trait_object() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_extraction_start(3);
        cb.on_annotation_complete(3, 0);
    }
}
