//! Pipeline stages for invoice annotation.
//!
//! Each submodule implements one step. The extractor half ends in a
//! validated [`crate::fields::Invoice`]; the annotator half starts from one,
//! which is what lets a saved reply stand in for a live model call.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode/render ──▶ extract ──▶ response ──▶ overlay ──▶ assemble
//! (path/URL)  (attachments)    (model)    (validate)    (plan)     (merge, write)
//! ```
//!
//! 1. [`input`]: read the local file or download the URL into memory
//! 2. [`encode`]: base64-wrap the PDF, or PNG-encode rendered pages
//! 3. [`render`]: rasterise pages with pdfium (rendered-pages payload only)
//! 4. [`extract`]: the single model call; the only stage with network I/O
//!    besides URL download
//! 5. [`response`]: parse and schema-check the reply
//! 6. [`overlay`]: pure per-page planning and content-stream encoding
//! 7. [`assemble`]: apply the plans with lopdf and write the output

pub mod assemble;
pub mod encode;
pub mod extract;
pub mod input;
pub mod overlay;
pub mod render;
pub mod response;
