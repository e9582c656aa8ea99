//! Document assembler: apply page plans to the original PDF and write it.
//!
//! The original document is parsed once with lopdf. Page geometry comes from
//! each page's MediaBox (inherited through `/Parent` when the page does not
//! carry its own). Plans are computed by [`super::overlay::plan_document`]
//! before anything is modified, then applied page by page in order:
//!
//! * pass-through pages are not touched at all, so their dictionaries and
//!   content streams are written out exactly as they were read;
//! * annotated pages get their existing content bracketed by `q` … `Q`
//!   (two new one-line streams) and the overlay stream appended after it.
//!   Original streams are never rewritten. The label font is added to a
//!   page-local copy of the resources so shared resource dictionaries stay
//!   unchanged for the other pages.
//!
//! Page count and order never change.

use crate::config::{BoxPolicy, OverlayStyle};
use crate::error::AnnotateError;
use crate::fields::FieldRecord;
use crate::geometry::PageGeometry;
use crate::pipeline::overlay::{encode_overlay, plan_document, DocumentPlan, LABEL_FONT_RESOURCE};
use crate::progress::ProgressCallback;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;
use tracing::{debug, info};

/// Upper bound on `/Parent` hops and reference chains followed while resolving.
const MAX_RESOLVE_DEPTH: usize = 32;

/// Result of assembling the annotated document in memory.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    /// Serialised output PDF.
    pub bytes: Vec<u8>,
    /// The plans that were applied, one per page.
    pub plan: DocumentPlan,
}

/// Build the annotated document from the original bytes and the field set.
pub fn assemble(
    pdf_bytes: &[u8],
    origin: &str,
    fields: &[FieldRecord],
    policy: BoxPolicy,
    style: &OverlayStyle,
    progress: Option<&ProgressCallback>,
) -> Result<AssembledDocument, AnnotateError> {
    let (mut doc, page_ids, geometries) = load_document(pdf_bytes, origin)?;
    let corrupt = |e: lopdf::Error| corrupt_pdf(origin, e);

    let plan = plan_document(&geometries, fields, policy);
    let total = page_ids.len() as u32;

    let mut font_id = None;
    for (&page_id, page_plan) in page_ids.iter().zip(&plan.pages) {
        if !page_plan.is_pass_through() {
            let overlay = encode_overlay(&page_plan.marks, style).map_err(|e| {
                AnnotateError::OverlayEncodingFailed {
                    page: page_plan.page_num,
                    detail: e.to_string(),
                }
            })?;
            let font = *font_id.get_or_insert_with(|| doc.add_object(label_font()));
            merge_overlay(&mut doc, page_id, overlay, font).map_err(corrupt)?;
            debug!(
                "Page {}: merged {} marks",
                page_plan.page_num,
                page_plan.marks.len()
            );
        }
        if let Some(cb) = progress {
            cb.on_page_annotated(page_plan.page_num, total, page_plan.marks.len());
        }
    }

    let mut bytes = Vec::with_capacity(pdf_bytes.len() + 4096);
    doc.save_to(&mut bytes).map_err(|e| AnnotateError::Internal(format!("PDF serialisation failed: {e}")))?;

    Ok(AssembledDocument { bytes, plan })
}

/// Page geometries of a document, in page order.
///
/// Runs the same load and geometry checks as [`assemble`], so a document
/// that passes here will not fail later for an unreadable page tree.
pub fn read_geometries(pdf_bytes: &[u8], origin: &str) -> Result<Vec<PageGeometry>, AnnotateError> {
    load_document(pdf_bytes, origin).map(|(_, _, geometries)| geometries)
}

fn corrupt_pdf(origin: &str, e: lopdf::Error) -> AnnotateError {
    AnnotateError::CorruptPdf {
        origin: origin.to_string(),
        detail: e.to_string(),
    }
}

/// Parse the document and read every page's geometry.
fn load_document(
    pdf_bytes: &[u8],
    origin: &str,
) -> Result<(Document, Vec<ObjectId>, Vec<PageGeometry>), AnnotateError> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| corrupt_pdf(origin, e))?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    info!("PDF loaded: {} pages", page_ids.len());

    let geometries = page_ids
        .iter()
        .zip(1..)
        .map(|(&id, page_num)| page_geometry(&doc, id, page_num))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((doc, page_ids, geometries))
}

/// Write the output next to its destination, then rename it into place.
pub async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), AnnotateError> {
    let failed = |source| AnnotateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(failed)?;

    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

// ── Geometry ─────────────────────────────────────────────────────────────

fn page_geometry(doc: &Document, page_id: ObjectId, page_num: u32) -> Result<PageGeometry, AnnotateError> {
    let missing = |detail: String| AnnotateError::MissingPageGeometry {
        page: page_num,
        detail,
    };

    let media_box = inherited(doc, page_id, b"MediaBox")
        .map_err(|e| missing(e.to_string()))?
        .ok_or_else(|| missing("no MediaBox on the page or its ancestors".into()))?;
    let array = resolve(doc, media_box)
        .and_then(Object::as_array)
        .map_err(|e| missing(e.to_string()))?;

    let values: Vec<f64> = array
        .iter()
        .map(|o| resolve(doc, o).ok().and_then(object_to_f64))
        .collect::<Option<_>>()
        .ok_or_else(|| missing("non-numeric MediaBox entry".into()))?;
    let corners: [f64; 4] = values
        .try_into()
        .map_err(|v: Vec<f64>| missing(format!("expected 4 MediaBox entries, got {}", v.len())))?;

    let geometry = PageGeometry::from_media_box(corners);
    if geometry.width <= 0.0 || geometry.height <= 0.0 {
        return Err(missing(format!("empty MediaBox {corners:?}")));
    }
    Ok(geometry)
}

fn object_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

/// Follow a chain of references to the object it names.
///
/// A chain longer than [`MAX_RESOLVE_DEPTH`] comes back as the last
/// reference, which the caller's type check then rejects.
fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> lopdf::Result<&'a Object> {
    for _ in 0..MAX_RESOLVE_DEPTH {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id)?,
            _ => break,
        }
    }
    Ok(obj)
}

/// Look up a page attribute, walking up the page tree via `/Parent`.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> lopdf::Result<Option<&'a Object>> {
    let mut node = doc.get_dictionary(page_id)?;
    for _ in 0..MAX_RESOLVE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Ok(Some(value));
        }
        match node.get(b"Parent") {
            Ok(parent) => node = resolve(doc, parent)?.as_dict()?,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

// ── Merge ────────────────────────────────────────────────────────────────

fn label_font() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

fn merge_overlay(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>, font_id: ObjectId) -> lopdf::Result<()> {
    // Read everything needed from the original page before mutating it.
    let resources = page_resources(doc, page_id, font_id)?;
    let existing = existing_contents(doc, page_id)?;

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut closing = b"Q\n".to_vec();
    closing.extend_from_slice(&overlay);
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), closing));

    let contents: Vec<Object> = std::iter::once(Object::Reference(open_id))
        .chain(existing)
        .chain(std::iter::once(Object::Reference(overlay_id)))
        .collect();

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// The page's content stream references, flattened into a list.
fn existing_contents(doc: &Document, page_id: ObjectId) -> lopdf::Result<Vec<Object>> {
    let page = doc.get_dictionary(page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(c) => c,
        Err(_) => return Ok(Vec::new()),
    };
    match contents {
        // A reference may name a single stream or an indirect array of streams.
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(vec![contents.clone()]),
        },
        Object::Array(items) => Ok(items.clone()),
        other => Ok(vec![other.clone()]),
    }
}

/// A page-local copy of the effective resources, with the label font added.
fn page_resources(doc: &Document, page_id: ObjectId, font_id: ObjectId) -> lopdf::Result<Dictionary> {
    let mut resources = match inherited(doc, page_id, b"Resources")? {
        Some(obj) => resolve(doc, obj)?.as_dict()?.clone(),
        None => Dictionary::new(),
    };

    let mut fonts = match resources.get(b"Font") {
        Ok(obj) => resolve(doc, obj)?.as_dict()?.clone(),
        Err(_) => Dictionary::new(),
    };
    fonts.set(LABEL_FONT_RESOURCE, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    Ok(resources)
}
