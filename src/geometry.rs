//! Coordinate transform: normalized model boxes → PDF page space.
//!
//! The model reports boxes in a resolution-independent 0–1000 space whose
//! origin is the top-left corner with y growing downward. PDF user space
//! puts the origin at the bottom-left of the MediaBox with y growing upward,
//! in points. [`to_page_rect`] is the one place that flips between the two.
//!
//! ```text
//!  normalized (0..1000)            page space (points)
//!  (0,0) ───────▶ x                ▲ y
//!    │   ┌──────┐ y_min            │   ┌──────┐ y + h
//!    │   │      │                  │   │      │
//!    ▼   └──────┘ y_max            │   └──────┘ y
//!    y                           (0,0) ───────▶ x
//! ```
//!
//! The transform itself never validates. Whether a box is drawn at all is
//! decided beforehand by [`resolve_box`] under the configured [`BoxPolicy`].

use crate::config::BoxPolicy;
use crate::error::FieldIssue;
use crate::fields::{BoundingBox, FieldRecord, NORMALIZED_MAX};
use serde::{Deserialize, Serialize};

/// Size and origin of one page, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    /// Lower-left corner of the MediaBox; `(0, 0)` for almost every page.
    pub origin_x: f64,
    pub origin_y: f64,
}

impl PageGeometry {
    /// A page whose MediaBox starts at `(0, 0)`.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }

    /// Build from a MediaBox `[llx, lly, urx, ury]`, tolerating swapped corners.
    pub fn from_media_box([x0, y0, x1, y1]: [f64; 4]) -> Self {
        Self {
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
            origin_x: x0.min(x1),
            origin_y: y0.min(y1),
        }
    }
}

/// A rectangle in page space: lower-left corner plus size, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageRect {
    /// Y coordinate of the top edge.
    pub fn top(&self) -> f64 {
        self.y + self.height
    }
}

/// Convert a normalized box to a page-space rectangle.
///
/// `x = x_min/1000·W`, `w = (x_max−x_min)/1000·W`, `h = (y_max−y_min)/1000·H`,
/// `y = H − y_max/1000·H`, each shifted by the MediaBox origin.
pub fn to_page_rect(bbox: &BoundingBox, page: &PageGeometry) -> PageRect {
    let scale = f64::from(NORMALIZED_MAX);
    let sx = |v: i32| f64::from(v) / scale * page.width;
    let sy = |v: i32| f64::from(v) / scale * page.height;

    PageRect {
        x: page.origin_x + sx(bbox.x_min),
        y: page.origin_y + page.height - sy(bbox.y_max),
        width: sx(bbox.x_max - bbox.x_min),
        height: sy(bbox.y_max - bbox.y_min),
    }
}

/// What to do with one field's box.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxDecision {
    /// Draw this box; an issue is attached when the box had to be corrected.
    Draw(BoundingBox, Option<FieldIssue>),
    /// Not drawn: the sentinel (no issue) or a box rejected by the policy.
    Skip(Option<FieldIssue>),
}

/// Apply the sentinel check, then the box policy.
pub fn resolve_box(record: &FieldRecord, policy: BoxPolicy) -> BoxDecision {
    let bbox = record.bounding_box;
    if bbox.is_sentinel() {
        return BoxDecision::Skip(None);
    }
    if bbox.is_well_formed() {
        return BoxDecision::Draw(bbox, None);
    }

    match policy {
        BoxPolicy::Skip => BoxDecision::Skip(Some(FieldIssue::MalformedBox {
            label: record.label.clone(),
            bounding_box: bbox.to_array(),
        })),
        BoxPolicy::Clamp => {
            let fixed = clamp_box(bbox);
            let issue = FieldIssue::ClampedBox {
                label: record.label.clone(),
                original: bbox.to_array(),
                clamped: fixed.to_array(),
            };
            BoxDecision::Draw(fixed, Some(issue))
        }
    }
}

/// Clamp every coordinate into `[0, 1000]` and order each min/max pair.
fn clamp_box(b: BoundingBox) -> BoundingBox {
    let c = |v: i32| v.clamp(0, NORMALIZED_MAX);
    let (y0, y1) = (c(b.y_min), c(b.y_max));
    let (x0, x1) = (c(b.x_min), c(b.x_max));
    BoundingBox::new(y0.min(y1), x0.min(x1), y0.max(y1), x0.max(x1))
}
