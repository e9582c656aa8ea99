//! Overlay compositor: decide what to draw on each page, and encode it.
//!
//! Planning is pure. [`plan_document`] maps the ordered page geometries to
//! one [`PagePlan`] each, without touching the PDF; the assembler applies
//! the plans afterwards. A plan with no marks means the page passes through
//! untouched.
//!
//! A page's marks are: for every field whose `page` equals the page's
//! 1-based index and whose box survives [`resolve_box`], one stroked
//! rectangle at the transformed position and the field label just above its
//! top edge.

use crate::config::{BoxPolicy, OverlayStyle};
use crate::error::FieldIssue;
use crate::fields::FieldRecord;
use crate::geometry::{resolve_box, to_page_rect, BoxDecision, PageGeometry, PageRect};
use crate::output::{MarkSummary, PageSummary};
use lopdf::content::{Content, Operation};
use lopdf::Object;

/// Resource name the label font is registered under on annotated pages.
pub const LABEL_FONT_RESOURCE: &str = "InvAnnotHelv";

/// Vertical gap between a rectangle's top edge and its label baseline, in points.
const LABEL_GAP: f64 = 2.0;

/// One rectangle plus label.
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub label: String,
    pub rect: PageRect,
}

/// Everything to draw on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    /// 1-indexed page number.
    pub page_num: u32,
    pub geometry: PageGeometry,
    pub marks: Vec<Mark>,
}

impl PagePlan {
    /// No marks: the page is copied through unmodified.
    pub fn is_pass_through(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn summary(&self) -> PageSummary {
        PageSummary {
            page_num: self.page_num,
            width: self.geometry.width,
            height: self.geometry.height,
            marks: self
                .marks
                .iter()
                .map(|m| MarkSummary {
                    label: m.label.clone(),
                    rect: m.rect,
                })
                .collect(),
        }
    }
}

/// Plans for every page, plus the field issues found while planning.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPlan {
    pub pages: Vec<PagePlan>,
    pub issues: Vec<FieldIssue>,
}

/// Plan one page from the fields assigned to it.
pub fn plan_page(
    page_num: u32,
    geometry: PageGeometry,
    fields: &[FieldRecord],
    policy: BoxPolicy,
) -> (PagePlan, Vec<FieldIssue>) {
    let mut issues = Vec::new();
    let marks = fields
        .iter()
        .filter(|f| f.page == page_num)
        .filter_map(|f| match resolve_box(f, policy) {
            BoxDecision::Draw(bbox, issue) => {
                issues.extend(issue);
                Some(Mark {
                    label: f.label.clone(),
                    rect: to_page_rect(&bbox, &geometry),
                })
            }
            BoxDecision::Skip(issue) => {
                issues.extend(issue);
                None
            }
        })
        .collect();

    (
        PagePlan {
            page_num,
            geometry,
            marks,
        },
        issues,
    )
}

/// Plan the whole document: one plan per page, in page order.
///
/// Fields pointing at a page the document does not have are reported as
/// [`FieldIssue::PageOutOfRange`] (sentinel fields excepted) and never drawn.
pub fn plan_document(
    geometries: &[PageGeometry],
    fields: &[FieldRecord],
    policy: BoxPolicy,
) -> DocumentPlan {
    let total = geometries.len() as u32;

    let stray = fields
        .iter()
        .filter(|f| !f.bounding_box.is_sentinel() && (f.page == 0 || f.page > total))
        .map(|f| FieldIssue::PageOutOfRange {
            label: f.label.clone(),
            page: f.page,
            total,
        });

    let (pages, page_issues): (Vec<PagePlan>, Vec<Vec<FieldIssue>>) = geometries
        .iter()
        .zip(1..)
        .map(|(geometry, page_num)| plan_page(page_num, *geometry, fields, policy))
        .unzip();

    DocumentPlan {
        pages,
        issues: page_issues.into_iter().flatten().chain(stray).collect(),
    }
}

/// Content operations drawing the plan's marks, wrapped in `q`/`Q`.
pub fn overlay_operations(marks: &[Mark], style: &OverlayStyle) -> Vec<Operation> {
    let [r, g, b] = style.stroke.map(Object::Real);
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("RG", vec![r.clone(), g.clone(), b.clone()]),
        Operation::new("rg", vec![r, g, b]),
        Operation::new("w", vec![Object::Real(style.line_width)]),
    ];

    for mark in marks {
        let rect = &mark.rect;
        ops.push(Operation::new(
            "re",
            vec![num(rect.x), num(rect.y), num(rect.width), num(rect.height)],
        ));
        ops.push(Operation::new("S", vec![]));
    }

    for mark in marks {
        ops.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(LABEL_FONT_RESOURCE.as_bytes().to_vec()),
                    Object::Real(style.font_size),
                ],
            ),
            Operation::new("Td", vec![num(mark.rect.x), num(mark.rect.top() + LABEL_GAP)]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi_label(&mark.label))]),
            Operation::new("ET", vec![]),
        ]);
    }

    ops.push(Operation::new("Q", vec![]));
    ops
}

/// Encode the overlay for one page as content-stream bytes.
pub fn encode_overlay(marks: &[Mark], style: &OverlayStyle) -> Result<Vec<u8>, lopdf::Error> {
    Content {
        operations: overlay_operations(marks, style),
    }
    .encode()
}

fn num(v: f64) -> Object {
    Object::Real(v as f32)
}

/// Helvetica with WinAnsiEncoding covers printable ASCII; anything else is `?`.
fn win_ansi_label(label: &str) -> Vec<u8> {
    label
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}
