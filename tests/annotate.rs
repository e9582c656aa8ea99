//! Offline integration tests.
//!
//! Fixture PDFs are generated in memory with lopdf. Field sets come from JSON
//! replies, either directly or through a canned extraction backend, so
//! nothing here needs a model, an API key or pdfium.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use invoice_annotate::pipeline::response::validate_value;
use invoice_annotate::{
    annotate_invoice_with, annotate_with_fields, extract_fields_with, load_fields_file, AnnotateError,
    AnnotationConfig, AnnotationProgressCallback, BackendReply, BoxPolicy, ExtractionBackend,
    ExtractionRequest, FieldIssue, FieldValue, InputDocument, Invoice,
};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// An `n`-page document whose pages each carry their own MediaBox, font
/// resources and a single content stream printing "Page i".
fn fixture_pdf(n: usize, media_box: [i64; 4]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let kids: Vec<Object> = (1..=n)
        .map(|i| {
            let content = format!("BT /F1 12 Tf 72 720 Td (Page {i}) Tj ET\n").into_bytes();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
                "Contents" => content_id,
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => n as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A one-page document whose page tree has no MediaBox anywhere.
fn pdf_without_media_box() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn letter_pdf(n: usize) -> Vec<u8> {
    fixture_pdf(n, [0, 0, 612, 792])
}

fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path.to_string_lossy().into_owned()
}

fn entry(key: &str, payload: Value, bbox: [i32; 4], page: u32) -> Value {
    json!({ key: payload, "bounding_box": bbox, "page": page })
}

/// A reply where only `total` (page 1) and `sender` (page 3) were located.
fn reply() -> Value {
    json!({
        "total": entry("value", json!(1190.5), [100, 200, 300, 600], 1),
        "recipient": entry("name", Value::Null, [0, 0, 0, 0], 1),
        "tax": entry("value", Value::Null, [0, 0, 0, 0], 1),
        "sender": entry("name", json!("Widget Works"), [40, 50, 60, 300], 3),
        "account_no": entry("account_no", Value::Null, [0, 0, 0, 0], 1),
    })
}

fn invoice(value: Value) -> Invoice {
    validate_value(value).unwrap()
}

fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

fn page_text(doc: &Document, page_id: ObjectId) -> String {
    String::from_utf8(doc.get_page_content(page_id).unwrap()).unwrap()
}

/// Answers every request with the same reply and keeps what it was sent.
struct CannedModel {
    reply: String,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl CannedModel {
    fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ExtractionRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request was sent")
    }
}

#[async_trait]
impl ExtractionBackend for CannedModel {
    async fn complete(&self, request: &ExtractionRequest) -> Result<BackendReply, AnnotateError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(BackendReply {
            text: self.reply.clone(),
            input_tokens: 1200,
            output_tokens: 150,
        })
    }
}

#[derive(Default)]
struct ExtractionEvents {
    started_with: AtomicUsize,
    located: AtomicUsize,
}

impl AnnotationProgressCallback for ExtractionEvents {
    fn on_extraction_start(&self, attachments: usize) {
        self.started_with.store(attachments, Ordering::SeqCst);
    }
    fn on_extraction_complete(&self, located: usize) {
        self.located.store(located, Ordering::SeqCst);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn annotates_only_pages_with_located_fields() {
    let dir = tempfile::tempdir().unwrap();
    let original = letter_pdf(3);
    let input = write_fixture(dir.path(), "invoice.pdf", &original);
    let output = dir.path().join("out.pdf");

    let report = annotate_with_fields(&input, invoice(reply()), &output, &AnnotationConfig::default())
        .await
        .unwrap();

    assert_eq!(report.pages.len(), 3);
    assert_eq!(report.annotated_pages(), 2);
    assert_eq!(report.total_marks(), 2);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert!(report.extraction.is_none());

    let before = Document::load_mem(&original).unwrap();
    let after = Document::load(&output).unwrap();
    let (before_ids, after_ids) = (page_ids(&before), page_ids(&after));
    assert_eq!(after_ids.len(), 3);

    // Page 2 had nothing to draw and must come out unchanged.
    assert_eq!(
        before.get_page_content(before_ids[1]).unwrap(),
        after.get_page_content(after_ids[1]).unwrap()
    );

    let first = page_text(&after, after_ids[0]);
    assert!(first.contains("(Page 1) Tj"), "{first}");
    assert!(first.contains("(total) Tj"), "{first}");
    assert!(!first.contains("(sender) Tj"), "{first}");

    let third = page_text(&after, after_ids[2]);
    assert!(third.contains("(sender) Tj"), "{third}");
}

#[tokio::test]
async fn rectangle_matches_the_coordinate_transform() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &letter_pdf(1));
    let output = dir.path().join("out.pdf");

    let mut value = reply();
    value["sender"]["page"] = json!(1);
    let report = annotate_with_fields(&input, invoice(value), &output, &AnnotationConfig::default())
        .await
        .unwrap();

    let total = &report.pages[0].marks[0];
    assert_eq!(total.label, "total");
    assert!((total.rect.x - 122.4).abs() < 1e-9);
    assert!((total.rect.width - 244.8).abs() < 1e-9);
    assert!((total.rect.y - 554.4).abs() < 1e-9);
    assert!((total.rect.height - 158.4).abs() < 1e-9);
}

#[tokio::test]
async fn shifted_media_box_moves_the_marks() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &fixture_pdf(1, [100, 50, 712, 842]));
    let output = dir.path().join("out.pdf");

    let mut value = reply();
    value["sender"]["page"] = json!(1);
    let report = annotate_with_fields(&input, invoice(value), &output, &AnnotationConfig::default())
        .await
        .unwrap();

    let total = &report.pages[0].marks[0];
    assert!((total.rect.x - 222.4).abs() < 1e-9, "{:?}", total.rect);
    assert!((total.rect.y - 604.4).abs() < 1e-9, "{:?}", total.rect);
}

#[tokio::test]
async fn output_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &letter_pdf(3));
    let config = AnnotationConfig::default();

    let a = dir.path().join("a.pdf");
    let b = dir.path().join("b.pdf");
    annotate_with_fields(&input, invoice(reply()), &a, &config).await.unwrap();
    annotate_with_fields(&input, invoice(reply()), &b, &config).await.unwrap();

    assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
}

#[tokio::test]
async fn malformed_box_follows_policy() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &letter_pdf(3));

    let mut value = reply();
    value["total"]["bounding_box"] = json!([300, 600, 100, 1200]);

    let skipped = annotate_with_fields(
        &input,
        invoice(value.clone()),
        dir.path().join("skip.pdf"),
        &AnnotationConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(skipped.pages[0].marks.len(), 0);
    assert!(matches!(skipped.issues.as_slice(), [FieldIssue::MalformedBox { .. }]));

    let clamp = AnnotationConfig::builder().box_policy(BoxPolicy::Clamp).build().unwrap();
    let clamped = annotate_with_fields(&input, invoice(value), dir.path().join("clamp.pdf"), &clamp)
        .await
        .unwrap();
    assert_eq!(clamped.pages[0].marks.len(), 1);
    let rect = clamped.pages[0].marks[0].rect;
    assert!(rect.x + rect.width <= 612.0 + 1e-9, "{rect:?}");
    assert!(matches!(clamped.issues.as_slice(), [FieldIssue::ClampedBox { .. }]));
}

#[tokio::test]
async fn field_on_missing_page_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &letter_pdf(2));
    let output = dir.path().join("out.pdf");

    let report = annotate_with_fields(&input, invoice(reply()), &output, &AnnotationConfig::default())
        .await
        .unwrap();

    assert_eq!(report.annotated_pages(), 1);
    match report.issues.as_slice() {
        [FieldIssue::PageOutOfRange { label, page, total }] => {
            assert_eq!((label.as_str(), *page, *total), ("sender", 3, 2));
        }
        other => panic!("unexpected issues: {other:?}"),
    }
    assert_eq!(page_ids(&Document::load(&output).unwrap()).len(), 2);
}

#[tokio::test]
async fn nothing_located_passes_every_page_through() {
    let dir = tempfile::tempdir().unwrap();
    let original = letter_pdf(2);
    let input = write_fixture(dir.path(), "invoice.pdf", &original);
    let output = dir.path().join("out.pdf");

    let mut value = reply();
    value["total"]["bounding_box"] = json!([0, 0, 0, 0]);
    value["sender"]["bounding_box"] = json!([0, 0, 0, 0]);
    let report = annotate_with_fields(&input, invoice(value), &output, &AnnotationConfig::default())
        .await
        .unwrap();
    assert_eq!(report.annotated_pages(), 0);

    let before = Document::load_mem(&original).unwrap();
    let after = Document::load(&output).unwrap();
    for (b, a) in page_ids(&before).into_iter().zip(page_ids(&after)) {
        assert_eq!(before.get_page_content(b).unwrap(), after.get_page_content(a).unwrap());
    }
}

#[tokio::test]
async fn progress_reports_every_page() {
    struct Counter {
        pages: AtomicUsize,
        marks: AtomicUsize,
        done: AtomicUsize,
    }
    impl AnnotationProgressCallback for Counter {
        fn on_page_annotated(&self, _page: u32, _total: u32, marks: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
            self.marks.fetch_add(marks, Ordering::SeqCst);
        }
        fn on_annotation_complete(&self, _total: u32, annotated: u32) {
            self.done.store(annotated as usize, Ordering::SeqCst);
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &letter_pdf(3));
    let counter = Arc::new(Counter {
        pages: AtomicUsize::new(0),
        marks: AtomicUsize::new(0),
        done: AtomicUsize::new(0),
    });
    let config = AnnotationConfig::builder()
        .progress_callback(counter.clone())
        .build()
        .unwrap();

    annotate_with_fields(&input, invoice(reply()), dir.path().join("out.pdf"), &config)
        .await
        .unwrap();

    assert_eq!(counter.pages.load(Ordering::SeqCst), 3);
    assert_eq!(counter.marks.load(Ordering::SeqCst), 2);
    assert_eq!(counter.done.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn output_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &letter_pdf(1));
    let output: PathBuf = dir.path().join("nested/deeper/out.pdf");

    annotate_with_fields(&input, invoice(reply()), &output, &AnnotationConfig::default())
        .await
        .unwrap();
    assert!(output.exists());
    assert!(!output.with_extension("pdf.tmp").exists());
}

#[tokio::test]
async fn non_pdf_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", b"PK\x03\x04 not a pdf");

    let err = annotate_with_fields(&input, invoice(reply()), dir.path().join("out.pdf"), &AnnotationConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AnnotateError::NotAPdf { .. }), "{err:?}");
}

#[tokio::test]
async fn page_without_media_box_is_fatal() {
    let bytes = pdf_without_media_box();
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &bytes);
    let output = dir.path().join("out.pdf");

    let err = annotate_with_fields(&input, invoice(reply()), &output, &AnnotationConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AnnotateError::MissingPageGeometry { page: 1, .. }), "{err:?}");
    assert!(!output.exists());
}

#[test]
fn saved_reply_loads_like_a_live_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fields.json");
    std::fs::write(&path, format!("```json\n{}\n```", reply())).unwrap();

    let invoice = load_fields_file(&path).unwrap();
    assert_eq!(invoice.total.value, Some(1190.5));
    assert_eq!(invoice.sender.name.as_deref(), Some("Widget Works"));

    let labels: Vec<String> = invoice.records().into_iter().map(|r| r.label).collect();
    assert_eq!(labels, ["total", "recipient", "tax", "sender", "account_no"]);
}

#[test]
fn saved_reply_with_schema_errors_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fields.json");
    let mut value = reply();
    value["tax"]["page"] = json!("two");
    std::fs::write(&path, value.to_string()).unwrap();

    let err = load_fields_file(&path).unwrap_err();
    assert!(matches!(err, AnnotateError::SchemaViolation { .. }), "{err:?}");
}

// ── Extraction through a backend ─────────────────────────────────────────────

#[tokio::test]
async fn live_run_sends_the_pdf_and_draws_the_reply() {
    let dir = tempfile::tempdir().unwrap();
    let original = letter_pdf(3);
    let input = write_fixture(dir.path(), "invoice.pdf", &original);
    let output = dir.path().join("out.pdf");

    let model = CannedModel::new(reply().to_string());
    let events = Arc::new(ExtractionEvents::default());
    let config = AnnotationConfig::builder()
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let report = annotate_invoice_with(&model, &input, &output, &config).await.unwrap();

    assert_eq!(model.calls(), 1);
    let request = model.last_request();
    assert_eq!(request.attachments.len(), 1);
    assert_eq!(request.attachments[0].mime_type, "application/pdf");
    assert_eq!(STANDARD.decode(&request.attachments[0].data).unwrap(), original);
    assert!(request.prompt.contains("JSON Schema of the reply"), "{}", request.prompt);
    assert!(request.prompt.contains("\"account_no\""), "{}", request.prompt);
    assert_eq!(request.temperature, 0.0);

    assert_eq!(report.fields[0].value, FieldValue::Amount(1190.5));
    assert_eq!(report.fields[1].value, FieldValue::Missing);
    assert_eq!(report.fields[3].value, FieldValue::Text("Widget Works".into()));
    assert_eq!(report.annotated_pages(), 2);

    let stats = report.extraction.as_ref().expect("extraction stats");
    assert_eq!(stats.attachments, 1);
    assert_eq!(stats.input_tokens, 1200);
    assert_eq!(stats.output_tokens, 150);

    assert_eq!(events.started_with.load(Ordering::SeqCst), 1);
    assert_eq!(events.located.load(Ordering::SeqCst), 2);

    let written = Document::load(&output).unwrap();
    assert_eq!(page_ids(&written).len(), 3);
}

#[tokio::test]
async fn fenced_reply_is_accepted() {
    let document = InputDocument::from_bytes("mem", letter_pdf(1)).unwrap();
    let model = CannedModel::new(format!("```json\n{}\n```", reply()));

    let (invoice, stats) = extract_fields_with(&model, &document, &AnnotationConfig::default())
        .await
        .unwrap();
    assert_eq!(invoice.total.value, Some(1190.5));
    assert_eq!(stats.attachments, 1);
}

#[tokio::test]
async fn prose_reply_is_malformed_and_nothing_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &letter_pdf(1));
    let output = dir.path().join("out.pdf");
    let model = CannedModel::new("Sorry, I cannot read this invoice.");

    let err = annotate_invoice_with(&model, &input, &output, &AnnotationConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AnnotateError::MalformedResponse { .. }), "{err:?}");
    assert!(!output.exists());
}

#[tokio::test]
async fn reply_breaking_the_schema_is_rejected() {
    let document = InputDocument::from_bytes("mem", letter_pdf(1)).unwrap();
    let mut value = reply();
    value["tax"]["page"] = json!("two");
    value.as_object_mut().unwrap().remove("recipient");
    let model = CannedModel::new(value.to_string());

    let err = extract_fields_with(&model, &document, &AnnotationConfig::default())
        .await
        .unwrap_err();
    match err {
        AnnotateError::SchemaViolation { violations } => assert!(violations.len() >= 2, "{violations:?}"),
        other => panic!("expected a schema violation, got {other:?}"),
    }
}

#[tokio::test]
async fn unreadable_page_tree_fails_before_the_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "invoice.pdf", &pdf_without_media_box());
    let model = CannedModel::new(reply().to_string());

    let err = annotate_invoice_with(&model, &input, dir.path().join("out.pdf"), &AnnotationConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AnnotateError::MissingPageGeometry { page: 1, .. }), "{err:?}");
    assert_eq!(model.calls(), 0);
}
