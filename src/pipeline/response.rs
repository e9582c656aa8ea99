//! Reply validation: raw model text → [`Invoice`], or a typed error.
//!
//! Validation is an explicit step with three outcomes a caller can tell
//! apart: the reply is not JSON ([`AnnotateError::MalformedResponse`]), it is
//! JSON that breaks the schema ([`AnnotateError::SchemaViolation`], listing
//! every violation rather than the first), or it is a valid [`Invoice`].
//!
//! Models sometimes wrap JSON in ```` ```json ```` fences even when told not
//! to; those are stripped before parsing. Nothing else about the text is
//! changed.

use crate::error::AnnotateError;
use crate::fields::{invoice_schema, Invoice};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Characters of the reply quoted in a [`AnnotateError::MalformedResponse`].
const EXCERPT_CHARS: usize = 80;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

/// Compiled invoice schema, built once per process.
static VALIDATOR: Lazy<Result<jsonschema::Validator, String>> =
    Lazy::new(|| jsonschema::validator_for(&invoice_schema()).map_err(|e| e.to_string()));

/// Parse and validate a model reply.
pub fn parse_reply(raw: &str) -> Result<Invoice, AnnotateError> {
    let text = strip_json_fences(raw);
    let value: Value = serde_json::from_str(&text).map_err(|e| AnnotateError::MalformedResponse {
        detail: e.to_string(),
        excerpt: text.chars().take(EXCERPT_CHARS).collect(),
    })?;
    validate_value(value)
}

/// Validate an already-parsed JSON value against the invoice schema.
pub fn validate_value(value: Value) -> Result<Invoice, AnnotateError> {
    let validator = VALIDATOR
        .as_ref()
        .map_err(|e| AnnotateError::Internal(format!("invoice schema does not compile: {e}")))?;

    let violations: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();
    if !violations.is_empty() {
        return Err(AnnotateError::SchemaViolation { violations });
    }

    // The schema admits what serde accepts; this only fails on shapes the
    // schema cannot express (e.g. integers beyond i32).
    let invoice: Invoice =
        serde_json::from_value(value).map_err(|e| AnnotateError::SchemaViolation {
            violations: vec![e.to_string()],
        })?;
    debug!("Reply validated against the invoice schema");
    Ok(invoice)
}

fn strip_json_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}
