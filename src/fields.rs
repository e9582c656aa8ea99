//! Invoice field model: the JSON shape the model answers with.
//!
//! Each invoice entry pairs a payload (amount, name or account number) with
//! the place it was found: a 1-based page number and a bounding box in the
//! model's normalized `[y_min, x_min, y_max, x_max]` space (0–1000, origin
//! top-left). A field the model could not locate carries a null payload and
//! the sentinel box `[0, 0, 0, 0]`.
//!
//! The JSON Schema embedded in the prompt is generated from these types, so
//! the schema and the parser cannot drift apart.

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of the normalized coordinate space.
pub const NORMALIZED_MAX: i32 = 1000;

/// A bounding box in normalized `[y_min, x_min, y_max, x_max]` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub y_min: i32,
    pub x_min: i32,
    pub y_max: i32,
    pub x_max: i32,
}

impl BoundingBox {
    /// The "not found" box.
    pub const SENTINEL: BoundingBox = BoundingBox {
        y_min: 0,
        x_min: 0,
        y_max: 0,
        x_max: 0,
    };

    pub const fn new(y_min: i32, x_min: i32, y_max: i32, x_max: i32) -> Self {
        Self {
            y_min,
            x_min,
            y_max,
            x_max,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    /// Ordered (`min ≤ max`) and inside `[0, 1000]` on both axes.
    pub fn is_well_formed(&self) -> bool {
        let in_range = |v: i32| (0..=NORMALIZED_MAX).contains(&v);
        self.y_min <= self.y_max
            && self.x_min <= self.x_max
            && [self.y_min, self.x_min, self.y_max, self.x_max]
                .into_iter()
                .all(in_range)
    }

    pub fn to_array(self) -> [i32; 4] {
        self.into()
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([y_min, x_min, y_max, x_max]: [i32; 4]) -> Self {
        Self::new(y_min, x_min, y_max, x_max)
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.y_min, b.x_min, b.y_max, b.x_max]
    }
}

impl JsonSchema for BoundingBox {
    fn schema_name() -> String {
        "BoundingBox".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = <[i32; 4]>::json_schema(gen).into_object();
        schema.metadata().description = Some(
            "The bounding box where the information was found [y_min, x_min, y_max, x_max], \
             normalized to 0-1000."
                .to_string(),
        );
        schema.into()
    }
}

/// A monetary amount and where it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AmountField {
    /// The amount, or null when it is not on the invoice.
    pub value: Option<f64>,
    pub bounding_box: BoundingBox,
    /// Page number where the information was found. Start counting with 1.
    pub page: u32,
}

/// A party name and where it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NameField {
    /// The name, or null when it is not on the invoice.
    pub name: Option<String>,
    pub bounding_box: BoundingBox,
    /// Page number where the information was found. Start counting with 1.
    pub page: u32,
}

/// An account number and where it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccountField {
    /// The number of the account, or null when it is not on the invoice.
    pub account_no: Option<String>,
    pub bounding_box: BoundingBox,
    /// Page number where the information was found. Start counting with 1.
    pub page: u32,
}

/// Everything the model is asked to extract from one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Invoice {
    /// The total amount of the invoice.
    pub total: AmountField,
    /// The name of the recipient.
    pub recipient: NameField,
    /// The total amount of the tax.
    pub tax: AmountField,
    /// The name of the sender.
    pub sender: NameField,
    /// The number of the account.
    pub account_no: AccountField,
}

impl Invoice {
    /// Flatten into field records, in a fixed label order.
    pub fn records(&self) -> Vec<FieldRecord> {
        let amount = |label: &str, f: &AmountField| {
            FieldRecord::new(label, FieldValue::amount(f.value), f.page, f.bounding_box)
        };
        let name = |label: &str, f: &NameField| {
            FieldRecord::new(label, FieldValue::text(&f.name), f.page, f.bounding_box)
        };

        vec![
            amount("total", &self.total),
            name("recipient", &self.recipient),
            amount("tax", &self.tax),
            name("sender", &self.sender),
            FieldRecord::new(
                "account_no",
                FieldValue::text(&self.account_no.account_no),
                self.account_no.page,
                self.account_no.bounding_box,
            ),
        ]
    }
}

/// Field-specific payload, flattened for drawing and printing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Amount(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    fn amount(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Missing, FieldValue::Amount)
    }

    fn text(v: &Option<String>) -> Self {
        v.clone().map_or(FieldValue::Missing, FieldValue::Text)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Amount(v) => write!(f, "{v}"),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Missing => write!(f, "None"),
        }
    }
}

/// One extracted datum: label, payload and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub label: String,
    pub value: FieldValue,
    /// 1-based page number.
    pub page: u32,
    pub bounding_box: BoundingBox,
}

impl FieldRecord {
    pub fn new(label: &str, value: FieldValue, page: u32, bounding_box: BoundingBox) -> Self {
        Self {
            label: label.to_string(),
            value,
            page,
            bounding_box,
        }
    }
}

impl fmt::Display for FieldRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (page {}, bounding_box {:?})",
            self.label,
            self.value,
            self.page,
            self.bounding_box.to_array()
        )
    }
}

/// JSON Schema for [`Invoice`], with every sub-schema inlined.
///
/// Inlining keeps the schema readable in the prompt (no `$ref` chasing) and
/// is accepted by the validator unchanged.
pub fn invoice_schema() -> serde_json::Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
    });
    let root = settings.into_generator().into_root_schema_for::<Invoice>();
    serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}
