//! Prompt text for invoice field extraction.
//!
//! The instruction tells the model what to extract and how to report a
//! missing field; the JSON Schema generated from [`crate::fields::Invoice`]
//! is appended so the reply shape is spelled out in the request itself.
//! Callers can replace the instruction via
//! [`crate::config::AnnotationConfig::instruction`]; the schema is always
//! appended.

/// Default extraction instruction.
pub const DEFAULT_INSTRUCTION: &str = r#"You are reading an invoice. Extract the following fields:

- total: the total amount of the invoice (number)
- recipient: the name of the recipient
- tax: the total amount of the tax (number)
- sender: the name of the sender
- account_no: the number of the account

For every field also report where you found it:
- page: the page number, counting from 1
- bounding_box: [y_min, x_min, y_max, x_max], normalized to 0-1000 with the
  origin at the top-left corner of the page

If a field is missing, set its value to null and its bounding_box to [0,0,0,0].
Return ONLY JSON that matches the provided schema. Do not wrap it in code fences."#;

/// Extra instruction used with the rendered-pages payload.
pub const RENDERED_PAGES_NOTE: &str =
    "The invoice is attached as one image per page, in page order: the first image is page 1.";

/// Build the user-turn text: instruction, optional payload note, then schema.
pub fn build_user_prompt(
    instruction: &str,
    schema: &serde_json::Value,
    rendered_pages: bool,
) -> String {
    let schema_text =
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    let mut prompt = instruction.trim_end().to_string();
    if rendered_pages {
        prompt.push_str("\n\n");
        prompt.push_str(RENDERED_PAGES_NOTE);
    }
    prompt.push_str("\n\nJSON Schema of the reply:\n");
    prompt.push_str(&schema_text);
    prompt
}
