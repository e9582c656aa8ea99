//! The single model call: document + instruction + schema → raw reply text.
//!
//! This module only builds the request and sends it. Prompt wording lives in
//! [`crate::prompts`] and reply validation in [`super::response`]. There is
//! no retry loop and no timeout: a failed call ends the run.
//!
//! The call goes through [`ExtractionBackend`], which every
//! `Arc<dyn LLMProvider>` implements. Anything else that can answer an
//! [`ExtractionRequest`] with text (a recorded reply, a local model server)
//! can drive the same extraction path.

use crate::config::AnnotationConfig;
use crate::error::AnnotateError;
use crate::output::ExtractionStats;
use crate::prompts::{build_user_prompt, DEFAULT_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// System turn shared by both payload modes.
pub const SYSTEM_PROMPT: &str =
    "You extract structured data from business documents and answer with JSON only.";

/// Everything sent for one extraction, before it becomes provider messages.
#[derive(Clone)]
pub struct ExtractionRequest {
    /// System turn.
    pub system: String,
    /// User turn text: instruction followed by the reply schema.
    pub prompt: String,
    /// One PDF part, or one PNG per page in page order.
    pub attachments: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ExtractionRequest {
    pub fn new(
        attachments: Vec<ImageData>,
        schema: &serde_json::Value,
        config: &AnnotationConfig,
        rendered_pages: bool,
    ) -> Self {
        let instruction = config.instruction.as_deref().unwrap_or(DEFAULT_INSTRUCTION);
        Self {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_user_prompt(instruction, schema, rendered_pages),
            attachments,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build the message list for the provider.
    ///
    /// ## Message Layout
    ///
    /// 1. **System message**: JSON-only answering rule
    /// 2. **User message**: instruction + schema text, with the attachments
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(&self.system),
            ChatMessage::user_with_images(&self.prompt, self.attachments.clone()),
        ]
    }

    /// Build `CompletionOptions` from the request.
    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Reply text plus token usage, as returned by a backend.
#[derive(Debug, Clone, Default)]
pub struct BackendReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Something that answers an extraction request with reply text.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn complete(&self, request: &ExtractionRequest) -> Result<BackendReply, AnnotateError>;
}

#[async_trait]
impl ExtractionBackend for Arc<dyn LLMProvider> {
    async fn complete(&self, request: &ExtractionRequest) -> Result<BackendReply, AnnotateError> {
        let messages = request.to_messages();
        let options = request.options();
        let response = self
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| AnnotateError::LlmApiError {
                message: e.to_string(),
            })?;

        Ok(BackendReply {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Raw reply text plus call statistics.
#[derive(Debug, Clone)]
pub struct RawExtraction {
    pub text: String,
    pub stats: ExtractionStats,
}

/// Send the request and wait for the reply.
pub async fn request_fields(
    backend: &dyn ExtractionBackend,
    request: &ExtractionRequest,
    config: &AnnotationConfig,
) -> Result<RawExtraction, AnnotateError> {
    let start = Instant::now();
    let attachments = request.attachments.len();
    info!(
        "Requesting invoice fields ({} attachment(s), model {})",
        attachments,
        config.model.as_deref().unwrap_or("<provider default>")
    );

    let reply = backend.complete(request).await?;

    let duration = start.elapsed();
    debug!(
        "Extraction: {} input tokens, {} output tokens, {:?}",
        reply.input_tokens, reply.output_tokens, duration
    );

    Ok(RawExtraction {
        text: reply.text,
        stats: ExtractionStats {
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            duration_ms: duration.as_millis() as u64,
            attachments,
        },
    })
}
