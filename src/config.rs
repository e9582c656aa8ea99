//! Configuration types for invoice extraction and annotation.
//!
//! Every knob for a run lives in [`AnnotationConfig`], built via its
//! [`AnnotationConfigBuilder`]. The extractor never reads ambient state
//! other than the provider's API key: tests hand in a pre-built provider or
//! skip extraction entirely and annotate from fixture fields.

use crate::error::AnnotateError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Provider used when neither the config nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used with [`DEFAULT_PROVIDER`] when no model is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for one extract-and-annotate run.
///
/// # Example
/// ```rust
/// use invoice_annotate::{AnnotationConfig, BoxPolicy, DocumentPayload};
///
/// let config = AnnotationConfig::builder()
///     .model("gemini-2.5-flash")
///     .payload(DocumentPayload::NativePdf)
///     .box_policy(BoxPolicy::Clamp)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnnotationConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] for the default
    /// provider and the provider's own default otherwise.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, the environment decides.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate for the JSON reply. Default: 2048.
    pub max_tokens: usize,

    /// Custom extraction instruction. If None, uses the built-in default.
    pub instruction: Option<String>,

    /// How the document is handed to the model. Default: native PDF.
    pub payload: DocumentPayload,

    /// Rendering DPI for [`DocumentPayload::RenderedPages`]. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest rendered edge in pixels for [`DocumentPayload::RenderedPages`]. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password, used only when rasterising.
    pub password: Option<String>,

    /// What to do with boxes that are inverted or out of range. Default: skip.
    pub box_policy: BoxPolicy,

    /// Appearance of the drawn marks.
    pub style: OverlayStyle,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional stage callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            instruction: None,
            payload: DocumentPayload::default(),
            dpi: 150,
            max_rendered_pixels: 2000,
            password: None,
            box_policy: BoxPolicy::default(),
            style: OverlayStyle::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnnotationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("payload", &self.payload)
            .field("dpi", &self.dpi)
            .field("box_policy", &self.box_policy)
            .field("style", &self.style)
            .finish()
    }
}

impl AnnotationConfig {
    /// Create a new builder for `AnnotationConfig`.
    pub fn builder() -> AnnotationConfigBuilder {
        AnnotationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnnotationConfig`].
pub struct AnnotationConfigBuilder {
    config: AnnotationConfig,
}

impl AnnotationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn payload(mut self, payload: DocumentPayload) -> Self {
        self.config.payload = payload;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn box_policy(mut self, policy: BoxPolicy) -> Self {
        self.config.box_policy = policy;
        self
    }

    pub fn style(mut self, style: OverlayStyle) -> Self {
        self.config.style = style;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnnotationConfig, AnnotateError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(AnnotateError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(AnnotateError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if !(c.style.line_width > 0.0) || !(c.style.font_size > 0.0) {
            return Err(AnnotateError::InvalidConfig(format!(
                "line width and font size must be positive, got {} / {}",
                c.style.line_width, c.style.font_size
            )));
        }
        if c.style.stroke.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(AnnotateError::InvalidConfig(format!(
                "stroke colour components must be 0.0–1.0, got {:?}",
                c.style.stroke
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the invoice is handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPayload {
    /// Attach the original PDF bytes (`application/pdf`). (default)
    #[default]
    NativePdf,
    /// Rasterise every page with pdfium and attach PNGs in page order,
    /// for vision providers that only accept images.
    RenderedPages,
}

/// Handling of boxes that are inverted (`min > max`) or outside 0–1000.
///
/// The sentinel `[0, 0, 0, 0]` is never drawn, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxPolicy {
    /// Leave the field off the page and report it. (default)
    #[default]
    Skip,
    /// Clamp into 0–1000, order each min/max pair, draw, and report it.
    Clamp,
}

/// Appearance of the overlay marks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// Stroke colour as RGB components in 0.0–1.0. Default: red.
    pub stroke: [f32; 3],
    /// Rectangle line width in points. Default: 1.5.
    pub line_width: f32,
    /// Label font size in points. Default: 8.
    pub font_size: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke: [1.0, 0.0, 0.0],
            line_width: 1.5,
            font_size: 8.0,
        }
    }
}
