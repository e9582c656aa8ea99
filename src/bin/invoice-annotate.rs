//! CLI binary for invoice-annotate.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnnotationConfig`, prints the extracted fields and reports where the
//! annotated PDF went.

use anyhow::{Context, Result};
use clap::Parser;
use invoice_annotate::pipeline::input::resolve_input;
use invoice_annotate::{
    annotate_document, check_document, default_output_path, extract_fields, load_fields_file,
    AnnotationConfig, AnnotationProgressCallback, BoxPolicy, DocumentPayload, FieldIssue, FieldRecord,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr while the model call is in flight, then one line per
/// annotated page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// The model is not called when fields come from a saved reply.
    fn loading_fields(&self, path: &Path) {
        self.bar.set_prefix("Loading");
        self.bar.set_message(format!("fields from {}", path.display()));
    }

    fn fields_loaded(&self) {
        self.bar.set_prefix("Annotating");
        self.bar.set_message("");
    }
}

impl AnnotationProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, attachments: usize) {
        self.bar.set_prefix("Extracting");
        self.bar
            .set_message(format!("waiting for the model ({attachments} attachment(s))…"));
    }

    fn on_extraction_complete(&self, located: usize) {
        self.bar
            .println(format!("  {} {} fields located", green("✓"), bold(&located.to_string())));
        self.bar.set_prefix("Annotating");
        self.bar.set_message("");
    }

    fn on_page_annotated(&self, page_num: u32, total_pages: u32, marks: usize) {
        self.bar.set_message(format!("page {page_num}/{total_pages}"));
        if marks > 0 {
            self.bar.println(format!(
                "  {} Page {:>3}/{:<3}  {}",
                green("✓"),
                page_num,
                total_pages,
                dim(&format!("{marks} mark(s)"))
            ));
        }
    }

    fn on_annotation_complete(&self, _total_pages: u32, _annotated_pages: u32) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract fields and write invoice_annotated.pdf next to the input
  invoice-annotate invoice.pdf

  # Choose the output path
  invoice-annotate invoice.pdf -o marked.pdf

  # Save the validated reply, then re-annotate later without a model call
  invoice-annotate invoice.pdf --fields-out fields.json
  invoice-annotate invoice.pdf --fields fields.json -o marked.pdf

  # Only print the fields
  invoice-annotate --extract-only invoice.pdf

  # Vision providers without PDF input: send page images instead
  invoice-annotate --provider openai --model gpt-4.1 --payload rendered-pages invoice.pdf

  # Draw out-of-range boxes clamped to the page instead of skipping them
  invoice-annotate --box-policy clamp invoice.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (only needed for --payload rendered-pages)

  Variables may also be placed in a .env file in the working directory.
"#;

/// Extract invoice fields with a multimodal model and outline them in the PDF.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-annotate",
    version,
    about = "Extract invoice fields with a multimodal LLM and outline them in the PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Annotated PDF path. Default: <input-stem>_annotated.pdf.
    #[arg(short, long, env = "INVOICE_ANNOTATE_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID. Default: gemini-2.5-flash.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// How the document is sent to the model.
    #[arg(long, env = "INVOICE_ANNOTATE_PAYLOAD", value_enum, default_value = "native-pdf")]
    payload: PayloadArg,

    /// What to do with inverted or out-of-range boxes.
    #[arg(long, env = "INVOICE_ANNOTATE_BOX_POLICY", value_enum, default_value = "skip")]
    box_policy: BoxPolicyArg,

    /// Rendering DPI for --payload rendered-pages (72–400).
    #[arg(long, env = "INVOICE_ANNOTATE_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Annotate from a saved reply instead of calling the model.
    #[arg(long, env = "INVOICE_ANNOTATE_FIELDS", conflicts_with = "fields_out")]
    fields: Option<PathBuf>,

    /// Save the validated model reply as JSON.
    #[arg(long, env = "INVOICE_ANNOTATE_FIELDS_OUT")]
    fields_out: Option<PathBuf>,

    /// Print the fields and stop; no PDF is written.
    #[arg(long)]
    extract_only: bool,

    /// Path to a text file replacing the default extraction instruction.
    #[arg(long, env = "INVOICE_ANNOTATE_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// PDF user password for encrypted documents (rendered-pages payload).
    #[arg(long, env = "INVOICE_ANNOTATE_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens.
    #[arg(long, env = "INVOICE_ANNOTATE_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE_ANNOTATE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Print the run report as JSON instead of the key-value dump.
    #[arg(long, env = "INVOICE_ANNOTATE_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "INVOICE_ANNOTATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_ANNOTATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_ANNOTATE_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "INVOICE_ANNOTATE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PayloadArg {
    NativePdf,
    RenderedPages,
}

impl From<PayloadArg> for DocumentPayload {
    fn from(v: PayloadArg) -> Self {
        match v {
            PayloadArg::NativePdf => DocumentPayload::NativePdf,
            PayloadArg::RenderedPages => DocumentPayload::RenderedPages,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BoxPolicyArg {
    Skip,
    Clamp,
}

impl From<BoxPolicyArg> for BoxPolicy {
    fn from(v: BoxPolicyArg) -> Self {
        match v {
            BoxPolicyArg::Skip => BoxPolicy::Skip,
            BoxPolicyArg::Clamp => BoxPolicy::Clamp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal; anything set in the real environment wins.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb = spinner
        .clone()
        .map(|cb| cb as Arc<dyn AnnotationProgressCallback>);
    let config = build_config(&cli, progress_cb).await?;

    // ── Stage 1: fields ──────────────────────────────────────────────────
    let document = resolve_input(&cli.input, config.download_timeout_secs)
        .await
        .with_context(|| format!("Failed to open '{}'", cli.input))?;

    // An unreadable page tree fails here, before the model is paid for.
    if !cli.extract_only {
        check_document(&document)
            .await
            .with_context(|| format!("Cannot annotate '{}'", cli.input))?;
    }

    let (invoice, stats) = match cli.fields {
        Some(ref path) => {
            if let Some(ref cb) = spinner {
                cb.loading_fields(path);
            }
            let invoice = load_fields_file(path).context("Invalid fields file")?;
            if let Some(ref cb) = spinner {
                cb.fields_loaded();
            }
            (invoice, None)
        }
        None => {
            let (invoice, stats) = extract_fields(&document, &config)
                .await
                .context("Field extraction failed")?;
            (invoice, Some(stats))
        }
    };

    if let Some(ref path) = cli.fields_out {
        let json = serde_json::to_string_pretty(&invoice).context("Failed to serialise fields")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write fields to {}", path.display()))?;
    }

    // Printed before annotation; the values must survive a failed write.
    if !cli.json {
        if let Some(ref cb) = spinner {
            cb.bar.suspend(|| print_fields(&invoice.records()));
        } else {
            print_fields(&invoice.records());
        }
    }

    if cli.extract_only {
        if let Some(ref cb) = config.progress_callback {
            cb.on_annotation_complete(0, 0);
        }
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&invoice).context("Failed to serialise fields")?
            );
        }
        return Ok(());
    }

    // ── Stage 2: annotate ────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    let report = annotate_document(&document, invoice, stats, &output_path, &config)
        .await
        .context("Annotation failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }

    if !cli.quiet {
        for issue in &report.issues {
            print_issue(issue);
        }
        if let Some(ref s) = report.extraction {
            eprintln!(
                "   {} tokens in  /  {} tokens out  ({}ms)",
                dim(&s.input_tokens.to_string()),
                dim(&s.output_tokens.to_string()),
                s.duration_ms,
            );
        }
    }
    println!("Annotated PDF written to {}", report.output_path.display());

    Ok(())
}

/// The plain key-value dump of the extracted fields.
fn print_fields(fields: &[FieldRecord]) {
    for field in fields {
        println!("{field}");
    }
}

fn print_issue(issue: &FieldIssue) {
    eprintln!("{}", issue_line(issue));
}

fn issue_line(issue: &FieldIssue) -> String {
    let tag = if issue.is_skipped() {
        yellow("⚠ not drawn:")
    } else {
        dim("~ adjusted:")
    };
    format!("  {tag} {issue}")
}

/// Map CLI args to `AnnotationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnnotationConfig> {
    let mut builder = AnnotationConfig::builder()
        .payload(cli.payload.into())
        .box_policy(cli.box_policy.into())
        .dpi(cli.dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
