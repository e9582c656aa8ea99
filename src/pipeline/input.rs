//! Input resolution: load a user-supplied path or URL into memory.
//!
//! Both stages need the whole document: the extractor attaches the bytes to
//! the model request and the assembler parses them with lopdf. Invoices are
//! small, so the document is read once into an [`InputDocument`] and shared
//! by reference. The `%PDF` magic is checked up front so callers get a
//! meaningful error instead of a parser failure deep in the run.

use crate::error::AnnotateError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// A PDF held in memory, with a printable description of where it came from.
#[derive(Debug, Clone)]
pub struct InputDocument {
    /// The path or URL the bytes were read from.
    pub origin: String,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    /// Wrap bytes that are already in memory, checking the PDF magic.
    pub fn from_bytes(origin: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AnnotateError> {
        let origin = origin.into();
        check_magic(&origin, &bytes)?;
        Ok(Self { origin, bytes })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputDocument, AnnotateError> {
    if input.trim().is_empty() {
        return Err(AnnotateError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<InputDocument, AnnotateError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => AnnotateError::PermissionDenied { path: path.clone() },
        _ => AnnotateError::FileNotFound { path: path.clone() },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    InputDocument::from_bytes(path.display().to_string(), bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, AnnotateError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| AnnotateError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());

    InputDocument::from_bytes(url, bytes.to_vec())
}

fn check_magic(origin: &str, bytes: &[u8]) -> Result<(), AnnotateError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(AnnotateError::NotAPdf {
            origin: origin.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}
