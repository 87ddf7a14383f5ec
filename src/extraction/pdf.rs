//! # PDF Page Text Source
//!
//! ## Purpose
//! Contract for the external PDF-to-text collaborator: bytes on disk in,
//! ordered sequence of page texts out. The engine consumes only this
//! interface; the shipped adapter binds pdfium.
//!
//! ## Input/Output Specification
//! - **Input**: Path to a PDF file
//! - **Output**: One text per page, in document order
//! - **Failure**: Unreadable or empty documents surface as input errors so
//!   the orchestrator can skip the case

use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

/// Contract the engine consumes: a PDF path resolves to ordered page texts.
#[async_trait]
pub trait PageTextSource: Send + Sync {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

/// Pdfium-backed extractor. Page rendering is CPU-bound and the bindings are
/// synchronous, so extraction runs on the blocking pool.
pub struct PdfiumExtractor;

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_sync(path: &Path) -> Result<Vec<String>> {
        let file = path.display().to_string();
        let bindings = Pdfium::bind_to_system_library().map_err(|e| {
            PipelineError::PdfUnreadable {
                file: file.clone(),
                details: format!("pdfium library unavailable: {e}"),
            }
        })?;
        let pdfium = Pdfium::new(bindings);

        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| PipelineError::PdfUnreadable {
                    file: file.clone(),
                    details: e.to_string(),
                })?;

        let mut pages = Vec::with_capacity(document.pages().len() as usize);
        for page in document.pages().iter() {
            let text = page
                .text()
                .map_err(|e| PipelineError::PdfUnreadable {
                    file: file.clone(),
                    details: format!("page text extraction failed: {e}"),
                })?
                .all();
            pages.push(text);
        }

        if pages.iter().all(|p| p.trim().is_empty()) {
            return Err(PipelineError::PdfUnreadable {
                file,
                details: "document produced no text".to_string(),
            });
        }

        Ok(pages)
    }
}

impl Default for PdfiumExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageTextSource for PdfiumExtractor {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_sync(&path))
            .await
            .map_err(|e| PipelineError::Internal {
                message: format!("pdf extraction task panicked: {e}"),
            })?
    }
}
