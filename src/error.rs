//! Error types for the edgequake-doc2md library.
//!
//! Two error types mirror the two layers of the pipeline:
//!
//! * [`Doc2MdError`]: **fatal**, the run cannot produce an output file
//!   (missing input, invalid options, a model that failed to load, a failed
//!   conversion stage, an unwritable destination). Returned from every public
//!   entry point.
//!
//! * [`ModelError`]: raised by a single model implementation. The converter
//!   wraps it into [`Doc2MdError::ConversionFailure`] together with the stage
//!   and page it happened on, so model authors never have to know about
//!   pipeline bookkeeping.
//!
//! There is no partial-success state: a conversion either yields a complete
//! [`crate::document::RenderedDocument`] or one of the variants below.

use crate::models::ModelRole;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doc2md library.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input document not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// The file exists but could not be opened or read.
    #[error("Cannot read input document '{path}': {reason}")]
    InputUnreadable { path: PathBuf, reason: String },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Conversion options failed validation (unknown key, bad value).
    #[error("Invalid conversion options: {0}")]
    InvalidOptions(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// A model required by the pipeline could not be loaded.
    #[error("Failed to load the {role} model: {reason}")]
    ModelLoadFailure { role: ModelRole, reason: String },

    /// A pipeline stage failed while processing the document.
    #[error("Conversion failed during {stage}{}: {detail}", page_suffix(.page))]
    ConversionFailure {
        stage: String,
        page: Option<usize>,
        detail: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn page_suffix(page: &Option<usize>) -> String {
    page.map(|p| format!(" (page {p})")).unwrap_or_default()
}

impl Doc2MdError {
    /// Process exit code for this failure.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 2 | input missing, unreadable or not a PDF |
    /// | 3 | invalid conversion options |
    /// | 4 | model load failure |
    /// | 5 | conversion failure |
    /// | 6 | output write failure |
    /// | 1 | internal error |
    pub fn exit_code(&self) -> i32 {
        match self {
            Doc2MdError::InputNotFound { .. }
            | Doc2MdError::InputUnreadable { .. }
            | Doc2MdError::NotAPdf { .. } => 2,
            Doc2MdError::InvalidOptions(_) => 3,
            Doc2MdError::ModelLoadFailure { .. } => 4,
            Doc2MdError::ConversionFailure { .. } => 5,
            Doc2MdError::OutputWriteFailed { .. } => 6,
            Doc2MdError::Internal(_) => 1,
        }
    }

    /// True for failures of the cheap input precondition.
    pub fn is_input_error(&self) -> bool {
        self.exit_code() == 2
    }
}

/// An error raised by a model or the document source while working on a page.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The PDF backend could not open or read the document.
    #[error("document source: {0}")]
    Source(String),

    /// Inference itself failed.
    #[error("{model}: {detail}")]
    Inference { model: String, detail: String },

    /// The model produced output that violates its contract.
    #[error("{model} returned invalid output: {detail}")]
    InvalidOutput { model: String, detail: String },
}

impl ModelError {
    pub fn inference(model: impl Into<String>, detail: impl Into<String>) -> Self {
        ModelError::Inference {
            model: model.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failure_display_with_page() {
        let e = Doc2MdError::ConversionFailure {
            stage: "layout".into(),
            page: Some(3),
            detail: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("layout (page 3)"), "got: {msg}");
        assert!(msg.contains("boom"));
    }

    #[test]
    fn conversion_failure_display_without_page() {
        let e = Doc2MdError::ConversionFailure {
            stage: "metadata".into(),
            page: None,
            detail: "corrupt xref".into(),
        };
        assert_eq!(
            e.to_string(),
            "Conversion failed during metadata: corrupt xref"
        );
    }

    #[test]
    fn model_load_failure_names_role() {
        let e = Doc2MdError::ModelLoadFailure {
            role: ModelRole::Ocr,
            reason: "no provider".into(),
        };
        assert!(e.to_string().contains("ocr model"));
    }

    #[test]
    fn exit_codes_are_distinct_per_category() {
        let not_found = Doc2MdError::InputNotFound {
            path: "x.pdf".into(),
        };
        let options = Doc2MdError::InvalidOptions("bad".into());
        let write = Doc2MdError::OutputWriteFailed {
            path: "out/x.md".into(),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(not_found.exit_code(), 2);
        assert!(not_found.is_input_error());
        assert_eq!(options.exit_code(), 3);
        assert_eq!(write.exit_code(), 6);
        assert_ne!(Doc2MdError::Internal("x".into()).exit_code(), 0);
    }
}
