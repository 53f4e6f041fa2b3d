//! # edgequake-doc2md
//!
//! Convert a PDF document to Markdown (or JSON / HTML) by running a fixed
//! chain of document models over it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! book.pdf
//!  │
//!  ├─ 1. Input      exists, readable, starts with %PDF
//!  ├─ 2. Device     CUDA > Metal > CPU, probed once
//!  ├─ 3. Models     layout · ocr · table recognition · reading order
//!  ├─ 4. Convert    pages in batches; OCR only where there is no text layer
//!  ├─ 5. Process    page artifacts · headings · lists · paragraph merge
//!  ├─ 6. Render     markdown | json | html
//!  └─ 7. Persist    out/book.md, written atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{run, ConversionOptions, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConversionOptions::builder()
//!         .batch_multiplier(2)
//!         .languages(["en"])
//!         .build()?;
//!     let config = PipelineConfig::new("./book.pdf", "./out").with_options(options);
//!     let report = run(&config).await?;
//!     println!("{} ({} pages)", report.output_path.display(), report.pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `cuda`  | off     | Build candle with CUDA so the device selector can pick a GPU |
//! | `metal` | off     | Build candle with Metal |
//!
//! ## Models
//!
//! Every model sits behind a trait in [`models`]. The built-in set runs on
//! the CPU from the PDF text layer; scanned pages are left as page images
//! unless the vision OCR engine is enabled ([`OcrEngine::Vision`]), which
//! sends page crops to any VLM `edgequake-llm` can reach.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod device;
pub mod document;
pub mod error;
pub mod input;
pub mod models;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod postprocess;
pub mod processors;
pub mod renderer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, RetryPolicy};
pub use converter::DocumentConverter;
pub use device::{select_device, ComputeDevice};
pub use document::{Document, RenderMetadata, RenderedDocument};
pub use error::{Doc2MdError, ModelError};
pub use models::{
    BuiltinModelLoader, LoaderSettings, ModelLoader, ModelRegistry, ModelRole, OcrEngine, Placement,
};
pub use options::{ConversionOptions, Languages, OutputFormat};
pub use output::{extract, output_path, persist, ExtractedArtifact};
pub use pipeline::{run, run_blocking, run_with_loader, RunReport};
pub use processors::ProcessorId;
