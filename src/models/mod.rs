//! Model registry: the named set of sub-models the converter runs.
//!
//! The pipeline needs one model per [`ModelRole`]:
//!
//! ```text
//! PageContent ──▶ layout ──▶ ocr ──▶ table_recognition ──▶ reading_order ──▶ processors
//! ```
//!
//! Each role is a trait so that the heavy models stay an external
//! capability: the crate ships CPU implementations ([`layout`], [`ocr`],
//! [`table`], [`order`]) and a pdfium-backed [`DocumentSource`]
//! ([`source`]), and callers may plug in their own.
//!
//! A [`ModelRegistry`] can only be created complete. Every role is placed on
//! the device chosen by [`crate::device::select_device`] when the model
//! supports it and on the CPU otherwise; the resulting [`Placement`] is
//! recorded and a fallback is logged, so heterogeneous execution is visible
//! instead of implicit.

pub mod layout;
pub mod loader;
pub mod ocr;
pub mod order;
pub mod source;
pub mod table;

use crate::device::ComputeDevice;
use crate::document::{BBox, DocumentMetadata, Page, PageContent, TextLine};
use crate::error::{Doc2MdError, ModelError};
use crate::options::Languages;
use crate::processors::ProcessorId;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

pub use loader::{BuiltinModelLoader, LoaderSettings, OcrEngine};

// ── Roles & placement ────────────────────────────────────────────────────

/// Identifier of a model slot in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Layout,
    Ocr,
    TableRecognition,
    ReadingOrder,
}

impl ModelRole {
    /// Every role, in pipeline order.
    pub const ALL: [ModelRole; 4] = [
        ModelRole::Layout,
        ModelRole::Ocr,
        ModelRole::TableRecognition,
        ModelRole::ReadingOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Layout => "layout",
            ModelRole::Ocr => "ocr",
            ModelRole::TableRecognition => "table_recognition",
            ModelRole::ReadingOrder => "reading_order",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a model actually runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub role: ModelRole,
    pub model: String,
    /// Device the selector asked for.
    pub requested: ComputeDevice,
    /// Device the model runs on.
    pub device: ComputeDevice,
    /// True when `device != requested`.
    pub fallback: bool,
}

impl Placement {
    /// Place a model on `requested` if it supports it, else on the CPU.
    pub fn resolve(
        role: ModelRole,
        model: &str,
        requested: ComputeDevice,
        supports: impl Fn(ComputeDevice) -> bool,
    ) -> Placement {
        let device = if supports(requested) {
            requested
        } else {
            ComputeDevice::Cpu
        };
        let fallback = device != requested;
        if fallback {
            warn!(
                "{} model '{}' does not support {}; running on {}",
                role, model, requested, device
            );
        }
        Placement {
            role,
            model: model.to_string(),
            requested,
            device,
            fallback,
        }
    }
}

// ── Model traits ─────────────────────────────────────────────────────────

/// Reads pages of a document: geometry, text layer, rasters, metadata.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn name(&self) -> &str;

    /// Document-level metadata including the page count.
    async fn metadata(&self, path: &Path) -> Result<DocumentMetadata, ModelError>;

    /// Text layer and geometry of the given 0-based pages, in request order.
    async fn load_pages(
        &self,
        path: &Path,
        indices: &[usize],
    ) -> Result<Vec<PageContent>, ModelError>;

    /// Rasterise one page.
    async fn render_page(&self, path: &Path, index: usize) -> Result<DynamicImage, ModelError>;
}

/// Segments a page into labelled blocks.
pub trait LayoutModel: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, device: ComputeDevice) -> bool {
        !device.is_accelerator()
    }

    fn detect(&self, page: &PageContent) -> Result<Page, ModelError>;
}

/// Input of one OCR call.
pub struct OcrRequest<'a> {
    /// 0-based page index.
    pub page_index: usize,
    /// Page size in points.
    pub page_width: f32,
    pub page_height: f32,
    /// Region to read, in page coordinates.
    pub region: BBox,
    /// Page raster, present when [`TextRecognizer::needs_page_image`] is true.
    pub image: Option<&'a DynamicImage>,
    pub languages: &'a Languages,
}

/// Recognises text in regions that have no text layer.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, device: ComputeDevice) -> bool {
        !device.is_accelerator()
    }

    /// Whether the converter must rasterise the page before calling
    /// [`Self::recognize`].
    fn needs_page_image(&self) -> bool {
        false
    }

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<Vec<TextLine>, ModelError>;
}

/// Finds tables among a page's text blocks and replaces them with table blocks.
pub trait TableRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, device: ComputeDevice) -> bool {
        !device.is_accelerator()
    }

    /// Returns the number of tables found.
    fn recognize(&self, page: &mut Page) -> Result<usize, ModelError>;
}

/// Decides the reading order of a page's blocks.
pub trait ReadingOrderModel: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, device: ComputeDevice) -> bool {
        !device.is_accelerator()
    }

    /// A permutation of `0..page.blocks.len()`.
    fn order(&self, page: &Page) -> Result<Vec<usize>, ModelError>;
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Acquires every model the pipeline needs.
///
/// Loading is blocking and happens once per process; failures are fatal.
pub trait ModelLoader: Send + Sync {
    fn load(&self, device: ComputeDevice) -> Result<ModelRegistry, Doc2MdError>;
}

/// Complete, immutable set of loaded models plus the processor order.
pub struct ModelRegistry {
    device: ComputeDevice,
    source: Box<dyn DocumentSource>,
    layout: Box<dyn LayoutModel>,
    ocr: Box<dyn TextRecognizer>,
    table: Box<dyn TableRecognizer>,
    order: Box<dyn ReadingOrderModel>,
    placements: BTreeMap<ModelRole, Placement>,
    processors: Vec<ProcessorId>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("device", &self.device)
            .field("source", &self.source.name())
            .field("placements", &self.placements)
            .field("processors", &self.processors)
            .finish()
    }
}

impl ModelRegistry {
    pub fn builder(device: ComputeDevice) -> ModelRegistryBuilder {
        ModelRegistryBuilder {
            device,
            source: None,
            layout: None,
            ocr: None,
            table: None,
            order: None,
            processors: ProcessorId::default_order().to_vec(),
        }
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn source(&self) -> &dyn DocumentSource {
        self.source.as_ref()
    }

    pub fn layout(&self) -> &dyn LayoutModel {
        self.layout.as_ref()
    }

    pub fn ocr(&self) -> &dyn TextRecognizer {
        self.ocr.as_ref()
    }

    pub fn table(&self) -> &dyn TableRecognizer {
        self.table.as_ref()
    }

    pub fn order(&self) -> &dyn ReadingOrderModel {
        self.order.as_ref()
    }

    pub fn placement(&self, role: ModelRole) -> &Placement {
        // Every role is inserted by `ModelRegistryBuilder::build`.
        &self.placements[&role]
    }

    /// Role → placement, in pipeline order.
    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.placements.values()
    }

    pub fn processors(&self) -> &[ProcessorId] {
        &self.processors
    }
}

/// Builder that refuses to produce an incomplete registry.
pub struct ModelRegistryBuilder {
    device: ComputeDevice,
    source: Option<Box<dyn DocumentSource>>,
    layout: Option<Box<dyn LayoutModel>>,
    ocr: Option<Box<dyn TextRecognizer>>,
    table: Option<Box<dyn TableRecognizer>>,
    order: Option<Box<dyn ReadingOrderModel>>,
    processors: Vec<ProcessorId>,
}

impl ModelRegistryBuilder {
    pub fn source(mut self, source: impl DocumentSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn layout(mut self, model: impl LayoutModel + 'static) -> Self {
        self.layout = Some(Box::new(model));
        self
    }

    pub fn ocr(mut self, model: impl TextRecognizer + 'static) -> Self {
        self.ocr = Some(Box::new(model));
        self
    }

    pub fn table(mut self, model: impl TableRecognizer + 'static) -> Self {
        self.table = Some(Box::new(model));
        self
    }

    pub fn order(mut self, model: impl ReadingOrderModel + 'static) -> Self {
        self.order = Some(Box::new(model));
        self
    }

    pub fn processors(mut self, processors: Vec<ProcessorId>) -> Self {
        self.processors = processors;
        self
    }

    pub fn build(self) -> Result<ModelRegistry, Doc2MdError> {
        let missing = |role: ModelRole| Doc2MdError::ModelLoadFailure {
            role,
            reason: "no model provided".into(),
        };
        let source = self.source.ok_or_else(|| Doc2MdError::ModelLoadFailure {
            role: ModelRole::Layout,
            reason: "no document source provided".into(),
        })?;
        let layout = self.layout.ok_or_else(|| missing(ModelRole::Layout))?;
        let ocr = self.ocr.ok_or_else(|| missing(ModelRole::Ocr))?;
        let table = self
            .table
            .ok_or_else(|| missing(ModelRole::TableRecognition))?;
        let order = self.order.ok_or_else(|| missing(ModelRole::ReadingOrder))?;

        let device = self.device;
        let placements: BTreeMap<ModelRole, Placement> = [
            Placement::resolve(ModelRole::Layout, layout.name(), device, |d| {
                layout.supports(d)
            }),
            Placement::resolve(ModelRole::Ocr, ocr.name(), device, |d| ocr.supports(d)),
            Placement::resolve(ModelRole::TableRecognition, table.name(), device, |d| {
                table.supports(d)
            }),
            Placement::resolve(ModelRole::ReadingOrder, order.name(), device, |d| {
                order.supports(d)
            }),
        ]
        .into_iter()
        .map(|p| (p.role, p))
        .collect();

        for p in placements.values() {
            info!("Loaded {} model '{}' on {}", p.role, p.model, p.device);
        }

        Ok(ModelRegistry {
            device,
            source,
            layout,
            ocr,
            table,
            order,
            placements,
            processors: self.processors,
        })
    }
}
