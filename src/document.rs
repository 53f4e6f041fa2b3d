//! Document tree shared by every pipeline stage.
//!
//! ```text
//! PageContent (source) ──layout──▶ Page { blocks } ──ocr/table/order──▶ Document
//!                                                                        │
//!                                               RenderedDocument ◀───────┘
//! ```
//!
//! Coordinates are PDF points with a **top-left** origin (y grows downwards),
//! converted once by the document source so that models never deal with the
//! PDF bottom-left convention.

use crate::device::ComputeDevice;
use crate::models::Placement;
use crate::options::OutputFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis-aligned box in top-left-origin points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Length of the vertical overlap with `other` (0 when disjoint).
    pub fn vertical_overlap(&self, other: &BBox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    /// Union of an iterator of boxes, `None` when empty.
    pub fn enclosing<'a>(boxes: impl IntoIterator<Item = &'a BBox>) -> Option<BBox> {
        boxes.into_iter().copied().reduce(|a, b| a.union(&b))
    }
}

/// A run of text as the PDF text layer reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub bbox: BBox,
}

/// Raw content of one page, as read by the [`crate::models::DocumentSource`].
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// 0-based page index.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub spans: Vec<TextSpan>,
}

impl PageContent {
    /// A page without any text layer needs OCR to yield content.
    pub fn has_text_layer(&self) -> bool {
        self.spans.iter().any(|s| !s.text.trim().is_empty())
    }
}

/// One recognised line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub bbox: BBox,
}

impl TextLine {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }

    /// Line height, used as a font-size proxy.
    pub fn size(&self) -> f32 {
        self.bbox.height()
    }
}

/// Semantic label of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BlockKind {
    Text,
    SectionHeader { level: u8 },
    ListItem { ordered: bool },
    Table,
    Picture,
    PageHeader,
    PageFooter,
}

/// Table cells, row-major; the first row is the header row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn num_cols(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Render as a GFM pipe table.
    pub fn to_markdown(&self) -> String {
        let cols = self.num_cols();
        if self.rows.is_empty() || cols == 0 {
            return String::new();
        }
        let mut md = String::new();
        for (i, row) in self.rows.iter().enumerate() {
            md.push('|');
            for c in 0..cols {
                let cell = row.get(c).map(String::as_str).unwrap_or("");
                md.push(' ');
                md.push_str(&cell.replace('|', "\\|"));
                md.push_str(" |");
            }
            md.push('\n');
            if i == 0 {
                md.push('|');
                for _ in 0..cols {
                    md.push_str(" --- |");
                }
                md.push('\n');
            }
        }
        md
    }
}

/// A labelled region of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub bbox: BBox,
    pub lines: Vec<TextLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    /// Key into [`Document::images`] for picture blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Set by layout when the region has no text layer; cleared by OCR.
    #[serde(skip)]
    pub needs_ocr: bool,
}

impl Block {
    pub fn text(bbox: BBox, lines: Vec<TextLine>) -> Self {
        Self {
            kind: BlockKind::Text,
            bbox,
            lines,
            table: None,
            image: None,
            needs_ocr: false,
        }
    }

    pub fn table(bbox: BBox, table: Table) -> Self {
        Self {
            kind: BlockKind::Table,
            bbox,
            lines: Vec::new(),
            table: Some(table),
            image: None,
            needs_ocr: false,
        }
    }

    /// Full-page region awaiting OCR.
    pub fn unrecognised(bbox: BBox) -> Self {
        Self {
            needs_ocr: true,
            ..Self::text(bbox, Vec::new())
        }
    }

    /// Lines joined with single spaces.
    pub fn joined_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Average line height, 0 for blocks without lines.
    pub fn line_size(&self) -> f32 {
        if self.lines.is_empty() {
            return 0.0;
        }
        self.lines.iter().map(TextLine::size).sum::<f32>() / self.lines.len() as f32
    }
}

/// One page after layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 0-based page index.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<Block>,
}

/// An image extracted from the document (page rasters of scanned pages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Document-level metadata from the PDF info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// The block tree for a whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pages: Vec<Page>,
    #[serde(skip)]
    pub images: BTreeMap<String, ImageAsset>,
}

impl Document {
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.pages.iter().flat_map(|p| p.blocks.iter())
    }
}

/// Entry of the generated table of contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub level: u8,
    /// 1-indexed page number.
    pub page: usize,
}

/// Per-page statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageStats {
    /// 1-indexed page number.
    pub page: usize,
    pub text_blocks: usize,
    pub tables: usize,
    pub pictures: usize,
    /// True when the page content came from the OCR model.
    pub ocr_used: bool,
}

/// Auxiliary metadata produced alongside the block tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderMetadata {
    pub document: DocumentMetadata,
    pub table_of_contents: Vec<TocEntry>,
    pub page_stats: Vec<PageStats>,
    /// Where each model actually ran.
    pub placements: Vec<Placement>,
    /// Device chosen by the selector.
    pub device: Option<ComputeDevice>,
    pub processors: Vec<String>,
    pub duration_ms: u64,
}

/// Structured result of converting one document.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub format: OutputFormat,
    pub document: Document,
    pub metadata: RenderMetadata,
}
