//! Geometric layout segmentation over the PDF text layer.
//!
//! The algorithm:
//! 1. Cluster text spans into visual rows by vertical overlap
//! 2. Split each row into line fragments at wide horizontal gaps
//!    (column gutters, table cell gaps)
//! 3. Stack fragments into blocks while they stay close vertically, overlap
//!    horizontally and keep a similar line height
//! 4. Label blocks in the top/bottom page margins as page headers/footers
//!
//! A page without any text layer becomes one full-page block flagged for OCR.

use super::LayoutModel;
use crate::document::{BBox, Block, BlockKind, Page, PageContent, TextLine, TextSpan};
use crate::error::ModelError;
use tracing::debug;

/// Tuning knobs for [`LineLayoutModel`]. Distances are multiples of the line height.
#[derive(Debug, Clone)]
pub struct LayoutSettings {
    /// Minimum vertical overlap (fraction of the smaller height) for two spans
    /// to share a row.
    pub row_overlap: f32,
    /// Horizontal gap that splits a row into separate fragments.
    pub fragment_gap: f32,
    /// Largest vertical gap between two lines of the same block.
    pub paragraph_gap: f32,
    /// Allowed relative line-height difference inside a block.
    pub size_tolerance: f32,
    /// Top/bottom page margin (fraction of page height) for headers/footers.
    pub margin: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            row_overlap: 0.5,
            fragment_gap: 2.0,
            paragraph_gap: 0.9,
            size_tolerance: 0.2,
            margin: 0.06,
        }
    }
}

/// CPU layout model working on text-layer geometry.
#[derive(Debug, Clone, Default)]
pub struct LineLayoutModel {
    settings: LayoutSettings,
}

impl LineLayoutModel {
    pub fn new(settings: LayoutSettings) -> Self {
        Self { settings }
    }

    /// Rows of spans, top to bottom, each split into fragments.
    fn build_lines(&self, spans: &[TextSpan]) -> Vec<TextLine> {
        let mut spans: Vec<&TextSpan> =
            spans.iter().filter(|s| !s.text.trim().is_empty()).collect();
        spans.sort_by(|a, b| {
            a.bbox
                .y0
                .total_cmp(&b.bbox.y0)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });

        let mut rows: Vec<(BBox, Vec<&TextSpan>)> = Vec::new();
        for span in spans {
            let joins_last = rows.last().is_some_and(|(bbox, _)| {
                let smaller = bbox.height().min(span.bbox.height()).max(1.0);
                bbox.vertical_overlap(&span.bbox) >= self.settings.row_overlap * smaller
            });
            match rows.last_mut() {
                Some((bbox, members)) if joins_last => {
                    *bbox = bbox.union(&span.bbox);
                    members.push(span);
                }
                _ => rows.push((span.bbox, vec![span])),
            }
        }

        let mut lines = Vec::new();
        for (row_bbox, mut members) in rows {
            members.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
            let height = row_bbox.height().max(1.0);
            let mut fragment: Vec<&TextSpan> = Vec::new();
            for span in members {
                if let Some(prev) = fragment.last() {
                    if span.bbox.x0 - prev.bbox.x1 > self.settings.fragment_gap * height {
                        lines.push(join_spans(&fragment));
                        fragment.clear();
                    }
                }
                fragment.push(span);
            }
            if !fragment.is_empty() {
                lines.push(join_spans(&fragment));
            }
        }
        lines
    }

    fn continues(&self, block: &Block, line: &TextLine) -> bool {
        let Some(last) = block.lines.last() else {
            return false;
        };
        let size = last.size().max(1.0);
        let gap = line.bbox.y0 - last.bbox.y1;
        let below = line.bbox.y0 >= last.bbox.center_y();
        let overlaps_x = line.bbox.x0 < block.bbox.x1 && line.bbox.x1 > block.bbox.x0;
        let similar = (line.size() - last.size()).abs() <= self.settings.size_tolerance * size;
        below && gap <= self.settings.paragraph_gap * size && overlaps_x && similar
    }

    fn label_margins(&self, blocks: &mut [Block], page_height: f32) {
        let top = page_height * self.settings.margin;
        let bottom = page_height * (1.0 - self.settings.margin);
        for block in blocks.iter_mut() {
            if block.bbox.y1 <= top {
                block.kind = BlockKind::PageHeader;
            } else if block.bbox.y0 >= bottom {
                block.kind = BlockKind::PageFooter;
            }
        }
    }
}

/// Concatenate spans of one fragment, inserting a space at visible gaps.
fn join_spans(spans: &[&TextSpan]) -> TextLine {
    let mut text = String::new();
    let mut bbox: Option<BBox> = None;
    for span in spans {
        if let Some(prev) = bbox {
            let gap = span.bbox.x0 - prev.x1;
            let spaced =
                text.ends_with(char::is_whitespace) || span.text.starts_with(char::is_whitespace);
            if !spaced && gap > 0.15 * span.bbox.height().max(1.0) {
                text.push(' ');
            }
        }
        text.push_str(&span.text);
        bbox = Some(bbox.map_or(span.bbox, |b| b.union(&span.bbox)));
    }
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    TextLine::new(text, bbox.unwrap_or_default())
}

impl LayoutModel for LineLayoutModel {
    fn name(&self) -> &str {
        "line-layout"
    }

    fn detect(&self, content: &PageContent) -> Result<Page, ModelError> {
        let full_page = BBox::new(0.0, 0.0, content.width, content.height);
        if !content.has_text_layer() {
            debug!(
                "Page {}: no text layer, flagging for OCR",
                content.index + 1
            );
            return Ok(Page {
                index: content.index,
                width: content.width,
                height: content.height,
                blocks: vec![Block::unrecognised(full_page)],
            });
        }

        let mut blocks: Vec<Block> = Vec::new();
        for line in self.build_lines(&content.spans) {
            match blocks.iter_mut().rev().find(|b| self.continues(b, &line)) {
                Some(block) => {
                    block.bbox = block.bbox.union(&line.bbox);
                    block.lines.push(line);
                }
                None => blocks.push(Block::text(line.bbox, vec![line])),
            }
        }
        self.label_margins(&mut blocks, content.height);

        debug!("Page {}: {} blocks", content.index + 1, blocks.len());
        Ok(Page {
            index: content.index,
            width: content.width,
            height: content.height,
            blocks,
        })
    }
}
