//! Document converter: runs the loaded models over one PDF.
//!
//! ## Stages
//!
//! ```text
//! check input ──▶ metadata ──▶ for each batch of pages:
//!                                 text layer → layout → ocr → tables → reading order
//!             ──▶ processors (document-wide) ──▶ RenderMetadata ──▶ RenderedDocument
//! ```
//!
//! Pages are processed in batches of [`BASE_BATCH`] × `batch_multiplier`;
//! vision OCR runs up to `batch_multiplier` pages concurrently. Any failure
//! aborts the whole conversion: there is no partial result.

use crate::document::{
    Block, BlockKind, Document, ImageAsset, Page, PageStats, RenderMetadata, RenderedDocument,
    TextLine, TocEntry,
};
use crate::error::{Doc2MdError, ModelError};
use crate::input::check_input;
use crate::models::{ModelRegistry, OcrRequest};
use crate::options::ConversionOptions;
use crate::processors::{self, ProcessorId};
use futures::stream::{self, StreamExt, TryStreamExt};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pages per batch at `batch_multiplier = 1`.
pub const BASE_BATCH: usize = 4;

fn stage_error(stage: &'static str, page: Option<usize>) -> impl Fn(ModelError) -> Doc2MdError {
    move |e| Doc2MdError::ConversionFailure {
        stage: stage.to_string(),
        page,
        detail: e.to_string(),
    }
}

/// OCR output for one page: the raster (if rendered) and lines per block.
struct OcrOutcome {
    position: usize,
    image: Option<DynamicImage>,
    blocks: Vec<(usize, Vec<TextLine>)>,
}

/// Callable conversion pipeline built once from a registry and options.
pub struct DocumentConverter {
    registry: ModelRegistry,
    options: ConversionOptions,
    processors: Vec<ProcessorId>,
}

impl DocumentConverter {
    pub fn new(registry: ModelRegistry, options: ConversionOptions) -> Self {
        let processors = registry.processors().to_vec();
        Self {
            registry,
            options,
            processors,
        }
    }

    /// Override the processor list taken from the registry.
    pub fn with_processors(mut self, processors: Vec<ProcessorId>) -> Self {
        self.processors = processors;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn processors(&self) -> &[ProcessorId] {
        &self.processors
    }

    pub fn batch_size(&self) -> usize {
        BASE_BATCH * self.options.batch_multiplier() as usize
    }

    /// Convert one PDF into a [`RenderedDocument`].
    pub async fn convert(&self, path: impl AsRef<Path>) -> Result<RenderedDocument, Doc2MdError> {
        let path = path.as_ref();
        let start = Instant::now();
        check_input(path)?;

        let source = self.registry.source();
        let doc_meta = source
            .metadata(path)
            .await
            .map_err(stage_error("metadata", None))?;
        info!(
            "Converting {} ({} pages, batch size {})",
            path.display(),
            doc_meta.page_count,
            self.batch_size()
        );

        let mut document = Document::default();
        let mut ocr_used = vec![false; doc_meta.page_count];
        let indices: Vec<usize> = (0..doc_meta.page_count).collect();

        for batch in indices.chunks(self.batch_size()) {
            let batch_start = Instant::now();
            let contents = source
                .load_pages(path, batch)
                .await
                .map_err(stage_error("text_layer", batch.first().map(|i| i + 1)))?;
            if contents.len() != batch.len() {
                return Err(Doc2MdError::ConversionFailure {
                    stage: "text_layer".into(),
                    page: None,
                    detail: format!(
                        "{} returned {} pages for a batch of {}",
                        source.name(),
                        contents.len(),
                        batch.len()
                    ),
                });
            }

            let mut pages = Vec::with_capacity(contents.len());
            for content in &contents {
                let page = self
                    .registry
                    .layout()
                    .detect(content)
                    .map_err(stage_error("layout", Some(content.index + 1)))?;
                pages.push(page);
            }

            for (position, used) in self.recognize_text(path, &mut pages, &mut document).await? {
                if let Some(page) = pages.get(position) {
                    if let Some(flag) = ocr_used.get_mut(page.index) {
                        *flag = used;
                    }
                }
            }

            for page in &mut pages {
                let n = page.index + 1;
                self.registry
                    .table()
                    .recognize(page)
                    .map_err(stage_error("table_recognition", Some(n)))?;
                let order = self
                    .registry
                    .order()
                    .order(page)
                    .map_err(stage_error("reading_order", Some(n)))?;
                apply_order(page, &order, self.registry.order().name())
                    .map_err(stage_error("reading_order", Some(n)))?;
            }

            debug!(
                "Pages {}-{} done in {:?}",
                batch[0] + 1,
                batch[batch.len() - 1] + 1,
                batch_start.elapsed()
            );
            document.pages.extend(pages);
        }

        for id in &self.processors {
            processors::apply(*id, &mut document);
        }

        let metadata = RenderMetadata {
            table_of_contents: table_of_contents(&document),
            page_stats: page_stats(&document, &ocr_used),
            placements: self.registry.placements().cloned().collect(),
            device: Some(self.registry.device()),
            processors: self.processors.iter().map(ToString::to_string).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
            document: doc_meta,
        };
        info!(
            "Converted {} pages in {}ms",
            metadata.document.page_count, metadata.duration_ms
        );

        Ok(RenderedDocument {
            format: self.options.output_format(),
            document,
            metadata,
        })
    }

    /// Blocking variant of [`Self::convert`] on its own tokio runtime.
    pub fn convert_blocking(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<RenderedDocument, Doc2MdError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| Doc2MdError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.convert(path))
    }

    /// Fill blocks flagged by layout. Returns `(position, ocr_used)` per page
    /// that had such blocks.
    async fn recognize_text(
        &self,
        path: &Path,
        pages: &mut [Page],
        document: &mut Document,
    ) -> Result<Vec<(usize, bool)>, Doc2MdError> {
        let source = self.registry.source();
        let ocr = self.registry.ocr();
        let languages = self.options.languages();

        let flagged: Vec<(usize, &Page)> = pages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.blocks.iter().any(|b| b.needs_ocr))
            .collect();
        let tasks: Vec<_> = flagged
            .into_iter()
            .map(|(position, page)| async move {
                let n = page.index + 1;
                let image = if ocr.needs_page_image() {
                    let img = source
                        .render_page(path, page.index)
                        .await
                        .map_err(stage_error("render", Some(n)))?;
                    Some(img)
                } else {
                    None
                };

                let mut blocks = Vec::new();
                for (bi, block) in page.blocks.iter().enumerate().filter(|(_, b)| b.needs_ocr) {
                    let lines = ocr
                        .recognize(OcrRequest {
                            page_index: page.index,
                            page_width: page.width,
                            page_height: page.height,
                            region: block.bbox,
                            image: image.as_ref(),
                            languages,
                        })
                        .await
                        .map_err(stage_error("ocr", Some(n)))?;
                    blocks.push((bi, lines));
                }
                Ok::<_, Doc2MdError>(OcrOutcome {
                    position,
                    image,
                    blocks,
                })
            })
            .collect();
        let outcomes: Vec<OcrOutcome> = stream::iter(tasks)
            .buffered(self.options.batch_multiplier() as usize)
            .try_collect()
            .await?;

        let mut used = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let page = &mut pages[outcome.position];
            let n = page.index + 1;
            let mut any_text = false;
            let mut raster = outcome.image;

            for (bi, lines) in outcome.blocks {
                if lines.is_empty() {
                    warn!(
                        "Page {}: no text recognised, keeping the region as an image",
                        n
                    );
                    if raster.is_none() {
                        raster = Some(
                            source
                                .render_page(path, page.index)
                                .await
                                .map_err(stage_error("render", Some(n)))?,
                        );
                    }
                    if let Some(img) = &raster {
                        let name = format!("page-{n}-{bi}.png");
                        let asset = png_asset(img).map_err(|e| Doc2MdError::ConversionFailure {
                            stage: "render".into(),
                            page: Some(n),
                            detail: format!("image encoding failed: {e}"),
                        })?;
                        document.images.insert(name.clone(), asset);
                        let block = &mut page.blocks[bi];
                        block.kind = BlockKind::Picture;
                        block.image = Some(name);
                        block.needs_ocr = false;
                    }
                } else {
                    any_text = true;
                    let block = &mut page.blocks[bi];
                    block.kind = BlockKind::Text;
                    block.lines = lines;
                    block.needs_ocr = false;
                }
            }
            debug!(
                "Page {}: OCR {}",
                n,
                if any_text { "produced text" } else { "empty" }
            );
            used.push((outcome.position, any_text));
        }
        Ok(used)
    }
}

fn png_asset(image: &DynamicImage) -> Result<ImageAsset, image::ImageError> {
    let mut data = Vec::new();
    image.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)?;
    Ok(ImageAsset {
        mime_type: "image/png".into(),
        width: image.width(),
        height: image.height(),
        data,
    })
}

/// Reorder `page.blocks` by `order`, which must be a permutation.
fn apply_order(page: &mut Page, order: &[usize], model: &str) -> Result<(), ModelError> {
    let n = page.blocks.len();
    let mut seen = vec![false; n];
    let valid = order.len() == n
        && order
            .iter()
            .all(|&i| i < n && !std::mem::replace(&mut seen[i], true));
    if !valid {
        return Err(ModelError::InvalidOutput {
            model: model.to_string(),
            detail: format!("order {order:?} is not a permutation of {n} blocks"),
        });
    }
    let mut slots: Vec<Option<Block>> = std::mem::take(&mut page.blocks)
        .into_iter()
        .map(Some)
        .collect();
    page.blocks = order.iter().filter_map(|&i| slots[i].take()).collect();
    Ok(())
}

fn table_of_contents(document: &Document) -> Vec<TocEntry> {
    document
        .pages
        .iter()
        .flat_map(|p| p.blocks.iter().map(move |b| (p.index, b)))
        .filter_map(|(index, b)| match b.kind {
            BlockKind::SectionHeader { level } => Some(TocEntry {
                title: b.joined_text(),
                level,
                page: index + 1,
            }),
            _ => None,
        })
        .collect()
}

fn page_stats(document: &Document, ocr_used: &[bool]) -> Vec<PageStats> {
    let mut stats: BTreeMap<usize, PageStats> = (0..ocr_used.len())
        .map(|i| {
            (
                i,
                PageStats {
                    page: i + 1,
                    ocr_used: ocr_used[i],
                    ..Default::default()
                },
            )
        })
        .collect();
    for page in &document.pages {
        let entry = stats.entry(page.index).or_insert_with(|| PageStats {
            page: page.index + 1,
            ..Default::default()
        });
        for block in &page.blocks {
            match block.kind {
                BlockKind::Table => entry.tables += 1,
                BlockKind::Picture => entry.pictures += 1,
                BlockKind::PageHeader | BlockKind::PageFooter => {}
                _ => entry.text_blocks += 1,
            }
        }
    }
    stats.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BBox;

    fn page_with(texts: &[&str]) -> Page {
        Page {
            index: 0,
            width: 100.0,
            height: 100.0,
            blocks: texts
                .iter()
                .map(|t| Block::text(BBox::default(), vec![TextLine::new(*t, BBox::default())]))
                .collect(),
        }
    }

    #[test]
    fn apply_order_permutes_blocks() {
        let mut page = page_with(&["a", "b", "c"]);
        apply_order(&mut page, &[2, 0, 1], "t").unwrap();
        let texts: Vec<String> = page.blocks.iter().map(Block::joined_text).collect();
        assert_eq!(texts, vec!["c", "a", "b"]);
    }

    #[test]
    fn apply_order_rejects_non_permutations() {
        let mut page = page_with(&["a", "b"]);
        assert!(apply_order(&mut page, &[0, 0], "t").is_err());
        assert!(apply_order(&mut page, &[0], "t").is_err());
        assert!(apply_order(&mut page, &[0, 5], "t").is_err());
        assert_eq!(page.blocks.len(), 2);
    }

    #[test]
    fn toc_lists_headers_with_page_numbers() {
        let mut page = page_with(&["Intro", "body"]);
        page.index = 2;
        page.blocks[0].kind = BlockKind::SectionHeader { level: 1 };
        let doc = Document {
            pages: vec![page],
            ..Default::default()
        };
        assert_eq!(
            table_of_contents(&doc),
            vec![TocEntry {
                title: "Intro".into(),
                level: 1,
                page: 3
            }]
        );
    }

    #[test]
    fn stats_count_block_kinds() {
        let mut page = page_with(&["a", "b"]);
        page.blocks[1].kind = BlockKind::Picture;
        let doc = Document {
            pages: vec![page],
            ..Default::default()
        };
        let stats = page_stats(&doc, &[true]);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].text_blocks, 1);
        assert_eq!(stats[0].pictures, 1);
        assert!(stats[0].ocr_used);
    }
}
