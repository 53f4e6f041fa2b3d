//! pdfium-backed [`DocumentSource`]: text layer, page rasters, metadata.
//!
//! pdfium is a C++ library with process-global state, so every call runs
//! inside `tokio::task::spawn_blocking` and never on an async worker thread.
//!
//! Text-layer geometry is converted from the PDF bottom-left origin to the
//! top-left origin used by the rest of the crate.

use super::DocumentSource;
use crate::document::{BBox, DocumentMetadata, PageContent, TextSpan};
use crate::error::ModelError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest edge of a rendered page, in pixels.
pub const DEFAULT_RENDER_PIXELS: u32 = 2000;

/// Where the pdfium shared library was found.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PdfiumLibrary {
    Dir(PathBuf),
    System,
}

impl PdfiumLibrary {
    fn bind(&self) -> Result<Pdfium, PdfiumError> {
        let bindings = match self {
            PdfiumLibrary::Dir(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))?
            }
            PdfiumLibrary::System => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }
}

/// Document source reading PDFs through pdfium.
///
/// Only the library location is kept; each blocking task binds its own
/// `Pdfium` instance, since the bindings cannot cross threads.
#[derive(Debug, Clone)]
pub struct PdfiumSource {
    library: PdfiumLibrary,
    render_pixels: u32,
}

impl PdfiumSource {
    /// Bind the pdfium shared library once to check that it loads.
    ///
    /// With `library_dir` the platform library file in that directory is
    /// loaded; otherwise the working directory is tried before the system
    /// library search path.
    pub fn bind(library_dir: Option<&Path>) -> Result<Self, PdfiumError> {
        let library = match library_dir {
            Some(dir) => {
                let library = PdfiumLibrary::Dir(dir.to_path_buf());
                library.bind()?;
                library
            }
            None => {
                let local = PdfiumLibrary::Dir(PathBuf::from("./"));
                match local.bind() {
                    Ok(_) => local,
                    Err(_) => {
                        PdfiumLibrary::System.bind()?;
                        PdfiumLibrary::System
                    }
                }
            }
        };
        info!("pdfium bound ({:?})", library);
        Ok(Self {
            library,
            render_pixels: DEFAULT_RENDER_PIXELS,
        })
    }

    /// Cap the longest edge of rendered pages.
    pub fn with_render_pixels(mut self, pixels: u32) -> Self {
        self.render_pixels = pixels.max(1);
        self
    }

    async fn blocking<T, F>(&self, what: &'static str, f: F) -> Result<T, ModelError>
    where
        T: Send + 'static,
        F: FnOnce(&Pdfium) -> Result<T, ModelError> + Send + 'static,
    {
        let library = self.library.clone();
        tokio::task::spawn_blocking(move || {
            let pdfium = library
                .bind()
                .map_err(|e| ModelError::Source(format!("cannot bind pdfium: {e}")))?;
            f(&pdfium)
        })
        .await
        .map_err(|e| ModelError::Source(format!("{what} task panicked: {e}")))?
    }
}

#[async_trait]
impl DocumentSource for PdfiumSource {
    fn name(&self) -> &str {
        "pdfium"
    }

    async fn metadata(&self, path: &Path) -> Result<DocumentMetadata, ModelError> {
        let path = path.to_path_buf();
        self.blocking("metadata", move |pdfium| metadata_blocking(pdfium, &path))
            .await
    }

    async fn load_pages(
        &self,
        path: &Path,
        indices: &[usize],
    ) -> Result<Vec<PageContent>, ModelError> {
        let path = path.to_path_buf();
        let indices = indices.to_vec();
        self.blocking("text layer", move |pdfium| {
            load_pages_blocking(pdfium, &path, &indices)
        })
        .await
    }

    async fn render_page(&self, path: &Path, index: usize) -> Result<DynamicImage, ModelError> {
        let path = path.to_path_buf();
        let pixels = self.render_pixels;
        self.blocking("render", move |pdfium| {
            render_blocking(pdfium, &path, index, pixels)
        })
        .await
    }
}

fn open<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ModelError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ModelError::Source(format!("cannot open '{}': {:?}", path.display(), e)))
}

fn page_at<'a>(document: &PdfDocument<'a>, index: usize) -> Result<PdfPage<'a>, ModelError> {
    let pages = document.pages();
    let total = pages.len() as usize;
    if index >= total {
        return Err(ModelError::Source(format!(
            "page {} out of range (document has {} pages)",
            index + 1,
            total
        )));
    }
    pages
        .get(index as PdfPageIndex)
        .map_err(|e| ModelError::Source(format!("page {}: {:?}", index + 1, e)))
}

fn load_pages_blocking(
    pdfium: &Pdfium,
    path: &Path,
    indices: &[usize],
) -> Result<Vec<PageContent>, ModelError> {
    let document = open(pdfium, path)?;
    let mut pages = Vec::with_capacity(indices.len());

    for &index in indices {
        let page = page_at(&document, index)?;
        let height = page.height().value;
        let text = page
            .text()
            .map_err(|e| ModelError::Source(format!("page {} text: {:?}", index + 1, e)))?;

        let mut spans = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            spans.push(TextSpan {
                text: content,
                bbox: BBox::new(
                    bounds.left().value,
                    height - bounds.top().value,
                    bounds.right().value,
                    height - bounds.bottom().value,
                ),
            });
        }
        debug!("Page {}: {} text segments", index + 1, spans.len());

        pages.push(PageContent {
            index,
            width: page.width().value,
            height,
            spans,
        });
    }

    Ok(pages)
}

fn render_blocking(
    pdfium: &Pdfium,
    path: &Path,
    index: usize,
    pixels: u32,
) -> Result<DynamicImage, ModelError> {
    let document = open(pdfium, path)?;
    let page = page_at(&document, index)?;
    let config = PdfRenderConfig::new()
        .set_target_width(pixels as i32)
        .set_maximum_height(pixels as i32);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| ModelError::Source(format!("render page {}: {:?}", index + 1, e)))?;
    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        index + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}

fn metadata_blocking(pdfium: &Pdfium, path: &Path) -> Result<DocumentMetadata, ModelError> {
    let document = open(pdfium, path)?;
    let metadata = document.metadata();

    let tag = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentMetadata {
        title: tag(PdfDocumentMetadataTagType::Title),
        author: tag(PdfDocumentMetadataTagType::Author),
        subject: tag(PdfDocumentMetadataTagType::Subject),
        creator: tag(PdfDocumentMetadataTagType::Creator),
        producer: tag(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
