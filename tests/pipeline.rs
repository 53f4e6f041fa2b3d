//! Pipeline integration tests with in-process fake models.
//!
//! No pdfium library or network access is needed: the document source and
//! layout model are fakes driven by a scripted text layer, while table
//! recognition, reading order and OCR use the built-in CPU models.

use async_trait::async_trait;
use edgequake_doc2md::document::{
    BBox, Block, DocumentMetadata, Page, PageContent, TextLine, TextSpan,
};
use edgequake_doc2md::models::ocr::TextLayerRecognizer;
use edgequake_doc2md::models::order::XyCutOrder;
use edgequake_doc2md::models::table::GridTableRecognizer;
use edgequake_doc2md::models::{DocumentSource, LayoutModel, ReadingOrderModel};
use edgequake_doc2md::{
    run_with_loader, ComputeDevice, ConversionOptions, Doc2MdError, DocumentConverter, ModelError,
    ModelLoader, ModelRegistry, ModelRole, OutputFormat, PipelineConfig, RetryPolicy,
};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Fakes ────────────────────────────────────────────────────────────────

fn span(text: &str, x0: f32, y0: f32, x1: f32) -> TextSpan {
    TextSpan {
        text: text.to_string(),
        bbox: BBox::new(x0, y0, x1, y0 + 12.0),
    }
}

/// Three pages: two paragraphs listed bottom-up, two columns listed
/// right-to-left, and a scanned page without a text layer.
fn book_pages() -> Vec<PageContent> {
    let page = |index, spans| PageContent {
        index,
        width: 600.0,
        height: 800.0,
        spans,
    };
    vec![
        page(
            0,
            vec![
                span("Second paragraph.", 50.0, 200.0, 300.0),
                span("First paragraph.", 50.0, 100.0, 300.0),
            ],
        ),
        page(
            1,
            vec![
                span("Right column.", 320.0, 100.0, 520.0),
                span("Left column.", 50.0, 100.0, 250.0),
            ],
        ),
        page(2, Vec::new()),
    ]
}

const BOOK_MARKDOWN: &str =
    "First paragraph.\n\nSecond paragraph.\n\nLeft column.\n\nRight column.\n\n![](page-3-0.png)\n";

struct FakeSource {
    pages: Vec<PageContent>,
    metadata_failures: Arc<AtomicUsize>,
}

#[async_trait]
impl DocumentSource for FakeSource {
    fn name(&self) -> &str {
        "fake-source"
    }

    async fn metadata(&self, _path: &Path) -> Result<DocumentMetadata, ModelError> {
        let remaining = self.metadata_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.metadata_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ModelError::Source("transient read error".into()));
        }
        Ok(DocumentMetadata {
            title: Some("Book".into()),
            page_count: self.pages.len(),
            pdf_version: "1.7".into(),
            ..Default::default()
        })
    }

    async fn load_pages(
        &self,
        _path: &Path,
        indices: &[usize],
    ) -> Result<Vec<PageContent>, ModelError> {
        indices
            .iter()
            .map(|&i| {
                self.pages
                    .get(i)
                    .cloned()
                    .ok_or_else(|| ModelError::Source(format!("no page {i}")))
            })
            .collect()
    }

    async fn render_page(&self, _path: &Path, _index: usize) -> Result<DynamicImage, ModelError> {
        Ok(DynamicImage::new_rgb8(8, 8))
    }
}

/// One text block per span; no spans means a block awaiting OCR.
struct SpanLayout {
    accelerated: bool,
}

impl LayoutModel for SpanLayout {
    fn name(&self) -> &str {
        "span-layout"
    }

    fn supports(&self, device: ComputeDevice) -> bool {
        self.accelerated || !device.is_accelerator()
    }

    fn detect(&self, content: &PageContent) -> Result<Page, ModelError> {
        let blocks = if content.spans.is_empty() {
            vec![Block::unrecognised(BBox::new(
                0.0,
                0.0,
                content.width,
                content.height,
            ))]
        } else {
            content
                .spans
                .iter()
                .map(|s| Block::text(s.bbox, vec![TextLine::new(s.text.clone(), s.bbox)]))
                .collect()
        };
        Ok(Page {
            index: content.index,
            width: content.width,
            height: content.height,
            blocks,
        })
    }
}

/// Returns an order that repeats the first block.
struct BrokenOrder;

impl ReadingOrderModel for BrokenOrder {
    fn name(&self) -> &str {
        "broken-order"
    }

    fn order(&self, page: &Page) -> Result<Vec<usize>, ModelError> {
        Ok(vec![0; page.blocks.len().max(2)])
    }
}

#[derive(Default)]
struct FakeLoader {
    loads: AtomicUsize,
    metadata_failures: Arc<AtomicUsize>,
    broken_order: bool,
}

impl FakeLoader {
    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for FakeLoader {
    fn load(&self, device: ComputeDevice) -> Result<ModelRegistry, Doc2MdError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let builder = ModelRegistry::builder(device)
            .source(FakeSource {
                pages: book_pages(),
                metadata_failures: Arc::clone(&self.metadata_failures),
            })
            .layout(SpanLayout { accelerated: true })
            .ocr(TextLayerRecognizer)
            .table(GridTableRecognizer::default())
            .processors(Vec::new());
        if self.broken_order {
            builder.order(BrokenOrder).build()
        } else {
            builder.order(XyCutOrder::default()).build()
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Route library logs through the test writer; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Workspace {
    _dir: tempfile::TempDir,
    input: PathBuf,
    out: PathBuf,
}

fn workspace() -> Workspace {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.pdf");
    fs::write(&input, b"%PDF-1.7\n%fake body\n").unwrap();
    let out = dir.path().join("out");
    Workspace {
        input,
        out,
        _dir: dir,
    }
}

fn config(ws: &Workspace, options: ConversionOptions) -> PipelineConfig {
    PipelineConfig::new(&ws.input, &ws.out)
        .with_options(options)
        .with_device(ComputeDevice::Cpu)
        .with_retry(RetryPolicy {
            max_attempts: 1,
            backoff_ms: 0,
        })
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn converts_book_in_reading_order() {
    let ws = workspace();
    let loader = FakeLoader::default();
    let report = run_with_loader(&config(&ws, ConversionOptions::default()), &loader)
        .await
        .unwrap();

    assert_eq!(loader.loads(), 1);
    assert_eq!(report.output_path, ws.out.join("book.md"));
    assert_eq!(report.pages, 3);
    assert_eq!(report.device, ComputeDevice::Cpu);
    assert_eq!(report.attempts, 1);

    let markdown = fs::read_to_string(&report.output_path).unwrap();
    assert_eq!(markdown, BOOK_MARKDOWN);
    assert_eq!(report.bytes, markdown.len());
}

#[tokio::test]
async fn missing_input_never_loads_models() {
    let ws = workspace();
    fs::remove_file(&ws.input).unwrap();
    let loader = FakeLoader::default();

    let err = run_with_loader(&config(&ws, ConversionOptions::default()), &loader)
        .await
        .unwrap_err();

    assert!(
        matches!(err, Doc2MdError::InputNotFound { .. }),
        "got {err}"
    );
    assert_eq!(err.exit_code(), 2);
    assert_eq!(loader.loads(), 0);
    assert!(!ws.out.exists());
}

#[tokio::test]
async fn non_pdf_input_never_loads_models() {
    let ws = workspace();
    fs::write(&ws.input, b"PK\x03\x04 not a pdf").unwrap();
    let loader = FakeLoader::default();

    let err = run_with_loader(&config(&ws, ConversionOptions::default()), &loader)
        .await
        .unwrap_err();

    assert!(matches!(err, Doc2MdError::NotAPdf { .. }));
    assert_eq!(loader.loads(), 0);
}

#[test]
fn unknown_option_key_is_rejected() {
    let err = ConversionOptions::from_json_str(
        r#"{"output_format":"markdown","batch_multiplier":2,"languages":["en"],"dpi":300}"#,
    )
    .unwrap_err();
    assert!(matches!(err, Doc2MdError::InvalidOptions(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn zero_batch_multiplier_is_rejected() {
    let err = ConversionOptions::builder()
        .batch_multiplier(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, Doc2MdError::InvalidOptions(_)));
}

#[tokio::test]
async fn batch_multiplier_does_not_change_output() {
    for multiplier in [1, 3, 64] {
        let ws = workspace();
        let options = ConversionOptions::builder()
            .batch_multiplier(multiplier)
            .build()
            .unwrap();
        let report = run_with_loader(&config(&ws, options), &FakeLoader::default())
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(report.output_path).unwrap(),
            BOOK_MARKDOWN,
            "batch_multiplier {multiplier}"
        );
    }
}

#[tokio::test]
async fn rerun_overwrites_without_leftovers() {
    let ws = workspace();
    let loader = FakeLoader::default();
    let cfg = config(&ws, ConversionOptions::default());

    fs::create_dir_all(&ws.out).unwrap();
    fs::write(ws.out.join("book.md"), "stale\n").unwrap();

    let first = run_with_loader(&cfg, &loader).await.unwrap();
    let second = run_with_loader(&cfg, &loader).await.unwrap();

    assert_eq!(first.output_path, second.output_path);
    assert_eq!(
        fs::read_to_string(&second.output_path).unwrap(),
        BOOK_MARKDOWN
    );
    assert_eq!(dir_entries(&ws.out), vec!["book.md".to_string()]);
}

#[tokio::test]
async fn json_output_carries_metadata() {
    let ws = workspace();
    let options = ConversionOptions::builder()
        .output_format(OutputFormat::Json)
        .build()
        .unwrap();
    let report = run_with_loader(&config(&ws, options), &FakeLoader::default())
        .await
        .unwrap();

    assert_eq!(report.output_path, ws.out.join("book.json"));
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report.output_path).unwrap()).unwrap();
    assert_eq!(value["pages"].as_array().unwrap().len(), 3);
    assert_eq!(value["metadata"]["document"]["title"], "Book");
    assert_eq!(value["metadata"]["page_stats"][2]["pictures"], 1);
    assert_eq!(value["metadata"]["page_stats"][2]["ocr_used"], false);
}

#[tokio::test]
async fn accelerator_fallback_is_recorded() {
    let ws = workspace();
    let cfg = config(&ws, ConversionOptions::default()).with_device(ComputeDevice::Cuda(0));
    let report = run_with_loader(&cfg, &FakeLoader::default()).await.unwrap();

    let layout = report
        .placements
        .iter()
        .find(|p| p.role == ModelRole::Layout)
        .unwrap();
    assert_eq!(layout.device, ComputeDevice::Cuda(0));
    assert!(!layout.fallback);

    let table = report
        .placements
        .iter()
        .find(|p| p.role == ModelRole::TableRecognition)
        .unwrap();
    assert_eq!(table.requested, ComputeDevice::Cuda(0));
    assert_eq!(table.device, ComputeDevice::Cpu);
    assert!(table.fallback);
}

#[tokio::test]
async fn invalid_reading_order_fails_without_output() {
    let ws = workspace();
    let loader = FakeLoader {
        broken_order: true,
        ..Default::default()
    };
    let err = run_with_loader(&config(&ws, ConversionOptions::default()), &loader)
        .await
        .unwrap_err();

    match &err {
        Doc2MdError::ConversionFailure { stage, page, .. } => {
            assert_eq!(stage, "reading_order");
            assert_eq!(*page, Some(1));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 5);
    assert!(!ws.out.join("book.md").exists());
}

#[tokio::test]
async fn conversion_failure_is_retried_when_allowed() {
    let ws = workspace();
    let loader = FakeLoader {
        metadata_failures: Arc::new(AtomicUsize::new(1)),
        ..Default::default()
    };

    let single = config(&ws, ConversionOptions::default());
    let err = run_with_loader(&single, &loader).await.unwrap_err();
    assert!(matches!(err, Doc2MdError::ConversionFailure { .. }));

    loader.metadata_failures.store(1, Ordering::SeqCst);
    let retrying = single.with_retry(RetryPolicy {
        max_attempts: 2,
        backoff_ms: 0,
    });
    let report = run_with_loader(&retrying, &loader).await.unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(
        fs::read_to_string(report.output_path).unwrap(),
        BOOK_MARKDOWN
    );
}

#[tokio::test]
async fn converter_is_reusable_across_calls() {
    let ws = workspace();
    let registry = FakeLoader::default().load(ComputeDevice::Cpu).unwrap();
    let converter = DocumentConverter::new(registry, ConversionOptions::default());

    let first = converter.convert(&ws.input).await.unwrap();
    let second = converter.convert(&ws.input).await.unwrap();
    assert_eq!(first.document, second.document);
    assert_eq!(first.metadata.document.page_count, 3);
    assert!(first.document.images.contains_key("page-3-0.png"));
}

#[tokio::test]
async fn conversion_runs_on_a_spawned_task() {
    let ws = workspace();
    let registry = FakeLoader::default().load(ComputeDevice::Cpu).unwrap();
    let converter = Arc::new(DocumentConverter::new(
        registry,
        ConversionOptions::default(),
    ));

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let converter = Arc::clone(&converter);
            let input = ws.input.clone();
            tokio::spawn(async move { converter.convert(&input).await })
        })
        .collect();
    for task in tasks {
        let rendered = task.await.unwrap().unwrap();
        assert_eq!(rendered.metadata.document.page_count, 3);
    }
}
