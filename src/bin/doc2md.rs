//! CLI binary for edgequake-doc2md.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `PipelineConfig`, runs the pipeline and maps failures to exit codes.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::options::split_language_list;
use edgequake_doc2md::{
    run, select_device, ComputeDevice, ConversionOptions, Doc2MdError, LoaderSettings, OcrEngine,
    OutputFormat, PipelineConfig, RetryPolicy, RunReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert ./book.pdf to ./out/book.md
  doc2md

  # Another document, larger batches, English then German
  doc2md report.pdf --batch-multiplier 4 --languages en,de

  # Options from a JSON file (exactly output_format, batch_multiplier, languages)
  doc2md book.pdf --options options.json

  # Scanned document: transcribe image-only pages with a vision model
  doc2md scan.pdf --ocr vision --vision-model gpt-4.1-nano

EXIT CODES:
  0  success
  2  input not found, unreadable or not a PDF
  3  invalid conversion options
  4  model load failure
  5  conversion failure
  6  output write failure
  1  anything else

ENVIRONMENT VARIABLES:
  RUST_LOG                tracing filter (overrides -v / -q)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  OPENAI_API_KEY          OpenAI API key (vision OCR)
  ANTHROPIC_API_KEY       Anthropic API key (vision OCR)
  EDGEQUAKE_LLM_PROVIDER  Vision provider override
  EDGEQUAKE_MODEL         Vision model override
"#;

/// Convert a PDF document to Markdown with a layout/OCR/table/reading-order pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert a PDF document to Markdown, JSON or HTML",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF document to convert.
    #[arg(default_value = edgequake_doc2md::config::DEFAULT_INPUT)]
    input: PathBuf,

    /// Directory receiving `<input name>.<format extension>`.
    #[arg(short, long, env = "DOC2MD_OUTPUT_DIR",
          default_value = edgequake_doc2md::config::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Output format: markdown, json or html [default: markdown].
    #[arg(short, long, env = "DOC2MD_FORMAT")]
    format: Option<String>,

    /// Batch size multiplier (1–64) [default: 2].
    #[arg(
        short,
        long,
        env = "DOC2MD_BATCH_MULTIPLIER",
        allow_negative_numbers = true
    )]
    batch_multiplier: Option<i64>,

    /// Comma-separated OCR languages, highest priority first [default: en].
    #[arg(short, long, env = "DOC2MD_LANGUAGES")]
    languages: Option<String>,

    /// JSON file with conversion options; flags given explicitly override it.
    #[arg(long, env = "DOC2MD_OPTIONS")]
    options: Option<PathBuf>,

    /// OCR engine for pages without a text layer: text-layer or vision.
    #[arg(long, env = "DOC2MD_OCR", default_value = "text-layer")]
    ocr: OcrEngine,

    /// Vision model id (with --ocr vision).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    vision_model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    vision_provider: Option<String>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Compute device.
    #[arg(long, env = "DOC2MD_DEVICE", value_enum, default_value = "auto")]
    device: DeviceArg,

    /// Conversion attempts before giving up.
    #[arg(long, env = "DOC2MD_RETRIES", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    retries: u32,

    /// Delay before the first retry; doubled for each further retry.
    #[arg(long, env = "DOC2MD_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DeviceArg {
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl DeviceArg {
    fn resolve(self) -> ComputeDevice {
        match self {
            DeviceArg::Auto => select_device(),
            DeviceArg::Cpu => ComputeDevice::Cpu,
            DeviceArg::Cuda => ComputeDevice::Cuda(0),
            DeviceArg::Metal => ComputeDevice::Metal,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the normal-mode feedback; library logs are shown
    // only with --verbose or RUST_LOG.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // The result line goes to stdout; logs and the spinner stay on stderr.
    match execute(&cli).await {
        Ok(report) => {
            if !cli.quiet {
                println!("{}", success_message(&report));
            }
        }
        Err(err) => {
            let code = err
                .downcast_ref::<Doc2MdError>()
                .map(Doc2MdError::exit_code)
                .unwrap_or(1);
            println!("{} {:#}", red("✘"), err);
            std::process::exit(code);
        }
    }
}

fn success_message(report: &RunReport) -> String {
    format!(
        "{}  {} pages  {}ms  →  {}\n   {}",
        green("✔"),
        report.pages,
        report.total_ms,
        bold(&report.output_path.display().to_string()),
        dim(&format!(
            "{} bytes · models {}ms · convert {}ms · {} attempt(s)",
            report.bytes, report.load_ms, report.convert_ms, report.attempts
        )),
    )
}

async fn execute(cli: &Cli) -> Result<RunReport> {
    let mut config = build_config(cli)?;

    let device = cli.device.resolve();
    config.device = Some(device);
    if !cli.quiet {
        eprintln!(
            "{} Device: {}",
            cyan("◆"),
            bold(&device.to_string().to_uppercase())
        );
    }

    let spinner = (!cli.quiet).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Converting");
        bar.set_message(format!(
            "{} (loading models, then processing pages…)",
            config.input.display()
        ));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = run(&config).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let report = result.with_context(|| format!("Failed to convert {}", config.input.display()))?;

    for placement in report.placements.iter().filter(|p| p.fallback) {
        eprintln!(
            "{} {} model '{}' ran on {} instead of {}",
            cyan("⚠"),
            placement.role,
            placement.model,
            placement.device,
            placement.requested
        );
    }
    Ok(report)
}

/// Map CLI args to a `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig, Doc2MdError> {
    let base = match &cli.options {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| {
                Doc2MdError::InvalidOptions(format!(
                    "cannot read options file '{}': {e}",
                    path.display()
                ))
            })?;
            ConversionOptions::from_json_str(&json)?
        }
        None => ConversionOptions::default(),
    };

    let mut builder = base.to_builder();
    if let Some(ref format) = cli.format {
        builder = builder.output_format(format.parse::<OutputFormat>()?);
    }
    if let Some(n) = cli.batch_multiplier {
        builder = builder.batch_multiplier(n);
    }
    if let Some(ref languages) = cli.languages {
        builder = builder.languages(split_language_list(languages));
    }
    let options = builder.build()?;

    let loader = LoaderSettings {
        pdfium_library: cli.pdfium_lib.clone(),
        ocr_engine: cli.ocr,
        vision_model: cli.vision_model.clone(),
        vision_provider: cli.vision_provider.clone(),
        ..Default::default()
    };

    Ok(
        PipelineConfig::new(cli.input.clone(), cli.output_dir.clone())
            .with_options(options)
            .with_retry(RetryPolicy {
                max_attempts: cli.retries,
                backoff_ms: cli.retry_backoff_ms,
            })
            .with_loader(loader),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn vision_provider_reads_the_loader_env_var() {
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "vision_provider")
            .unwrap();
        assert_eq!(
            arg.get_env().and_then(|v| v.to_str()),
            Some("EDGEQUAKE_LLM_PROVIDER")
        );
    }

    #[test]
    fn flags_map_to_pipeline_config() {
        let cli = Cli::try_parse_from([
            "doc2md",
            "report.pdf",
            "--format",
            "json",
            "--batch-multiplier",
            "3",
            "--vision-provider",
            "anthropic",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.input, PathBuf::from("report.pdf"));
        assert_eq!(config.options.output_format(), OutputFormat::Json);
        assert_eq!(config.options.batch_multiplier(), 3);
        assert_eq!(config.loader.vision_provider.as_deref(), Some("anthropic"));
    }

    #[test]
    fn success_message_names_the_output() {
        let report = RunReport {
            output_path: PathBuf::from("out/book.md"),
            device: ComputeDevice::Cpu,
            placements: Vec::new(),
            pages: 3,
            bytes: 120,
            attempts: 1,
            load_ms: 5,
            convert_ms: 7,
            total_ms: 12,
        };
        let message = success_message(&report);
        assert!(message.contains("3 pages"));
        assert!(message.contains("out/book.md"));
        assert!(message.contains("120 bytes"));
    }
}
