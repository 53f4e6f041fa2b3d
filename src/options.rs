//! Conversion options: the three recognised knobs of a conversion.
//!
//! [`ConversionOptions`] accepts exactly three keys and nothing else:
//!
//! | Key | Effect |
//! |-----|--------|
//! | `output_format` | serialisation target (`markdown`, `json`, `html`) |
//! | `batch_multiplier` | scales page batches and OCR concurrency, trading memory for throughput |
//! | `languages` | language codes the OCR stage should prioritise |
//!
//! Options come either from the typed [`ConversionOptionsBuilder`] or from a
//! JSON object ([`ConversionOptions::from_json_str`]). Both paths run the same
//! validation, and the JSON path rejects unrecognised keys instead of
//! ignoring them, so a typo such as `"batch_multipler"` fails before any model
//! is loaded.

use crate::error::Doc2MdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest accepted `batch_multiplier`.
pub const MAX_BATCH_MULTIPLIER: u32 = 64;

/// Validated options for one conversion.
///
/// # Example
/// ```rust
/// use edgequake_doc2md::{ConversionOptions, OutputFormat};
///
/// let options = ConversionOptions::builder()
///     .output_format(OutputFormat::Markdown)
///     .batch_multiplier(2)
///     .languages(["en"])
///     .build()
///     .unwrap();
/// assert_eq!(options.languages().primary(), "en");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOptions")]
pub struct ConversionOptions {
    output_format: OutputFormat,
    batch_multiplier: u32,
    languages: Languages,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Markdown,
            batch_multiplier: 2,
            languages: Languages(vec!["en".to_string()]),
        }
    }
}

impl ConversionOptions {
    /// Create a builder seeded with the defaults (markdown, 2, `en`).
    pub fn builder() -> ConversionOptionsBuilder {
        ConversionOptionsBuilder {
            output_format: OutputFormat::Markdown,
            batch_multiplier: 2,
            languages: vec!["en".to_string()],
        }
    }

    /// Parse options from a JSON object. All three keys are required and no
    /// other key is accepted.
    pub fn from_json_str(json: &str) -> Result<Self, Doc2MdError> {
        serde_json::from_str(json).map_err(|e| Doc2MdError::InvalidOptions(e.to_string()))
    }

    /// Same as [`Self::from_json_str`] for an already-parsed value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, Doc2MdError> {
        serde_json::from_value(value).map_err(|e| Doc2MdError::InvalidOptions(e.to_string()))
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn batch_multiplier(&self) -> u32 {
        self.batch_multiplier
    }

    pub fn languages(&self) -> &Languages {
        &self.languages
    }

    /// Return a builder preloaded with these options, for overriding a few keys.
    pub fn to_builder(&self) -> ConversionOptionsBuilder {
        ConversionOptionsBuilder {
            output_format: self.output_format,
            batch_multiplier: i64::from(self.batch_multiplier),
            languages: self.languages.0.clone(),
        }
    }
}

/// Builder for [`ConversionOptions`].
#[derive(Debug, Clone)]
pub struct ConversionOptionsBuilder {
    output_format: OutputFormat,
    batch_multiplier: i64,
    languages: Vec<String>,
}

impl ConversionOptionsBuilder {
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Accepts any integer so that zero and negative values reach validation
    /// and fail there with a clear message.
    pub fn batch_multiplier(mut self, n: impl Into<i64>) -> Self {
        self.batch_multiplier = n.into();
        self
    }

    pub fn languages<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Build the options, validating every field.
    pub fn build(self) -> Result<ConversionOptions, Doc2MdError> {
        Ok(ConversionOptions {
            output_format: self.output_format,
            batch_multiplier: validate_batch_multiplier(self.batch_multiplier)?,
            languages: Languages::new(self.languages)?,
        })
    }
}

// ── Raw (wire) form ──────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    output_format: OutputFormat,
    batch_multiplier: i64,
    languages: OneOrMany,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<RawOptions> for ConversionOptions {
    type Error = String;

    fn try_from(raw: RawOptions) -> Result<Self, Self::Error> {
        let codes = match raw.languages {
            OneOrMany::One(s) => split_language_list(&s),
            OneOrMany::Many(v) => v,
        };
        ConversionOptions::builder()
            .output_format(raw.output_format)
            .batch_multiplier(raw.batch_multiplier)
            .languages(codes)
            .build()
            .map_err(|e| match e {
                Doc2MdError::InvalidOptions(msg) => msg,
                other => other.to_string(),
            })
    }
}

fn validate_batch_multiplier(n: i64) -> Result<u32, Doc2MdError> {
    if n < 1 || n > i64::from(MAX_BATCH_MULTIPLIER) {
        return Err(Doc2MdError::InvalidOptions(format!(
            "batch_multiplier must be 1–{MAX_BATCH_MULTIPLIER}, got {n}"
        )));
    }
    Ok(n as u32)
}

/// Split a comma-separated language list such as `"en,de"`.
pub fn split_language_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

// ── Languages ────────────────────────────────────────────────────────────

/// Non-empty, deduplicated list of ISO-639 language codes, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Languages(Vec<String>);

impl Languages {
    pub fn new<I, S>(codes: I) -> Result<Self, Doc2MdError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for code in codes {
            let code: String = code.into();
            let code = code.trim().to_ascii_lowercase();
            let valid =
                (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_lowercase());
            if !valid {
                return Err(Doc2MdError::InvalidOptions(format!(
                    "language code '{code}' is not a 2–3 letter ISO-639 code"
                )));
            }
            if !out.contains(&code) {
                out.push(code);
            }
        }
        if out.is_empty() {
            return Err(Doc2MdError::InvalidOptions(
                "languages must name at least one language".into(),
            ));
        }
        Ok(Self(out))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Highest-priority language.
    pub fn primary(&self) -> &str {
        &self.0[0]
    }
}

impl TryFrom<Vec<String>> for Languages {
    type Error = String;

    fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
        Languages::new(v).map_err(|e| e.to_string())
    }
}

impl From<Languages> for Vec<String> {
    fn from(l: Languages) -> Self {
        l.0
    }
}

impl fmt::Display for Languages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

// ── OutputFormat ─────────────────────────────────────────────────────────

/// Serialisation target for the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// GitHub-flavoured Markdown (default).
    #[default]
    Markdown,
    /// The block tree and metadata as JSON.
    Json,
    /// Minimal semantic HTML.
    Html,
}

impl OutputFormat {
    /// File extension (without dot) for persisted output.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Html => "html",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Doc2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            other => Err(Doc2MdError::InvalidOptions(format!(
                "unsupported output_format '{other}' (expected markdown, json or html)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Html => "html",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let o = ConversionOptions::default();
        assert_eq!(o.output_format(), OutputFormat::Markdown);
        assert_eq!(o.batch_multiplier(), 2);
        assert_eq!(o.languages().as_slice(), ["en"]);
        assert_eq!(ConversionOptions::builder().build().unwrap(), o);
    }

    #[test]
    fn json_with_single_language_string() {
        let o = ConversionOptions::from_json_str(
            r#"{"output_format":"markdown","batch_multiplier":2,"languages":"en"}"#,
        )
        .unwrap();
        assert_eq!(o.languages().as_slice(), ["en"]);
    }

    #[test]
    fn json_with_language_list_dedups() {
        let o = ConversionOptions::from_json_str(
            r#"{"output_format":"html","batch_multiplier":4,"languages":["en","DE","en"]}"#,
        )
        .unwrap();
        assert_eq!(o.output_format(), OutputFormat::Html);
        assert_eq!(o.languages().as_slice(), ["en", "de"]);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = ConversionOptions::from_json_str(
            r#"{"output_format":"markdown","batch_multiplier":2,"languages":"en","force_ocr":true}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Doc2MdError::InvalidOptions(_)));
        assert!(err.to_string().contains("force_ocr"), "got: {err}");
    }

    #[test]
    fn missing_key_is_rejected() {
        let err =
            ConversionOptions::from_json_str(r#"{"output_format":"markdown","languages":"en"}"#)
                .unwrap_err();
        assert!(err.to_string().contains("batch_multiplier"), "got: {err}");
    }

    #[test]
    fn zero_and_negative_batch_multiplier_rejected() {
        for bad in [0i64, -1, 65] {
            let err = ConversionOptions::builder()
                .batch_multiplier(bad)
                .build()
                .unwrap_err();
            assert!(matches!(err, Doc2MdError::InvalidOptions(_)), "{bad}");
        }
        let err = ConversionOptions::from_json_str(
            r#"{"output_format":"markdown","batch_multiplier":-3,"languages":"en"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("batch_multiplier"), "got: {err}");
    }

    #[test]
    fn bad_language_codes_rejected() {
        assert!(ConversionOptions::builder()
            .languages(Vec::<String>::new())
            .build()
            .is_err());
        assert!(ConversionOptions::builder()
            .languages(["english"])
            .build()
            .is_err());
        assert!(ConversionOptions::builder()
            .languages(["e1"])
            .build()
            .is_err());
    }

    #[test]
    fn unsupported_format_rejected() {
        let err = ConversionOptions::from_json_str(
            r#"{"output_format":"docx","batch_multiplier":1,"languages":"en"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Doc2MdError::InvalidOptions(_)));
        assert!("docx".parse::<OutputFormat>().is_err());
        assert_eq!(
            "MD".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
    }

    #[test]
    fn serialises_back_to_recognised_keys() {
        let o = ConversionOptions::default();
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"output_format":"markdown","batch_multiplier":2,"languages":["en"]})
        );
        assert_eq!(ConversionOptions::from_json_value(v).unwrap(), o);
    }

    #[test]
    fn to_builder_overrides_one_key() {
        let o = ConversionOptions::default()
            .to_builder()
            .batch_multiplier(8)
            .build()
            .unwrap();
        assert_eq!(o.batch_multiplier(), 8);
        assert_eq!(o.languages().primary(), "en");
    }

    #[test]
    fn split_language_list_trims() {
        assert_eq!(split_language_list(" en, de ,,fr"), ["en", "de", "fr"]);
    }
}
