//! Result extraction and persistence.
//!
//! [`extract`] flattens a [`RenderedDocument`] into text plus its metadata and
//! images; [`persist`] writes only the text, atomically: the bytes go to
//! `<name>.<ext>.tmp` in the destination directory first and are renamed
//! over the final file, so a reader never sees a half-written output and the
//! last successful run wins.

use crate::document::{ImageAsset, RenderMetadata, RenderedDocument};
use crate::error::Doc2MdError;
use crate::options::OutputFormat;
use crate::renderer;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Flattened conversion result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArtifact {
    pub format: OutputFormat,
    pub text: String,
    pub metadata: RenderMetadata,
    pub images: BTreeMap<String, ImageAsset>,
}

/// Render `rendered` in its own format.
pub fn extract(rendered: &RenderedDocument) -> Result<ExtractedArtifact, Doc2MdError> {
    let text = renderer::render(&rendered.document, &rendered.metadata, rendered.format)
        .map_err(|e| Doc2MdError::Internal(format!("cannot serialise document: {e}")))?;
    debug!(
        "Extracted {} bytes of {:?} and {} images",
        text.len(),
        rendered.format,
        rendered.document.images.len()
    );
    Ok(ExtractedArtifact {
        format: rendered.format,
        text,
        metadata: rendered.metadata.clone(),
        images: rendered.document.images.clone(),
    })
}

/// `<dir>/<input stem>.<format extension>`.
pub fn output_path(dir: &Path, input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    dir.join(format!("{stem}.{}", format.extension()))
}

/// Write `text` to [`output_path`], creating `dir` as needed.
pub fn persist(
    text: &str,
    dir: &Path,
    input: &Path,
    format: OutputFormat,
) -> Result<PathBuf, Doc2MdError> {
    let dest = output_path(dir, input, format);
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| Doc2MdError::OutputWriteFailed { path, source }
    };

    std::fs::create_dir_all(dir).map_err(write_err(dir))?;

    let mut tmp = dest.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = std::fs::write(&tmp, text.as_bytes()) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(&dest)(e));
    }
    if let Err(e) = std::fs::rename(&tmp, &dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(&dest)(e));
    }

    info!("Wrote {} ({} bytes)", dest.display(), text.len());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use std::fs;

    #[test]
    fn output_path_replaces_extension() {
        let dir = Path::new("out");
        assert_eq!(
            output_path(dir, Path::new("./book.pdf"), OutputFormat::Markdown),
            PathBuf::from("out/book.md")
        );
        assert_eq!(
            output_path(dir, Path::new("/data/report.v2.pdf"), OutputFormat::Json),
            PathBuf::from("out/report.v2.json")
        );
        assert_eq!(
            output_path(dir, Path::new("scan"), OutputFormat::Html),
            PathBuf::from("out/scan.html")
        );
    }

    #[test]
    fn persist_creates_directory_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/out");
        let input = Path::new("book.pdf");

        let first = persist("# One\n", &dir, input, OutputFormat::Markdown).unwrap();
        let second = persist("# Two\n", &dir, input, OutputFormat::Markdown).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&second).unwrap(), "# Two\n");

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["book.md".to_string()]);
    }

    #[test]
    fn persist_into_a_file_path_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("out");
        fs::write(&blocker, b"not a directory").unwrap();
        let err =
            persist("x", &blocker, Path::new("book.pdf"), OutputFormat::Markdown).unwrap_err();
        assert!(matches!(err, Doc2MdError::OutputWriteFailed { .. }));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn extract_renders_in_document_format() {
        let rendered = RenderedDocument {
            format: OutputFormat::Json,
            document: Document::default(),
            metadata: RenderMetadata::default(),
        };
        let artifact = extract(&rendered).unwrap();
        assert_eq!(artifact.format, OutputFormat::Json);
        assert!(artifact.text.trim_start().starts_with('{'));
        assert!(artifact.images.is_empty());
    }
}
