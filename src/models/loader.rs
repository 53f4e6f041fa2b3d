//! Built-in model loader.
//!
//! Binds pdfium, instantiates one model per role and hands the set to
//! [`ModelRegistry::builder`], which places every model and refuses to build
//! an incomplete registry.

use super::layout::LineLayoutModel;
use super::ocr::{TextLayerRecognizer, VisionRecognizer, DEFAULT_VISION_MODEL};
use super::order::XyCutOrder;
use super::source::{PdfiumSource, DEFAULT_RENDER_PIXELS};
use super::table::GridTableRecognizer;
use super::{ModelLoader, ModelRegistry, ModelRole};
use crate::device::ComputeDevice;
use crate::error::Doc2MdError;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Which recognizer fills the `ocr` role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrEngine {
    /// Text layer only; no network access.
    #[default]
    TextLayer,
    /// Vision LLM through `edgequake-llm`.
    Vision,
}

impl FromStr for OcrEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text-layer" | "text_layer" | "none" => Ok(OcrEngine::TextLayer),
            "vision" | "vlm" => Ok(OcrEngine::Vision),
            other => Err(format!(
                "unknown OCR engine '{other}' (expected text-layer or vision)"
            )),
        }
    }
}

impl fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrEngine::TextLayer => f.write_str("text-layer"),
            OcrEngine::Vision => f.write_str("vision"),
        }
    }
}

/// Settings of the [`BuiltinModelLoader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Directory containing the pdfium shared library. `None` tries the
    /// working directory, then the system library path.
    pub pdfium_library: Option<PathBuf>,
    pub ocr_engine: OcrEngine,
    /// Vision model id, e.g. `gpt-4.1-nano`.
    pub vision_model: Option<String>,
    /// Vision provider name, e.g. `openai`, `anthropic`, `ollama`.
    pub vision_provider: Option<String>,
    /// Longest edge of page rasters, in pixels.
    pub render_max_pixels: u32,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            pdfium_library: None,
            ocr_engine: OcrEngine::TextLayer,
            vision_model: None,
            vision_provider: None,
            render_max_pixels: DEFAULT_RENDER_PIXELS,
        }
    }
}

/// Loads the models shipped with this crate.
#[derive(Debug, Clone, Default)]
pub struct BuiltinModelLoader {
    settings: LoaderSettings,
}

impl BuiltinModelLoader {
    pub fn new(settings: LoaderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Resolve the vision provider, from most to least specific:
    /// named provider, `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
    /// `OPENAI_API_KEY`, then full auto-detection.
    fn resolve_provider(&self) -> Result<(Arc<dyn LLMProvider>, String), Doc2MdError> {
        let model = self.settings.vision_model.as_deref();

        if let Some(ref name) = self.settings.vision_provider {
            let model = model.unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider(name, model);
        }

        if let (Ok(prov), Ok(env_model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !env_model.is_empty() {
                return create_vision_provider(&prov, &env_model);
            }
        }

        if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
            return create_vision_provider("openai", model.unwrap_or(DEFAULT_VISION_MODEL));
        }

        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| Doc2MdError::ModelLoadFailure {
                role: ModelRole::Ocr,
                reason: format!(
                    "no vision provider could be detected from the environment \
                     (set OPENAI_API_KEY, ANTHROPIC_API_KEY or --vision-provider): {e}"
                ),
            })?;
        Ok((provider, model.unwrap_or("auto").to_string()))
    }
}

fn create_vision_provider(
    provider: &str,
    model: &str,
) -> Result<(Arc<dyn LLMProvider>, String), Doc2MdError> {
    let llm = ProviderFactory::create_llm_provider(provider, model).map_err(|e| {
        Doc2MdError::ModelLoadFailure {
            role: ModelRole::Ocr,
            reason: format!("vision provider '{provider}': {e}"),
        }
    })?;
    Ok((llm, model.to_string()))
}

impl ModelLoader for BuiltinModelLoader {
    fn load(&self, device: ComputeDevice) -> Result<ModelRegistry, Doc2MdError> {
        info!("Loading models (requested device: {})", device);

        let source = PdfiumSource::bind(self.settings.pdfium_library.as_deref())
            .map_err(|e| Doc2MdError::ModelLoadFailure {
                role: ModelRole::Layout,
                reason: format!("cannot bind the pdfium library: {e}"),
            })?
            .with_render_pixels(self.settings.render_max_pixels);

        let builder = ModelRegistry::builder(device)
            .source(source)
            .layout(LineLayoutModel::default())
            .table(GridTableRecognizer::default())
            .order(XyCutOrder::default());

        let builder = match self.settings.ocr_engine {
            OcrEngine::TextLayer => builder.ocr(TextLayerRecognizer),
            OcrEngine::Vision => {
                let (provider, model) = self.resolve_provider()?;
                info!("Vision OCR model: {}", model);
                builder.ocr(VisionRecognizer::new(provider, model))
            }
        };

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_engine_parses_cli_names() {
        assert_eq!(
            "text-layer".parse::<OcrEngine>().unwrap(),
            OcrEngine::TextLayer
        );
        assert_eq!("Vision".parse::<OcrEngine>().unwrap(), OcrEngine::Vision);
        assert!("tesseract".parse::<OcrEngine>().is_err());
        assert_eq!(OcrEngine::Vision.to_string(), "vision");
    }

    #[test]
    fn default_settings_stay_offline() {
        let s = LoaderSettings::default();
        assert_eq!(s.ocr_engine, OcrEngine::TextLayer);
        assert_eq!(s.render_max_pixels, DEFAULT_RENDER_PIXELS);
        assert!(s.pdfium_library.is_none());
    }

    #[test]
    fn missing_pdfium_is_a_load_failure() {
        let loader = BuiltinModelLoader::new(LoaderSettings {
            pdfium_library: Some(PathBuf::from("/nonexistent/pdfium-dir")),
            ..Default::default()
        });
        let err = loader.load(ComputeDevice::Cpu).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("pdfium"), "got: {err}");
    }
}
