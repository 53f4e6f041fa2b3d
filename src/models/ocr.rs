//! Text recognition for regions without a text layer.
//!
//! * [`TextLayerRecognizer`]: the offline default. It never invents text, so
//!   a scanned page stays a picture in the output.
//! * [`VisionRecognizer`]: sends the page raster to a vision-capable LLM via
//!   `edgequake-llm` and turns the transcription into lines.

use super::{OcrRequest, TextRecognizer};
use crate::device::ComputeDevice;
use crate::document::{BBox, TextLine};
use crate::error::ModelError;
use crate::postprocess::strip_fences;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Recognizer that relies on the PDF text layer alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLayerRecognizer;

#[async_trait]
impl TextRecognizer for TextLayerRecognizer {
    fn name(&self) -> &str {
        "text-layer"
    }

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<Vec<TextLine>, ModelError> {
        debug!(
            "Page {}: no text layer and no OCR engine, region left unrecognised",
            request.page_index + 1
        );
        Ok(Vec::new())
    }
}

/// System prompt for transcription. `{languages}` is replaced per request.
pub const TRANSCRIBE_PROMPT: &str = r#"You are an OCR engine. Transcribe every piece of text visible in the image.

Rules:
- Reproduce the text exactly, in natural reading order
- Emit one output line per visual line of text
- Leave a blank line between paragraphs
- Expected languages: {languages}
- Output ONLY the transcribed text: no Markdown, no fences, no commentary"#;

pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// OCR through a vision LLM.
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.1,
            max_tokens: 4096,
        }
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n.max(1);
        self
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

fn system_prompt(languages: &[String]) -> String {
    TRANSCRIBE_PROMPT.replace("{languages}", &languages.join(", "))
}

/// Crop `image` to `region`, scaling points to pixels.
fn crop_region(
    image: &DynamicImage,
    page_width: f32,
    page_height: f32,
    region: BBox,
) -> DynamicImage {
    if page_width <= 0.0 || page_height <= 0.0 {
        return image.clone();
    }
    let sx = image.width() as f32 / page_width;
    let sy = image.height() as f32 / page_height;
    let x = (region.x0 * sx).max(0.0) as u32;
    let y = (region.y0 * sy).max(0.0) as u32;
    let w = ((region.width() * sx).ceil() as u32).min(image.width().saturating_sub(x));
    let h = ((region.height() * sy).ceil() as u32).min(image.height().saturating_sub(y));
    if x == 0 && y == 0 && w == image.width() && h == image.height() {
        return image.clone();
    }
    image.crop_imm(x, y, w.max(1), h.max(1))
}

/// Base64 PNG payload for the vision request.
fn encode_png(image: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded region → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Split a transcription into lines stacked evenly over `region`.
fn lines_in_region(text: &str, region: BBox) -> Vec<TextLine> {
    let rows: Vec<&str> = text.lines().map(str::trim_end).collect();
    let n = rows.len().max(1) as f32;
    let step = region.height() / n;
    rows.iter()
        .enumerate()
        .filter(|(_, t)| !t.trim().is_empty())
        .map(|(i, t)| {
            let y0 = region.y0 + step * i as f32;
            TextLine::new(t.trim(), BBox::new(region.x0, y0, region.x1, y0 + step))
        })
        .collect()
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    fn name(&self) -> &str {
        &self.model
    }

    /// Inference happens at the provider, so any local device is acceptable.
    fn supports(&self, _device: ComputeDevice) -> bool {
        true
    }

    fn needs_page_image(&self) -> bool {
        true
    }

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<Vec<TextLine>, ModelError> {
        let image = request.image.ok_or_else(|| ModelError::InvalidOutput {
            model: self.model.clone(),
            detail: "page raster missing".into(),
        })?;
        let start = Instant::now();
        let region = crop_region(
            image,
            request.page_width,
            request.page_height,
            request.region,
        );
        let payload = encode_png(&region)
            .map_err(|e| ModelError::inference(&self.model, format!("encode: {e}")))?;

        let messages = vec![
            ChatMessage::system(system_prompt(request.languages.as_slice())),
            ChatMessage::user_with_images("", vec![payload]),
        ];
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| ModelError::inference(&self.model, e.to_string()))?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            request.page_index + 1,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(lines_in_region(
            &strip_fences(&response.content),
            request.region,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConversionOptions;
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn text_layer_recognizer_returns_nothing() {
        let options = ConversionOptions::default();
        let lines = TextLayerRecognizer
            .recognize(OcrRequest {
                page_index: 0,
                page_width: 100.0,
                page_height: 100.0,
                region: BBox::new(0.0, 0.0, 100.0, 100.0),
                image: None,
                languages: options.languages(),
            })
            .await
            .unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn prompt_names_languages() {
        let p = system_prompt(&["en".to_string(), "de".to_string()]);
        assert!(p.contains("Expected languages: en, de"));
        assert!(!p.contains("{languages}"));
    }

    #[test]
    fn lines_are_stacked_over_region() {
        let lines = lines_in_region("first\n\nsecond  \nthird", BBox::new(0.0, 0.0, 100.0, 40.0));
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(lines[0].bbox, BBox::new(0.0, 0.0, 100.0, 10.0));
        assert_eq!(lines[2].bbox, BBox::new(0.0, 30.0, 100.0, 40.0));
    }

    #[test]
    fn crop_scales_points_to_pixels() {
        let img =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 400, Rgba([255, 255, 255, 255])));
        let full = crop_region(&img, 100.0, 200.0, BBox::new(0.0, 0.0, 100.0, 200.0));
        assert_eq!((full.width(), full.height()), (200, 400));
        let half = crop_region(&img, 100.0, 200.0, BBox::new(0.0, 100.0, 50.0, 200.0));
        assert_eq!((half.width(), half.height()), (100, 200));
    }

    #[test]
    fn encode_produces_png_payload() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_png(&img).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
    }
}
