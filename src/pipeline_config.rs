//! Pipeline configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Loaded from JSON and validated before the pipeline is built.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config is not valid JSON: {0}")]
    Parse(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// How a temperature reading without an explicit unit is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnitPolicy {
    /// Below the threshold is Celsius unless the line says Fahrenheit.
    #[default]
    InferBelowThreshold,
    /// Below the threshold AND a Celsius marker on the label or value line.
    RequireCelsiusMarker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    pub policy: TemperatureUnitPolicy,
    /// Values at or above this are taken as Fahrenheit.
    pub celsius_threshold: f64,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            policy: TemperatureUnitPolicy::default(),
            celsius_threshold: 60.0,
        }
    }
}

/// Image preprocessing stage parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Longest side in pixels before processing; larger images are downscaled.
    pub max_dimension: u32,
    /// Bilateral filter window (pixels).
    pub denoise_window: u32,
    pub denoise_sigma_color: f32,
    pub denoise_sigma_spatial: f32,
    /// Tiles per side for local contrast equalization.
    pub contrast_tiles: u32,
    /// Histogram clip limit, as a multiple of the mean bin height.
    pub contrast_clip_limit: f32,
    /// Adaptive threshold neighbourhood radius.
    pub threshold_block_radius: u32,
    /// Laplacian variance under this flags the image as blurry.
    pub blur_threshold: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2000,
            denoise_window: 5,
            denoise_sigma_color: 25.0,
            denoise_sigma_spatial: 3.0,
            contrast_tiles: 8,
            contrast_clip_limit: 2.0,
            threshold_block_radius: 15,
            blur_threshold: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleProvider {
    /// OpenAI-compatible `/chat/completions` (Groq, OpenAI, vLLM, ...).
    #[default]
    ChatCompletions,
    /// Local Ollama `/api/generate`.
    Ollama,
}

/// Optional LLM summarization step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::ChatCompletions,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: Some("GROQ_API_KEY".to_string()),
            timeout_secs: 60,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// OCR lines under this confidence are dropped before field scanning.
    pub min_confidence: f32,
    /// Below this many characters the secondary PDF backend is tried.
    pub pdf_structured_min_chars: usize,
    /// Below this many characters scanned-page OCR is tried.
    pub pdf_ocr_trigger_chars: usize,
    /// Pages rasterized for OCR, from the first.
    pub pdf_ocr_max_pages: usize,
    /// OCR pages with fewer characters are skipped.
    pub pdf_ocr_min_page_chars: usize,
    pub render_dpi: u32,
    /// Fewer non-whitespace characters than this is "no readable text".
    pub min_readable_chars: usize,
    pub temperature: TemperatureConfig,
    pub preprocess: PreprocessConfig,
    pub oracle: Option<OracleConfig>,
    /// JSON reference table replacing the built-in one.
    pub reference_table: Option<std::path::PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.45,
            pdf_structured_min_chars: 100,
            pdf_ocr_trigger_chars: 50,
            pdf_ocr_max_pages: 3,
            pdf_ocr_min_page_chars: 20,
            render_dpi: 144,
            min_readable_chars: 3,
            temperature: TemperatureConfig::default(),
            preprocess: PreprocessConfig::default(),
            oracle: None,
            reference_table: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.pdf_ocr_max_pages == 0 {
            return Err(ConfigError::Invalid("pdf_ocr_max_pages must be at least 1".into()));
        }
        if self.render_dpi == 0 || self.render_dpi > 600 {
            return Err(ConfigError::Invalid(format!(
                "render_dpi must be within 1..=600, got {}",
                self.render_dpi
            )));
        }
        let threshold = self.temperature.celsius_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "temperature.celsius_threshold must be positive, got {threshold}"
            )));
        }
        let p = &self.preprocess;
        if p.max_dimension < 32 {
            return Err(ConfigError::Invalid("preprocess.max_dimension must be at least 32".into()));
        }
        if p.contrast_tiles == 0 || p.threshold_block_radius == 0 {
            return Err(ConfigError::Invalid(
                "preprocess.contrast_tiles and threshold_block_radius must be positive".into(),
            ));
        }
        if let Some(oracle) = &self.oracle {
            if oracle.base_url.trim().is_empty() || oracle.model.trim().is_empty() {
                return Err(ConfigError::Invalid("oracle.base_url and oracle.model are required".into()));
            }
            if oracle.timeout_secs == 0 {
                return Err(ConfigError::Invalid("oracle.timeout_secs must be positive".into()));
            }
        }
        Ok(())
    }
}
