//! Runtime configuration.
//!
//! All settings live in an explicit [`DreamscapeConfig`] handed to the
//! pipeline at construction. Nothing reads the environment after that.

use std::path::PathBuf;
use std::time::Duration;

/// File holding the dream history inside the data directory.
pub const DREAMS_FILE: &str = "dreams.json";

/// File holding the last computed graph inside the data directory.
pub const GRAPH_FILE: &str = "cooccurrences.json";

/// Environment variables checked, in order, for the extraction API key.
pub const API_KEY_VARS: [&str; 3] = ["AI_KEY", "OPENAI_API_KEY", "GENAI_API_KEY"];

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOG_LEVEL: &str = "info";

/// Settings for the language-model extraction strategy.
#[derive(Clone)]
pub struct ExtractionConfig {
    /// API key for the completion service. `None` selects the fallback extractor.
    pub api_key: Option<String>,

    /// Model name sent to the completion service.
    pub model: String,

    /// Upper bound on a single completion call.
    pub timeout: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configuration for a [`Dreamscape`](crate::Dreamscape) instance.
#[derive(Debug, Clone)]
pub struct DreamscapeConfig {
    /// Directory holding the dream history and graph files.
    pub data_dir: PathBuf,

    /// Extraction strategy settings.
    pub extraction: ExtractionConfig,

    /// Log filter directive used by front ends when installing a subscriber.
    pub log_level: String,
}

impl DreamscapeConfig {
    /// Create a config rooted at `data_dir` with no API key.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            extraction: ExtractionConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Recognized variables: the keys in [`API_KEY_VARS`],
    /// `DREAMSCAPE_DATA_DIR`, `DREAMSCAPE_MODEL`,
    /// `DREAMSCAPE_EXTRACTION_TIMEOUT_SECS` and `DREAMSCAPE_LOG`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(present("DREAMSCAPE_DATA_DIR").unwrap_or_else(|| ".".into()));

        config.extraction.api_key = API_KEY_VARS.iter().find_map(|&key| present(key));

        if let Some(model) = present("DREAMSCAPE_MODEL") {
            config.extraction.model = model;
        }

        if let Some(raw) = present("DREAMSCAPE_EXTRACTION_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.extraction.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %raw,
                    "ignoring invalid DREAMSCAPE_EXTRACTION_TIMEOUT_SECS"
                ),
            }
        }

        if let Some(level) = present("DREAMSCAPE_LOG") {
            config.log_level = level;
        }

        config
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the extraction API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.extraction.api_key = Some(api_key.into());
        self
    }

    /// Set the extraction model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.extraction.model = model.into();
        self
    }

    /// Set the extraction timeout.
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction.timeout = timeout;
        self
    }

    /// Set the log filter directive.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Path of the dream history file.
    pub fn dreams_path(&self) -> PathBuf {
        self.data_dir.join(DREAMS_FILE)
    }

    /// Path of the graph snapshot file.
    pub fn graph_path(&self) -> PathBuf {
        self.data_dir.join(GRAPH_FILE)
    }
}
