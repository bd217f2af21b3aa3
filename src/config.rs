//! toolscout configuration from config.toml.
//!
//! Every field has a serde default so a partial (or missing) file is valid.
//! CLI flags are applied on top of the loaded values in `main.rs`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::search::FusionWeights;

/// Root configuration.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ToolscoutConfig {
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
}

/// How the tool surface is populated at startup.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadingMode {
    /// Every toolset of the preset is loaded up front.
    Static,
    /// Only the initial toolsets are loaded; the agent loads the rest on demand.
    #[default]
    Dynamic,
}

impl LoadingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadingMode::Static => "static",
            LoadingMode::Dynamic => "dynamic",
        }
    }
}

impl std::str::FromStr for LoadingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(LoadingMode::Static),
            "dynamic" => Ok(LoadingMode::Dynamic),
            other => Err(format!("unknown loading mode '{other}' (expected static|dynamic)")),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderConfig {
    #[serde(default)]
    pub mode: LoadingMode,
    /// Preset used in static mode (`full`, `default`, `lite`)
    #[serde(default = "default_static_preset")]
    pub preset: String,
    /// Toolsets loaded at startup in dynamic mode. Empty means the `lite` preset.
    #[serde(default)]
    pub initial_toolsets: Vec<String>,
}

fn default_static_preset() -> String {
    "full".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mode: LoadingMode::default(),
            preset: default_static_preset(),
            initial_toolsets: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default)]
    pub fusion: FusionWeights,
}

fn default_limit() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            fusion: FusionWeights::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    /// Upper bound for a single external tool handler
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Whether `discover_tools` honours `compact=true`
    #[serde(default = "default_true")]
    pub compact: bool,
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            compact: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Try to start the neural embedding provider (requires the `embeddings` feature)
    #[serde(default)]
    pub enabled: bool,
    /// Embedding model name (fastembed model enum variant)
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Cache directory for model files
    #[serde(default)]
    pub cache_dir: Option<String>,
}

fn default_embedding_model() -> String {
    "BGESmallENV15".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_embedding_model(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HarnessConfig {
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default = "default_harness_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// SQLite file for comparison results. Defaults to ~/.toolscout/compare.sqlite
    #[serde(default)]
    pub store: Option<String>,
}

fn default_rounds() -> usize {
    3
}

fn default_harness_call_timeout_secs() -> u64 {
    5
}

fn default_ready_timeout_secs() -> u64 {
    15
}

fn default_grace_secs() -> u64 {
    3
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            call_timeout_secs: default_harness_call_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            grace_secs: default_grace_secs(),
            store: None,
        }
    }
}

/// Global state directory (~/.toolscout/).
pub fn toolscout_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".toolscout")
}

/// Load configuration from `path`, or from `~/.toolscout/config.toml` when no
/// path is given. Missing or unreadable files fall back to defaults.
pub fn load_config(path: Option<&Path>) -> ToolscoutConfig {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => toolscout_home().join("config.toml"),
    };
    if !config_path.exists() {
        return ToolscoutConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", config_path.display(), e);
            ToolscoutConfig::default()
        }),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", config_path.display(), e);
            ToolscoutConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ToolscoutConfig = toml::from_str(
            r#"
            [loader]
            mode = "static"

            [search.fusion]
            rrf_k = 30.0
            "#,
        )
        .unwrap();

        assert_eq!(config.loader.mode, LoadingMode::Static);
        assert_eq!(config.loader.preset, "full");
        assert_eq!(config.search.default_limit, 10);
        assert!((config.search.fusion.rrf_k - 30.0).abs() < f64::EPSILON);
        assert!((config.search.fusion.keyword - FusionWeights::default().keyword).abs() < f64::EPSILON);
        assert_eq!(config.dispatch.call_timeout_secs, 30);
        assert!(config.dispatch.compact);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml")));
        assert_eq!(config.loader.mode, LoadingMode::Dynamic);
        assert_eq!(config.harness.rounds, 3);
    }

    #[test]
    fn test_loading_mode_parse() {
        assert_eq!("STATIC".parse::<LoadingMode>().unwrap(), LoadingMode::Static);
        assert!("lazy".parse::<LoadingMode>().is_err());
    }
}
