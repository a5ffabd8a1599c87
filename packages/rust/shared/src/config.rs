//! Application configuration for docoutline.
//!
//! User config lives at `~/.docoutline/docoutline.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OutlineError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docoutline.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docoutline";

// ---------------------------------------------------------------------------
// Config structs (matching docoutline.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Enrichment settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Anchor matching and content slicing.
    #[serde(default)]
    pub content: ContentConfig,

    /// TOC correction.
    #[serde(default)]
    pub toc: TocConfig,

    /// External bridge used for analysis and title mapping.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of nodes analyzed concurrently.
    #[serde(default = "default_llm_concurrency")]
    pub llm_concurrency: usize,

    /// Maximum characters of node text sent to the analyzer.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_concurrency: default_llm_concurrency(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_llm_concurrency() -> usize {
    2
}
fn default_max_chars() -> usize {
    3000
}

/// Text similarity scorer used for anchor matching and retitling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    /// Normalized Levenshtein edit distance.
    #[default]
    Levenshtein,
    /// Longest-common-subsequence ratio (`2 * lcs / (len_a + len_b)`).
    SequenceRatio,
}

/// `[content]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Minimum similarity for a block to anchor a node title.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Number of blocks scanned forward from the cursor per title.
    #[serde(default = "default_window")]
    pub window: usize,

    #[serde(default)]
    pub similarity: SimilarityKind,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            window: default_window(),
            similarity: SimilarityKind::default(),
        }
    }
}

fn default_threshold() -> f64 {
    0.8
}
fn default_window() -> usize {
    1000
}

/// TOC reconciliation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMode {
    /// Overwrite titles of the best-matching same-level nodes.
    #[default]
    Retitle,
    /// Discard the built tree and rebuild it from the TOC items.
    #[serde(alias = "patcher")]
    Rebuild,
    /// Ask the external mapping capability for title corrections.
    #[serde(alias = "llm")]
    Delegated,
}

impl std::str::FromStr for AlignMode {
    type Err = OutlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retitle" => Ok(Self::Retitle),
            "rebuild" | "patcher" => Ok(Self::Rebuild),
            "delegated" | "llm" => Ok(Self::Delegated),
            other => Err(OutlineError::config(format!(
                "unknown align mode '{other}': expected retitle, rebuild, or delegated"
            ))),
        }
    }
}

/// `[toc]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocConfig {
    /// Whether TOC correction runs at all.
    #[serde(default = "default_true")]
    pub enable: bool,

    #[serde(default)]
    pub align_mode: AlignMode,

    /// Similarity threshold for retitling and TOC rebuild anchoring.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Maximum number of candidate TOC pages handed to the extractor.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            enable: true,
            align_mode: AlignMode::default(),
            min_similarity: default_min_similarity(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_min_similarity() -> f64 {
    0.6
}
fn default_max_pages() -> usize {
    20
}

/// `[bridge]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Program spawned per request (e.g. `python3`). Unset disables the bridge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the subprocess.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.llm_concurrency == 0 {
            return Err(OutlineError::config("pipeline.llm_concurrency must be at least 1"));
        }
        if self.content.window == 0 {
            return Err(OutlineError::config("content.window must be at least 1"));
        }
        for (name, value) in [
            ("content.threshold", self.content.threshold),
            ("toc.min_similarity", self.toc.min_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OutlineError::config(format!(
                    "{name} must be within 0.0..=1.0 (got {value})"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docoutline/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OutlineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docoutline/docoutline.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OutlineError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        OutlineError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    write_default_config(&dir)
}

/// Write a default config file into `dir`, creating it if needed.
pub fn write_default_config(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| OutlineError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OutlineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OutlineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("llm_concurrency"));
        assert!(toml_str.contains("align_mode = \"retitle\""));
        assert!(toml_str.contains("similarity = \"levenshtein\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.llm_concurrency, 2);
        assert_eq!(parsed.content.window, 1000);
        assert!((parsed.content.threshold - 0.8).abs() < f64::EPSILON);
        assert!((parsed.toc.min_similarity - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[toc]
align_mode = "rebuild"

[bridge]
command = "python3"
args = ["bridge.py"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.toc.align_mode, AlignMode::Rebuild);
        assert!(config.toc.enable);
        assert_eq!(config.bridge.command.as_deref(), Some("python3"));
        assert_eq!(config.bridge.args, vec!["bridge.py"]);
        assert_eq!(config.pipeline.max_chars, 3000);
    }

    #[test]
    fn align_mode_parses_aliases() {
        assert_eq!("retitle".parse::<AlignMode>().unwrap(), AlignMode::Retitle);
        assert_eq!("patcher".parse::<AlignMode>().unwrap(), AlignMode::Rebuild);
        assert_eq!("llm".parse::<AlignMode>().unwrap(), AlignMode::Delegated);
        assert!("fuzzy".parse::<AlignMode>().is_err());
    }

    #[test]
    fn config_file_accepts_legacy_align_modes() {
        let config: AppConfig = toml::from_str("[toc]\nalign_mode = \"patcher\"\n").expect("parse");
        assert_eq!(config.toc.align_mode, AlignMode::Rebuild);

        let config: AppConfig = toml::from_str("[toc]\nalign_mode = \"llm\"\n").expect("parse");
        assert_eq!(config.toc.align_mode, AlignMode::Delegated);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.pipeline.llm_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.content.threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("content.threshold"));
    }

    #[test]
    fn write_and_load_default_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_default_config(dir.path()).expect("write config");
        let loaded = load_config_from(&path).expect("load config");
        assert_eq!(loaded.toc.max_pages, 20);
        assert!(loaded.bridge.command.is_none());
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docoutline.toml");
        std::fs::write(&path, "[content\nthreshold = ").expect("write");
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
