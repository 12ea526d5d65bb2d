//! Engine configuration.
//!
//! [`EngineConfig::load`] layers an optional TOML file and `FACETDASH_*`
//! environment variables on top of the embedded defaults.
//! [`EngineConfig::defaults`] returns the defaults alone (useful in tests).

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[backend]
base_url  = "http://127.0.0.1:8080"
page_size = 500
max_pages = 200

[display]
page_size = 25
facets    = ["services", "content_types", "infrastructure", "regions", "countries", "size_band"]
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// `[backend]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Rows requested per page by the aggregate fetcher.
    #[serde(default = "default_fetch_page_size")]
    pub page_size: usize,
    /// Hard ceiling on pages per aggregate run. Reaching it truncates the
    /// aggregate; it is a guard against a misbehaving backend, not a
    /// correctness guarantee.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_base_url() -> String { "http://127.0.0.1:8080".to_string() }
fn default_fetch_page_size() -> usize { 500 }
fn default_max_pages() -> usize { 200 }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_fetch_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// `[display]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_page_size")]
    pub page_size: usize,
    #[serde(default = "default_facets")]
    pub facets: Vec<String>,
}

fn default_display_page_size() -> usize { 25 }
fn default_facets() -> Vec<String> {
    ["services", "content_types", "infrastructure", "regions", "countries", "size_band"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            page_size: default_display_page_size(),
            facets: default_facets(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl EngineConfig {
    /// Defaults, then `path` if given and present, then `FACETDASH_*`
    /// variables (`FACETDASH_BACKEND__PAGE_SIZE=100`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let cfg: EngineConfig = builder
            .add_source(
                config::Environment::with_prefix("FACETDASH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        cfg.validated()
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    fn validated(self) -> Result<Self, config::ConfigError> {
        if self.backend.page_size == 0 {
            return Err(config::ConfigError::Message(
                "backend.page_size must be at least 1".to_string(),
            ));
        }
        if self.backend.max_pages == 0 {
            return Err(config::ConfigError::Message(
                "backend.max_pages must be at least 1".to_string(),
            ));
        }
        if self.display.page_size == 0 {
            return Err(config::ConfigError::Message(
                "display.page_size must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
