//! Configuration handling for Blocksmith
//!
//! Parses and manages blocksmith.toml configuration files. The file is
//! optional: a missing default config falls back to the built-in layout.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use schema::*;

/// Name of the config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "blocksmith.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source, staging and output directories
    #[serde(default)]
    pub paths: PathsConfig,

    /// Output tree layout
    #[serde(default)]
    pub output: OutputConfig,

    /// Style pipeline options
    #[serde(default)]
    pub styles: StylesConfig,

    /// Script pipeline options
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Development server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let canonical_path = absolute(path.as_ref())?;

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", canonical_path.display()))?;

        // Set root directory to the directory containing the config file
        config.root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        config.validate()?;

        Ok(config)
    }

    /// Load the config file if it exists, otherwise use the defaults rooted
    /// next to where the file would have been.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = absolute(path.as_ref())?;
        if path.exists() {
            return Self::load(&path);
        }

        debug!("No config at {}, using defaults", path.display());
        let root = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::with_root(root))
    }

    /// Default configuration rooted at `root`
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.scripts.min_suffix.is_empty() {
            anyhow::bail!("[scripts] min_suffix must not be empty");
        }

        let sources = [
            ("pages", self.pages_dir()),
            ("styles", self.styles_dir()),
            ("scripts", self.scripts_dir()),
            ("images", self.images_dir()),
            ("assets", self.assets_dir()),
            ("components", self.components_dir()),
        ];
        for (target, dir) in [("output", self.output_dir()), ("staging", self.staging_dir())] {
            for (name, source) in &sources {
                if source.starts_with(&dir) || dir.starts_with(source) {
                    anyhow::bail!(
                        "The {} directory {} overlaps the {} source directory {}",
                        target,
                        dir.display(),
                        name,
                        source.display()
                    );
                }
            }
        }

        let output = self.output_dir();
        let staging = self.staging_dir();
        if output.starts_with(&staging) || staging.starts_with(&output) {
            anyhow::bail!("Staging and output directories must not overlap");
        }

        Ok(())
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join(&self.paths.pages)
    }

    pub fn styles_dir(&self) -> PathBuf {
        self.root.join(&self.paths.styles)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(&self.paths.scripts)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(&self.paths.images)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(&self.paths.assets)
    }

    pub fn components_dir(&self) -> PathBuf {
        self.root.join(&self.paths.components)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(&self.paths.staging)
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.paths.output)
    }

    pub fn css_output_dir(&self) -> PathBuf {
        self.output_dir().join(&self.output.css)
    }

    pub fn js_output_dir(&self) -> PathBuf {
        self.output_dir().join(&self.output.js)
    }

    pub fn img_output_dir(&self) -> PathBuf {
        self.output_dir().join(&self.output.img)
    }

    pub fn fonts_output_dir(&self) -> PathBuf {
        self.output_dir().join(&self.output.fonts)
    }

    /// Path of `path` relative to the project root, with `/` separators
    pub fn relative_to_root(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(crate::utils::path_to_slash)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
