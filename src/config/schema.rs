//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Source, staging and output directories, relative to the project root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Page templates
    #[serde(default = "default_pages")]
    pub pages: String,

    /// Global stylesheets
    #[serde(default = "default_styles")]
    pub styles: String,

    /// Global scripts
    #[serde(default = "default_scripts")]
    pub scripts: String,

    /// Images copied verbatim
    #[serde(default = "default_images")]
    pub images: String,

    /// Pre-built css/js/font assets copied verbatim
    #[serde(default = "default_assets")]
    pub assets: String,

    /// Component blocks holding style, script, data and template fragments
    #[serde(default = "default_components")]
    pub components: String,

    /// Staging area for merged artifacts
    #[serde(default = "default_staging")]
    pub staging: String,

    /// Output tree
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pages: default_pages(),
            styles: default_styles(),
            scripts: default_scripts(),
            images: default_images(),
            assets: default_assets(),
            components: default_components(),
            staging: default_staging(),
            output: default_output(),
        }
    }
}

fn default_pages() -> String {
    "src/pages".to_string()
}

fn default_styles() -> String {
    "src/static/styles".to_string()
}

fn default_scripts() -> String {
    "src/static/scripts".to_string()
}

fn default_images() -> String {
    "src/static/images".to_string()
}

fn default_assets() -> String {
    "src/static/assets".to_string()
}

fn default_components() -> String {
    "src/components".to_string()
}

fn default_staging() -> String {
    "tmp".to_string()
}

fn default_output() -> String {
    "dest".to_string()
}

/// Layout of the output tree, relative to the output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_css_dir")]
    pub css: String,

    #[serde(default = "default_js_dir")]
    pub js: String,

    #[serde(default = "default_img_dir")]
    pub img: String,

    #[serde(default = "default_fonts_dir")]
    pub fonts: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            css: default_css_dir(),
            js: default_js_dir(),
            img: default_img_dir(),
            fonts: default_fonts_dir(),
        }
    }
}

fn default_css_dir() -> String {
    "assets/css".to_string()
}

fn default_js_dir() -> String {
    "assets/js".to_string()
}

fn default_img_dir() -> String {
    "assets/img".to_string()
}

fn default_fonts_dir() -> String {
    "assets/fonts".to_string()
}

/// Style pipeline options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Also emit a minified `.min.css` sibling for every compiled stylesheet
    #[serde(default)]
    pub minify: bool,
}

/// Script pipeline options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Suffix inserted before the extension of minified bundles
    #[serde(default = "default_min_suffix")]
    pub min_suffix: String,

    /// Emit the merged component scripts as `modules.js` in the output tree
    #[serde(default)]
    pub emit_modules: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            min_suffix: default_min_suffix(),
            emit_modules: false,
        }
    }
}

fn default_min_suffix() -> String {
    ".min".to_string()
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to run dev server on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Open browser automatically
    #[serde(default)]
    pub open: bool,

    /// Inject the live-reload client and broadcast rebuilds
    #[serde(default = "default_true")]
    pub live_reload: bool,

    /// Debounce window for file system events, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            open: false,
            live_reload: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    100
}
