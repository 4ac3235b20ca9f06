//! Build pipelines
//!
//! Every unit of work in a build is a [`Task`]. Tasks share a
//! [`BuildContext`] that owns the configuration, the live-reload channel and
//! the state that survives between runs in the same process (remembered
//! style fragments, copy indexes, script hashes, last merged artifacts).
//!
//! Compile and fragment errors are caught at the task boundary, logged and
//! recorded in the [`TaskReport`]; only file system failures escape as `Err`.

pub mod assets;
pub mod include;
pub mod minify;
pub mod pretty;
pub mod scripts;
pub mod styles;
pub mod templates;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::error;

use crate::aggregate::{MergedArtifact, MergedData, RememberedFragments};
use crate::config::Config;
use crate::server::LiveReload;

/// Identifier of every task the orchestrator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    AggregateStyles,
    CompileStyles,
    AggregateData,
    CompilePages,
    AggregateScripts,
    CompileScripts,
    CopyImages,
    CopyAssetsCss,
    CopyAssetsJs,
    CopyAssetsFonts,
}

impl TaskId {
    pub const ALL: [TaskId; 10] = [
        TaskId::AggregateStyles,
        TaskId::CompileStyles,
        TaskId::AggregateData,
        TaskId::CompilePages,
        TaskId::AggregateScripts,
        TaskId::CompileScripts,
        TaskId::CopyImages,
        TaskId::CopyAssetsCss,
        TaskId::CopyAssetsJs,
        TaskId::CopyAssetsFonts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskId::AggregateStyles => "aggregate-styles",
            TaskId::CompileStyles => "compile-styles",
            TaskId::AggregateData => "aggregate-data",
            TaskId::CompilePages => "compile-pages",
            TaskId::AggregateScripts => "aggregate-scripts",
            TaskId::CompileScripts => "compile-scripts",
            TaskId::CopyImages => "copy-images",
            TaskId::CopyAssetsCss => "copy-assets-css",
            TaskId::CopyAssetsJs => "copy-assets-js",
            TaskId::CopyAssetsFonts => "copy-assets-fonts",
        }
    }

    /// Tasks that must finish first when they run in the same invocation
    pub fn after(&self) -> &'static [TaskId] {
        match self {
            TaskId::CompileStyles => &[TaskId::AggregateStyles],
            TaskId::CompilePages => &[TaskId::AggregateData],
            TaskId::CompileScripts => &[TaskId::AggregateScripts],
            _ => &[],
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compile or fragment error, reported as `<name> in <plugin> <message>`
#[derive(Debug, Clone, Error)]
#[error("{name} in {plugin} {message}")]
pub struct PipelineError {
    /// Error class, e.g. `CompileError`
    pub name: String,

    /// Component that raised it, e.g. `scss`
    pub plugin: String,

    pub message: String,

    /// Offending source file, when known
    pub file: Option<PathBuf>,
}

impl PipelineError {
    pub fn new(
        name: impl Into<String>,
        plugin: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
            message: message.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// A file written to the output tree or staging area
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub size: usize,
}

/// What a task did
#[derive(Debug, Default)]
pub struct TaskReport {
    /// Files whose content changed on disk
    pub written: Vec<OutputFile>,

    /// Outputs regenerated with identical content, or sources skipped by an
    /// incremental filter
    pub unchanged: usize,

    /// Logged compile/fragment errors
    pub errors: Vec<PipelineError>,

    /// Every output path the task wrote or left in place
    pub outputs: Vec<PathBuf>,
}

impl TaskReport {
    /// Record the outcome of a [`crate::utils::write_if_changed`] call
    pub fn record_output(&mut self, path: &Path, size: usize, written: bool) {
        self.claim(path);
        if written {
            self.written.push(OutputFile {
                path: path.to_path_buf(),
                size,
            });
        } else {
            self.unchanged += 1;
        }
    }

    /// Note an output kept from an earlier run
    pub fn claim(&mut self, path: &Path) {
        self.outputs.push(path.to_path_buf());
    }

    /// Log an error to the console and keep it in the report
    pub fn record_error(&mut self, err: PipelineError) {
        match &err.file {
            Some(file) => error!("{} ({})", err, file.display()),
            None => error!("{}", err),
        }
        self.errors.push(err);
    }

    pub fn merge(&mut self, other: TaskReport) {
        self.written.extend(other.written);
        self.unchanged += other.unchanged;
        self.errors.extend(other.errors);
        self.outputs.extend(other.outputs);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// State kept between runs in one process
#[derive(Default)]
pub struct BuildState {
    /// Style fragments remembered by the style aggregator
    pub remembered_styles: Mutex<RememberedFragments>,

    /// Last merged artifacts, handed to the compile steps
    pub merged_styles: RwLock<Option<Arc<MergedArtifact>>>,
    pub merged_data: RwLock<Option<Arc<MergedData>>>,
    pub merged_scripts: RwLock<Option<Arc<MergedArtifact>>>,

    /// Source path -> hash of the resolved bundle last written
    pub script_hashes: DashMap<PathBuf, String>,

    /// Source path -> modification time at the last successful copy
    pub copy_index: DashMap<PathBuf, SystemTime>,
}

/// Everything a task needs to run
pub struct BuildContext {
    pub config: Arc<Config>,
    pub reload: LiveReload,
    pub state: BuildState,
}

impl BuildContext {
    pub fn new(config: Arc<Config>, reload: LiveReload) -> Self {
        Self {
            config,
            reload,
            state: BuildState::default(),
        }
    }
}

/// A unit of work in the task graph
#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> TaskId;

    /// Run the task. Returns once every write has been flushed.
    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport>;
}

/// Format an error together with its sources, one per line
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    message
}

/// Read a source file as UTF-8, turning decode failures into a pipeline error
pub(crate) async fn read_source(
    path: &Path,
    plugin: &str,
) -> Result<std::result::Result<String, PipelineError>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8(bytes).map_err(|e| {
        PipelineError::new("ReadError", plugin, e.to_string()).with_file(path)
    }))
}

/// Registry of all tasks
pub fn all_tasks() -> Vec<Arc<dyn Task>> {
    use crate::aggregate::{AggregateData, AggregateScripts, AggregateStyles};

    vec![
        Arc::new(AggregateStyles),
        Arc::new(styles::CompileStyles),
        Arc::new(AggregateData),
        Arc::new(templates::CompilePages),
        Arc::new(AggregateScripts),
        Arc::new(scripts::CompileScripts),
        Arc::new(assets::CopyAssets::images()),
        Arc::new(assets::CopyAssets::css()),
        Arc::new(assets::CopyAssets::js()),
        Arc::new(assets::CopyAssets::fonts()),
    ]
}
