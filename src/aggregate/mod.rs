//! Module aggregation
//!
//! Component blocks keep their styles, scripts and data next to each other:
//!
//! ```text
//! components/
//!   header/
//!     header.scss
//!     header.js
//!     header.json
//!     _mixins.scss   <- partial, never merged on its own
//! ```
//!
//! Each kind is merged into one artifact (`modules.scss`, `modules.js`,
//! `modules.json`). The artifact is handed to the compile step in memory and
//! also flushed to the staging area before the aggregation task completes,
//! so a compile step running on its own can pick it up from disk.

mod json;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::pipeline::{read_source, BuildContext, PipelineError, Task, TaskId, TaskReport};
use crate::source::{SourceFile, SourceSet};
use crate::utils::write_if_changed;

pub use json::deep_merge;

/// Kinds of fragment a component block can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Style,
    Script,
    Data,
    Template,
}

impl FragmentKind {
    pub fn extension(&self) -> &'static str {
        match self {
            FragmentKind::Style => "scss",
            FragmentKind::Script => "js",
            FragmentKind::Data => "json",
            FragmentKind::Template => "html",
        }
    }

    /// File name of the merged artifact in the staging area
    pub fn artifact_name(&self) -> &'static str {
        match self {
            FragmentKind::Style => "modules.scss",
            FragmentKind::Script => "modules.js",
            FragmentKind::Data => "modules.json",
            FragmentKind::Template => "modules.html",
        }
    }

    /// Non-partial fragments of this kind under `components`
    pub fn sources(&self, components: &Path) -> Result<SourceSet> {
        let pattern = format!("**/*.{}", self.extension());
        Ok(SourceSet::new(components, &[pattern.as_str()])?.skip_partials())
    }
}

/// A merged text artifact
#[derive(Debug, Clone, PartialEq)]
pub struct MergedArtifact {
    pub kind: FragmentKind,
    pub content: String,

    /// Fragments that made it into `content`, in merge order
    pub fragments: Vec<PathBuf>,
}

/// The merged data artifact
#[derive(Debug, Clone, PartialEq)]
pub struct MergedData {
    pub value: Value,
    pub fragments: Vec<PathBuf>,
}

impl MergedData {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.value).context("Failed to serialize merged data")
    }
}

#[derive(Debug, Clone)]
struct Remembered {
    modified: SystemTime,
    content: String,
}

/// Style fragments read by previous runs, keyed by path
#[derive(Debug, Default)]
pub struct RememberedFragments {
    entries: HashMap<PathBuf, Remembered>,
}

impl RememberedFragments {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concatenate style fragments. Only fragments whose modification time
/// changed since the previous call are read again; the output is always
/// rebuilt from the full current set, so removed fragments drop out.
///
/// Returns the artifact, the number of fragments re-read, and the errors.
pub async fn merge_styles(
    components: &Path,
    remembered: &Mutex<RememberedFragments>,
) -> Result<(MergedArtifact, usize, Vec<PipelineError>)> {
    let files = FragmentKind::Style.sources(components)?.discover();
    merge_style_files(files, remembered).await
}

async fn merge_style_files(
    files: Vec<SourceFile>,
    remembered: &Mutex<RememberedFragments>,
) -> Result<(MergedArtifact, usize, Vec<PipelineError>)> {
    let mut previous = std::mem::take(&mut remembered.lock().entries);
    let mut current = HashMap::with_capacity(files.len());

    let merged = read_style_fragments(files, &mut previous, &mut current).await;
    if merged.is_err() {
        // Keep what is still known for the next run
        current.extend(previous);
    }
    remembered.lock().entries = current;
    merged
}

async fn read_style_fragments(
    files: Vec<SourceFile>,
    previous: &mut HashMap<PathBuf, Remembered>,
    current: &mut HashMap<PathBuf, Remembered>,
) -> Result<(MergedArtifact, usize, Vec<PipelineError>)> {
    let mut parts = Vec::with_capacity(files.len());
    let mut fragments = Vec::with_capacity(files.len());
    let mut errors = Vec::new();
    let mut reread = 0;

    for file in files {
        let modified = tokio::fs::metadata(&file.path)
            .await
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {}", file.path.display()))?;

        let entry = match previous.remove(&file.path) {
            Some(entry) if entry.modified == modified => entry,
            _ => {
                reread += 1;
                match read_source(&file.path, "concat").await? {
                    Ok(content) => Remembered { modified, content },
                    Err(err) => {
                        errors.push(err);
                        continue;
                    }
                }
            }
        };

        parts.push(entry.content.clone());
        fragments.push(file.path.clone());
        current.insert(file.path, entry);
    }

    debug!("Style merge re-read {} of {} fragments", reread, fragments.len());

    let artifact = MergedArtifact {
        kind: FragmentKind::Style,
        content: parts.join("\n"),
        fragments,
    };
    Ok((artifact, reread, errors))
}

/// Concatenate script fragments in discovery order
pub async fn merge_scripts(components: &Path) -> Result<(MergedArtifact, Vec<PipelineError>)> {
    let mut parts = Vec::new();
    let mut fragments = Vec::new();
    let mut errors = Vec::new();

    for file in FragmentKind::Script.sources(components)?.discover() {
        match read_source(&file.path, "concat").await? {
            Ok(content) => {
                parts.push(content);
                fragments.push(file.path);
            }
            Err(err) => errors.push(err),
        }
    }

    let artifact = MergedArtifact {
        kind: FragmentKind::Script,
        content: parts.join("\n"),
        fragments,
    };
    Ok((artifact, errors))
}

/// Deep-merge every data fragment into one object. Later fragments win
/// conflicts. A fragment that fails to parse, or whose top level is not an
/// object, is skipped.
pub async fn merge_data(components: &Path) -> Result<(MergedData, Vec<PipelineError>)> {
    let mut value = Value::Object(serde_json::Map::new());
    let mut fragments = Vec::new();
    let mut errors = Vec::new();

    for file in FragmentKind::Data.sources(components)?.discover() {
        let source = match read_source(&file.path, "merge-json").await? {
            Ok(source) => source,
            Err(err) => {
                errors.push(err);
                continue;
            }
        };

        match serde_json::from_str::<Value>(&source) {
            Ok(fragment @ Value::Object(_)) => {
                deep_merge(&mut value, fragment);
                fragments.push(file.path);
            }
            Ok(_) => errors.push(
                PipelineError::new("JSONError", "merge-json", "top level must be an object")
                    .with_file(&file.path),
            ),
            Err(e) => errors.push(
                PipelineError::new("JSONError", "merge-json", e.to_string()).with_file(&file.path),
            ),
        }
    }

    Ok((MergedData { value, fragments }, errors))
}

/// Write a merged artifact to the staging area
async fn stage(ctx: &BuildContext, kind: FragmentKind, content: &str) -> Result<(PathBuf, bool)> {
    let path = ctx.config.staging_dir().join(kind.artifact_name());
    let written = write_if_changed(&path, content.as_bytes()).await?;
    Ok((path, written))
}

/// Read a previously staged artifact. `Ok(None)` when it does not exist.
pub async fn read_staged(ctx: &BuildContext, kind: FragmentKind) -> Result<Option<String>> {
    let path = ctx.config.staging_dir().join(kind.artifact_name());
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// `components/**/[^_]*.scss` -> `modules.scss`
pub struct AggregateStyles;

#[async_trait]
impl Task for AggregateStyles {
    fn id(&self) -> TaskId {
        TaskId::AggregateStyles
    }

    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport> {
        let mut report = TaskReport::default();
        let (artifact, reread, errors) =
            merge_styles(&ctx.config.components_dir(), &ctx.state.remembered_styles).await?;
        for err in errors {
            report.record_error(err);
        }

        let (path, written) = stage(ctx, FragmentKind::Style, &artifact.content).await?;
        report.record_output(&path, artifact.content.len(), written);
        info!(
            "Merged {} style fragment(s), {} re-read",
            artifact.fragments.len(),
            reread
        );

        *ctx.state.merged_styles.write() = Some(Arc::new(artifact));
        Ok(report)
    }
}

/// `components/**/[^_]*.json` -> `modules.json`
pub struct AggregateData;

#[async_trait]
impl Task for AggregateData {
    fn id(&self) -> TaskId {
        TaskId::AggregateData
    }

    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport> {
        let mut report = TaskReport::default();
        let (data, errors) = merge_data(&ctx.config.components_dir()).await?;
        for err in errors {
            report.record_error(err);
        }

        let json = data.to_json()?;
        let (path, written) = stage(ctx, FragmentKind::Data, &json).await?;
        report.record_output(&path, json.len(), written);
        info!("Merged {} data fragment(s)", data.fragments.len());

        *ctx.state.merged_data.write() = Some(Arc::new(data));
        Ok(report)
    }
}

/// `components/**/[^_]*.js` -> `modules.js`
pub struct AggregateScripts;

#[async_trait]
impl Task for AggregateScripts {
    fn id(&self) -> TaskId {
        TaskId::AggregateScripts
    }

    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport> {
        let mut report = TaskReport::default();
        let (artifact, errors) = merge_scripts(&ctx.config.components_dir()).await?;
        for err in errors {
            report.record_error(err);
        }

        let (path, written) = stage(ctx, FragmentKind::Script, &artifact.content).await?;
        report.record_output(&path, artifact.content.len(), written);
        info!("Merged {} script fragment(s)", artifact.fragments.len());

        *ctx.state.merged_scripts.write() = Some(Arc::new(artifact));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::LiveReload;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_style_merge_order_and_partials() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "button/button.scss", ".button { color: red; }");
        write(dir.path(), "button/_vars.scss", "$x: 1;");
        write(dir.path(), "alert/alert.scss", ".alert { color: blue; }");

        let remembered = Mutex::new(RememberedFragments::default());
        let (artifact, reread, errors) = merge_styles(dir.path(), &remembered).await.unwrap();

        assert!(errors.is_empty());
        assert_eq!(reread, 2);
        assert_eq!(
            artifact.content,
            ".alert { color: blue; }\n.button { color: red; }"
        );
        assert_eq!(remembered.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_style_merge_is_stable_and_incremental() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/a.scss", ".a {}");
        write(dir.path(), "b/b.scss", ".b {}");

        let remembered = Mutex::new(RememberedFragments::default());
        let (first, _, _) = merge_styles(dir.path(), &remembered).await.unwrap();
        let (second, reread, _) = merge_styles(dir.path(), &remembered).await.unwrap();

        assert_eq!(first.content, second.content);
        assert_eq!(reread, 0);
    }

    #[tokio::test]
    async fn test_style_merge_drops_deleted_fragments() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/a.scss", ".a {}");
        write(dir.path(), "b/b.scss", ".b {}");

        let remembered = Mutex::new(RememberedFragments::default());
        merge_styles(dir.path(), &remembered).await.unwrap();
        fs::remove_file(dir.path().join("b/b.scss")).unwrap();
        let (artifact, _, _) = merge_styles(dir.path(), &remembered).await.unwrap();

        assert_eq!(artifact.content, ".a {}");
        assert_eq!(remembered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_style_merge_failure_keeps_remembered_fragments() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/a.scss", ".a {}");
        write(dir.path(), "b/b.scss", ".b {}");

        let remembered = Mutex::new(RememberedFragments::default());
        merge_styles(dir.path(), &remembered).await.unwrap();

        let mut files = FragmentKind::Style.sources(dir.path()).unwrap().discover();
        files.push(SourceFile {
            path: dir.path().join("c/c.scss"),
            relative: PathBuf::from("c/c.scss"),
        });
        assert!(merge_style_files(files, &remembered).await.is_err());
        assert_eq!(remembered.lock().len(), 2);

        let (_, reread, _) = merge_styles(dir.path(), &remembered).await.unwrap();
        assert_eq!(reread, 0);
    }

    #[tokio::test]
    async fn test_data_merge_last_fragment_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"x": 1, "a": true}"#);
        write(dir.path(), "b.json", r#"{"x": 2}"#);

        let (data, errors) = merge_data(dir.path()).await.unwrap();

        assert!(errors.is_empty());
        assert_eq!(data.value, json!({"x": 2, "a": true}));
    }

    #[tokio::test]
    async fn test_data_merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "nav/nav.json", r#"{"nav": {"items": ["home"]}}"#);
        write(dir.path(), "page/page.json", r#"{"nav": {"title": "Site"}}"#);

        let (first, _) = merge_data(dir.path()).await.unwrap();
        let (second, _) = merge_data(dir.path()).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_data_fragment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"ok": 1}"#);
        write(dir.path(), "b.json", r#"{"broken": "#);
        write(dir.path(), "c.json", r#"[1, 2]"#);

        let (data, errors) = merge_data(dir.path()).await.unwrap();

        assert_eq!(data.value, json!({"ok": 1}));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.plugin == "merge-json"));
    }

    #[tokio::test]
    async fn test_script_merge_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/a.js", "var a = 1;");
        write(dir.path(), "b/b.js", "var b = 2;");
        write(dir.path(), "b/_private.js", "var hidden;");

        let (artifact, _) = merge_scripts(dir.path()).await.unwrap();

        assert_eq!(artifact.content, "var a = 1;\nvar b = 2;");
        assert_eq!(artifact.fragments.len(), 2);
    }

    #[tokio::test]
    async fn test_task_stages_artifact_and_keeps_it_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/components/card/card.json", r#"{"card": {"title": "Hi"}}"#);
        let ctx = BuildContext::new(
            Arc::new(Config::with_root(dir.path())),
            LiveReload::disabled(),
        );

        let report = AggregateData.run(&ctx).await.unwrap();

        assert!(report.is_clean());
        let staged = fs::read_to_string(dir.path().join("tmp/modules.json")).unwrap();
        let staged: Value = serde_json::from_str(&staged).unwrap();
        assert_eq!(staged, json!({"card": {"title": "Hi"}}));
        let merged = ctx.state.merged_data.read().clone().unwrap();
        assert_eq!(merged.value, staged);
    }
}
