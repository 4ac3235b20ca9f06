//! Build orchestration
//!
//! Named targets expand to sets of tasks; the [`TaskGraph`] orders them and
//! the orchestrator runs every task as soon as the tasks it waits for have
//! completed. Independent tasks run concurrently.

mod graph;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

use crate::config::Config;
use crate::pipeline::{all_tasks, BuildContext, OutputFile, PipelineError, Task, TaskId, TaskReport};
use crate::server::LiveReload;
use crate::utils::remove_dir_if_exists;

pub use graph::TaskGraph;

/// A named group of tasks, runnable from the CLI or a watch binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    BuildCss,
    BuildHtml,
    BuildJs,
    CopyImages,
    CopyAssets,
    /// Union of the five targets above
    Build,
    CompileStyles,
    CompilePages,
    CompileScripts,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::BuildCss => "build-css",
            Target::BuildHtml => "build-html",
            Target::BuildJs => "build-js",
            Target::CopyImages => "copy-images",
            Target::CopyAssets => "copy-assets",
            Target::Build => "build",
            Target::CompileStyles => "compile-styles",
            Target::CompilePages => "compile-pages",
            Target::CompileScripts => "compile-scripts",
        }
    }

    pub fn tasks(&self) -> Vec<TaskId> {
        match self {
            Target::BuildCss => vec![TaskId::AggregateStyles, TaskId::CompileStyles],
            Target::BuildHtml => vec![TaskId::AggregateData, TaskId::CompilePages],
            Target::BuildJs => vec![TaskId::AggregateScripts, TaskId::CompileScripts],
            Target::CopyImages => vec![TaskId::CopyImages],
            Target::CopyAssets => vec![
                TaskId::CopyAssetsCss,
                TaskId::CopyAssetsJs,
                TaskId::CopyAssetsFonts,
            ],
            Target::Build => [
                Target::BuildHtml,
                Target::BuildCss,
                Target::BuildJs,
                Target::CopyImages,
                Target::CopyAssets,
            ]
            .iter()
            .flat_map(|t| t.tasks())
            .collect(),
            Target::CompileStyles => vec![TaskId::CompileStyles],
            Target::CompilePages => vec![TaskId::CompilePages],
            Target::CompileScripts => vec![TaskId::CompileScripts],
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reports of every task in one run
#[derive(Debug, Default)]
pub struct BuildReport {
    pub tasks: BTreeMap<TaskId, TaskReport>,
    pub duration: Duration,
}

impl BuildReport {
    pub fn written(&self) -> impl Iterator<Item = &OutputFile> {
        self.tasks.values().flat_map(|r| r.written.iter())
    }

    pub fn errors(&self) -> impl Iterator<Item = &PipelineError> {
        self.tasks.values().flat_map(|r| r.errors.iter())
    }

    pub fn unchanged(&self) -> usize {
        self.tasks.values().map(|r| r.unchanged).sum()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskReport> {
        self.tasks.get(&id)
    }

    /// Output paths produced by more than one task of the run, with the
    /// first task that produced each and the one that collided with it
    pub fn conflicts(&self) -> Vec<(PathBuf, TaskId, TaskId)> {
        let mut owners: HashMap<&Path, TaskId> = HashMap::new();
        let mut conflicts = Vec::new();
        for (&id, task) in &self.tasks {
            for path in &task.outputs {
                match owners.get(path.as_path()) {
                    Some(&owner) if owner != id => conflicts.push((path.clone(), owner, id)),
                    Some(_) => {}
                    None => {
                        owners.insert(path.as_path(), id);
                    }
                }
            }
        }
        conflicts
    }

    /// Log every output conflict as an error of the task that collided
    fn record_conflicts(&mut self) {
        for (path, owner, id) in self.conflicts() {
            let err = PipelineError::new(
                "OutputConflict",
                "orchestrator",
                format!("'{}' and '{}' both write this file", owner, id),
            )
            .with_file(path);
            if let Some(task) = self.tasks.get_mut(&id) {
                task.record_error(err);
            }
        }
    }
}

/// Owns the build context and runs targets against it
pub struct Orchestrator {
    ctx: BuildContext,
    tasks: HashMap<TaskId, Arc<dyn Task>>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, reload: LiveReload) -> Self {
        let tasks = all_tasks().into_iter().map(|t| (t.id(), t)).collect();
        Self {
            ctx: BuildContext::new(config, reload),
            tasks,
        }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Run a named target
    pub async fn run(&self, target: Target) -> Result<BuildReport> {
        info!("Starting '{}'", target);
        let report = self.run_graph(TaskGraph::for_tasks(target.tasks())).await?;
        info!(
            "Finished '{}' after {}",
            target,
            crate::utils::format_duration(report.duration)
        );
        Ok(report)
    }

    /// Run every task of `graph`. A task starts once all of its
    /// dependencies have completed. On a task failure no further tasks are
    /// started; tasks already running are awaited and the first error is
    /// returned.
    pub async fn run_graph(&self, graph: TaskGraph) -> Result<BuildReport> {
        graph.topological_order()?;
        let start = Instant::now();

        let mut waiting: HashMap<TaskId, usize> = graph
            .tasks()
            .map(|id| (id, graph.dependencies(id).len()))
            .collect();
        let mut running = FuturesUnordered::new();
        let mut report = BuildReport::default();
        let mut failure = None;

        for id in graph.tasks() {
            if waiting.get(&id) == Some(&0) {
                running.push(self.spawn(id));
            }
        }

        while let Some((id, result)) = running.next().await {
            match result {
                Ok(task_report) => {
                    debug!("Task '{}' done", id);
                    report.tasks.insert(id, task_report);
                    if failure.is_some() {
                        continue;
                    }
                    for dependent in graph.dependents(id) {
                        if let Some(count) = waiting.get_mut(&dependent) {
                            *count -= 1;
                            if *count == 0 {
                                running.push(self.spawn(dependent));
                            }
                        }
                    }
                }
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err.context(format!("Task '{}' failed", id)));
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        report.record_conflicts();
        report.duration = start.elapsed();
        Ok(report)
    }

    fn spawn(&self, id: TaskId) -> BoxFuture<'_, (TaskId, Result<TaskReport>)> {
        async move {
            debug!("Task '{}' started", id);
            let result = match self.tasks.get(&id) {
                Some(task) => task.run(&self.ctx).await,
                None => Err(anyhow::anyhow!("No task registered for '{}'", id)),
            };
            (id, result)
        }
        .boxed()
    }

    /// Delete the output tree and the staging area, and forget everything
    /// remembered about them
    pub async fn clean(&self) -> Result<()> {
        let config = &self.ctx.config;
        for dir in [config.output_dir(), config.staging_dir()] {
            if remove_dir_if_exists(&dir).await? {
                info!("Removed {}", dir.display());
            }
        }

        let state = &self.ctx.state;
        state.copy_index.clear();
        state.script_hashes.clear();
        *state.merged_styles.write() = None;
        *state.merged_data.write() = None;
        *state.merged_scripts.write() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_site(root: &Path) {
        write(root, "src/pages/_layout.html", "<html><body>{% block body %}{% endblock body %}</body></html>");
        write(
            root,
            "src/pages/index.html",
            "{% extends \"_layout.html\" %}{% block body %}<h1>{{ site.title }}</h1>{% endblock body %}",
        );
        write(root, "src/static/styles/main.scss", "$c: red;\nbody { color: $c; }\n");
        write(root, "src/static/scripts/app.js", "//= include _util.js\nutil();\n");
        write(root, "src/static/scripts/_util.js", "function util() {\n  return 1;\n}\n");
        write(root, "src/static/images/logo.png", "png");
        write(root, "src/static/assets/css/reset.css", "* { margin: 0 }");
        write(root, "src/static/assets/js/vendor.js", "var vendor;");
        write(root, "src/static/assets/fonts/a.woff", "woff");
        write(root, "src/components/header/header.scss", ".header { .title { font-weight: bold; } }");
        write(root, "src/components/header/header.json", r#"{"site": {"title": "Hello"}}"#);
        write(root, "src/components/header/header.js", "var header = true;");
    }

    fn orchestrator(root: &Path) -> Orchestrator {
        Orchestrator::new(Arc::new(Config::with_root(root)), LiveReload::disabled())
    }

    fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = crate::utils::path_to_slash(e.path().strip_prefix(dir).unwrap());
                (rel, fs::read(e.path()).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_build_target_covers_every_task() {
        let mut tasks = Target::Build.tasks();
        tasks.sort();
        assert_eq!(tasks, TaskId::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_full_build_produces_output_tree() {
        let dir = tempfile::tempdir().unwrap();
        sample_site(dir.path());

        let report = orchestrator(dir.path()).run(Target::Build).await.unwrap();

        assert_eq!(report.errors().count(), 0);
        let out = snapshot(&dir.path().join("dest"));
        let files: Vec<&str> = out.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            files,
            vec![
                "assets/css/main.css",
                "assets/css/modules.css",
                "assets/css/reset.css",
                "assets/fonts/a.woff",
                "assets/img/logo.png",
                "assets/js/app.js",
                "assets/js/app.min.js",
                "assets/js/vendor.js",
                "index.html",
            ]
        );
        let index = String::from_utf8(out["index.html"].clone()).unwrap();
        assert!(index.contains("<h1>Hello</h1>"));
        assert!(dir.path().join("tmp/modules.scss").exists());
        assert!(dir.path().join("tmp/modules.js").exists());
        assert!(dir.path().join("tmp/modules.json").exists());
    }

    #[tokio::test]
    async fn test_second_build_rewrites_nothing() {
        let dir = tempfile::tempdir().unwrap();
        sample_site(dir.path());
        let orchestrator = orchestrator(dir.path());

        orchestrator.run(Target::Build).await.unwrap();
        let before = snapshot(&dir.path().join("dest"));
        let report = orchestrator.run(Target::Build).await.unwrap();

        assert_eq!(report.written().count(), 0);
        for copier in [
            TaskId::CopyImages,
            TaskId::CopyAssetsCss,
            TaskId::CopyAssetsJs,
            TaskId::CopyAssetsFonts,
        ] {
            let task = report.task(copier).unwrap();
            assert!(task.written.is_empty());
            assert_eq!(task.unchanged, 1);
        }
        assert_eq!(before, snapshot(&dir.path().join("dest")));
    }

    #[tokio::test]
    async fn test_clean_then_build_has_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        sample_site(dir.path());
        let orchestrator = orchestrator(dir.path());

        orchestrator.run(Target::Build).await.unwrap();
        let first = snapshot(&dir.path().join("dest"));
        write(dir.path(), "dest/stale.html", "old");
        write(dir.path(), "tmp/stale.scss", "old");

        orchestrator.clean().await.unwrap();
        assert!(!dir.path().join("dest").exists());
        assert!(!dir.path().join("tmp").exists());

        orchestrator.run(Target::Build).await.unwrap();
        assert_eq!(first, snapshot(&dir.path().join("dest")));
        assert!(!dir.path().join("tmp/stale.scss").exists());
    }

    #[tokio::test]
    async fn test_style_error_does_not_stop_other_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        sample_site(dir.path());
        write(dir.path(), "src/components/broken/broken.scss", ".broken { color: red;");

        let report = orchestrator(dir.path()).run(Target::Build).await.unwrap();

        let errors: Vec<&PipelineError> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].plugin, "scss");
        assert!(errors[0].to_string().contains("scss"));
        assert!(report.task(TaskId::CompilePages).unwrap().is_clean());
        assert!(report.task(TaskId::CompileScripts).unwrap().is_clean());
        assert!(dir.path().join("dest/index.html").exists());
        assert!(dir.path().join("dest/assets/js/app.min.js").exists());
        assert!(dir.path().join("dest/assets/css/main.css").exists());
    }

    #[tokio::test]
    async fn test_shared_output_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        sample_site(dir.path());
        write(dir.path(), "src/static/assets/css/main.css", "body { color: blue }");

        let report = orchestrator(dir.path()).run(Target::Build).await.unwrap();

        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "OutputConflict");
        assert!(errors[0]
            .file
            .as_ref()
            .unwrap()
            .ends_with("dest/assets/css/main.css"));
        assert_eq!(report.conflicts().len(), 1);
    }

    #[tokio::test]
    async fn test_compile_alone_uses_staged_artifact() {
        let dir = tempfile::tempdir().unwrap();
        sample_site(dir.path());
        orchestrator(dir.path()).run(Target::BuildCss).await.unwrap();
        fs::remove_dir_all(dir.path().join("dest")).unwrap();

        // A fresh process has nothing in memory and reads tmp/modules.scss
        let report = orchestrator(dir.path()).run(Target::CompileStyles).await.unwrap();

        assert_eq!(report.tasks.len(), 1);
        let modules = fs::read_to_string(dir.path().join("dest/assets/css/modules.css")).unwrap();
        assert!(modules.contains(".header .title"));
    }
}
