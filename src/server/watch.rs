//! Source watching
//!
//! Each binding maps a glob over a source directory to the target rebuilt
//! when a matching file changes. Changed pages in the output tree trigger a
//! full browser reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::orchestrator::{Orchestrator, Target};
use crate::source::SourceSet;
use crate::utils::format_duration;

/// What to do when a watched file changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Run(Target),
    Reload,
}

struct WatchBinding {
    sources: SourceSet,
    action: WatchAction,
}

/// Watch bindings for a project
pub struct WatchBindings {
    root: PathBuf,
    bindings: Vec<WatchBinding>,
}

impl WatchBindings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let bind = |base: PathBuf, patterns: &[&str], action| -> Result<WatchBinding> {
            Ok(WatchBinding {
                sources: SourceSet::new(base, patterns)?,
                action,
            })
        };
        let components = config.components_dir();

        let bindings = vec![
            bind(components.clone(), &["**/*.scss"], WatchAction::Run(Target::BuildCss))?,
            bind(
                components.clone(),
                &["**/*.html", "**/*.json"],
                WatchAction::Run(Target::BuildHtml),
            )?,
            bind(components, &["**/*.js"], WatchAction::Run(Target::BuildJs))?,
            bind(config.styles_dir(), &["**/*.scss"], WatchAction::Run(Target::CompileStyles))?,
            bind(config.pages_dir(), &["**/*.html"], WatchAction::Run(Target::CompilePages))?,
            bind(config.scripts_dir(), &["**/*.js"], WatchAction::Run(Target::CompileScripts))?,
            bind(config.images_dir(), &["**/*"], WatchAction::Run(Target::CopyImages))?,
            bind(config.assets_dir(), &["**/*"], WatchAction::Run(Target::CopyAssets))?,
            bind(config.output_dir(), &["**/*.html"], WatchAction::Reload)?,
        ];
        Ok(Self {
            root: config.root.clone(),
            bindings,
        })
    }

    /// Actions triggered by a batch of changed paths, each at most once, in
    /// binding order
    pub fn actions_for<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Vec<WatchAction> {
        let paths: Vec<&Path> = paths.into_iter().collect();
        let mut actions = Vec::new();
        for binding in &self.bindings {
            if actions.contains(&binding.action) {
                continue;
            }
            if paths.iter().any(|path| binding.sources.matches(path)) {
                actions.push(binding.action);
            }
        }
        actions
    }

    /// Directory to watch for `base`: the directory itself, or its closest
    /// existing ancestor inside the project while it does not exist yet
    fn watch_root(&self, base: &Path) -> Option<PathBuf> {
        let dir = base.ancestors().find(|dir| dir.is_dir())?;
        (dir == base || dir.starts_with(&self.root)).then(|| dir.to_path_buf())
    }

    /// Directories to watch recursively. Nested directories are covered by
    /// their ancestors.
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self
            .bindings
            .iter()
            .filter_map(|b| self.watch_root(b.sources.base()))
            .collect();
        roots.sort();
        roots.dedup();

        let mut covered: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !covered.iter().any(|c| root.starts_with(c)) {
                covered.push(root);
            }
        }
        covered
    }
}

/// Run a batch of watch actions, one target after another
async fn apply(orchestrator: &Orchestrator, actions: Vec<WatchAction>) {
    for action in actions {
        match action {
            WatchAction::Run(target) => match orchestrator.run(target).await {
                Ok(report) => {
                    let errors = report.errors().count();
                    let summary = format!(
                        "{} finished in {}",
                        target,
                        format_duration(report.duration)
                    );
                    if errors == 0 {
                        eprintln!("  {} {}", "✓".green(), summary);
                    } else {
                        eprintln!("  {} {} ({} error(s))", "✗".red(), summary, errors);
                    }
                }
                Err(e) => error!("{} failed: {:#}", target, e),
            },
            WatchAction::Reload => orchestrator
                .context()
                .reload
                .reload_all("pages changed"),
        }
    }
}

/// Start watching the project sources. Changes are debounced, mapped to
/// actions and applied on the runtime; runs never overlap.
pub fn spawn_watcher(orchestrator: Arc<Orchestrator>, debounce: Duration) -> Result<()> {
    let config = orchestrator.config();
    let output_dir = config.output_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let bindings = WatchBindings::from_config(config)?;
    let roots = bindings.roots();

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(debounce, tx)?;
    for root in &roots {
        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        debug!("Watching {}", root.display());
    }

    let (batch_tx, mut batch_rx) = mpsc::channel::<Vec<PathBuf>>(16);

    // The debouncer is moved into the thread to keep it alive
    std::thread::spawn(move || {
        let _debouncer = debouncer;
        loop {
            match rx.recv() {
                Ok(Ok(events)) => {
                    let paths = events.into_iter().map(|event| event.path).collect();
                    if batch_tx.blocking_send(paths).is_err() {
                        break;
                    }
                }
                Ok(Err(e)) => warn!("Watch error: {:?}", e),
                Err(_) => break,
            }
        }
    });

    tokio::spawn(async move {
        while let Some(paths) = batch_rx.recv().await {
            for path in &paths {
                if let Some(rel) = orchestrator.config().relative_to_root(path) {
                    eprintln!("  {} File changed: {}", "↻".yellow(), rel.dimmed());
                }
            }
            let actions = bindings.actions_for(paths.iter().map(PathBuf::as_path));
            apply(&orchestrator, actions).await;
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bindings() -> WatchBindings {
        WatchBindings::from_config(&Config::with_root("/site")).unwrap()
    }

    fn actions(paths: &[&str]) -> Vec<WatchAction> {
        bindings().actions_for(paths.iter().map(Path::new))
    }

    #[test]
    fn test_component_changes_map_to_build_targets() {
        assert_eq!(
            actions(&["/site/src/components/header/header.scss"]),
            vec![WatchAction::Run(Target::BuildCss)]
        );
        assert_eq!(
            actions(&["/site/src/components/header/header.json"]),
            vec![WatchAction::Run(Target::BuildHtml)]
        );
        assert_eq!(
            actions(&["/site/src/components/header/header.js"]),
            vec![WatchAction::Run(Target::BuildJs)]
        );
    }

    #[test]
    fn test_global_sources_map_to_compile_targets() {
        assert_eq!(
            actions(&["/site/src/static/styles/_vars.scss"]),
            vec![WatchAction::Run(Target::CompileStyles)]
        );
        assert_eq!(
            actions(&["/site/src/pages/about/index.html"]),
            vec![WatchAction::Run(Target::CompilePages)]
        );
        assert_eq!(
            actions(&["/site/src/static/assets/fonts/a.woff"]),
            vec![WatchAction::Run(Target::CopyAssets)]
        );
    }

    #[test]
    fn test_output_pages_trigger_reload() {
        assert_eq!(actions(&["/site/dest/index.html"]), vec![WatchAction::Reload]);
        assert!(actions(&["/site/dest/assets/css/main.css"]).is_empty());
        assert!(actions(&["/site/README.md"]).is_empty());
    }

    #[test]
    fn test_batch_deduplicates_actions() {
        let result = actions(&[
            "/site/src/static/scripts/app.js",
            "/site/src/components/a/a.scss",
            "/site/src/static/scripts/lib.js",
            "/site/src/components/b/b.scss",
        ]);
        assert_eq!(
            result,
            vec![
                WatchAction::Run(Target::BuildCss),
                WatchAction::Run(Target::CompileScripts),
            ]
        );
    }

    #[test]
    fn test_roots_skip_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for rel in ["src/pages", "src/components", "src/static", "dest"] {
            std::fs::create_dir_all(dir.path().join(rel)).unwrap();
        }
        let bindings = WatchBindings::from_config(&Config::with_root(dir.path())).unwrap();

        assert_eq!(
            bindings.roots(),
            vec![
                dir.path().join("dest"),
                dir.path().join("src/components"),
                dir.path().join("src/pages"),
                dir.path().join("src/static"),
            ]
        );
    }

    #[test]
    fn test_missing_output_dir_is_watched_through_its_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/pages")).unwrap();
        let bindings = WatchBindings::from_config(&Config::with_root(dir.path())).unwrap();

        assert_eq!(bindings.roots(), vec![dir.path().to_path_buf()]);
        assert_eq!(
            bindings.actions_for([dir.path().join("dest/index.html").as_path()]),
            vec![WatchAction::Reload]
        );
    }

    #[test]
    fn test_nothing_watched_outside_a_missing_project() {
        let bindings = WatchBindings::from_config(&Config::with_root("/no/such/site")).unwrap();
        assert!(bindings.roots().is_empty());
    }
}
