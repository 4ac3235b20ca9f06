//! Script compilation
//!
//! Each global script is resolved into a bundle, written unminified, then
//! minified and written again with the configured suffix (`app.js` and
//! `app.min.js`). Bundles whose resolved content has not changed since the
//! previous run in this process are skipped.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use super::include::IncludeResolver;
use super::minify::minify_js;
use super::{read_source, BuildContext, Task, TaskId, TaskReport};
use crate::aggregate::{read_staged, FragmentKind};
use crate::source::SourceSet;
use crate::utils::{hash_content, with_suffix, write_if_changed};

/// Write a bundle and its minified sibling
async fn write_bundle(
    output: &Path,
    bundle: &str,
    min_suffix: &str,
    report: &mut TaskReport,
) -> Result<bool> {
    let written = write_if_changed(output, bundle.as_bytes()).await?;
    report.record_output(output, bundle.len(), written);

    let minified = minify_js(bundle);
    let min_output = with_suffix(output, min_suffix);
    let min_written = write_if_changed(&min_output, minified.as_bytes()).await?;
    report.record_output(&min_output, minified.len(), min_written);

    Ok(written || min_written)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// `static/scripts/**/[^_]*.js` -> `assets/js/*.js` + `*.min.js`
pub struct CompileScripts;

#[async_trait]
impl Task for CompileScripts {
    fn id(&self) -> TaskId {
        TaskId::CompileScripts
    }

    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport> {
        let config = &ctx.config;
        let out_dir = config.js_output_dir();
        let suffix = &config.scripts.min_suffix;
        let mut report = TaskReport::default();
        let mut changed = 0;

        for file in SourceSet::new(config.scripts_dir(), &["**/*.js"])?
            .skip_partials()
            .discover()
        {
            let source = match read_source(&file.path, "include").await? {
                Ok(source) => source,
                Err(err) => {
                    report.record_error(err);
                    continue;
                }
            };

            let mut resolver = IncludeResolver::new();
            let bundle = match resolver.resolve(&file.path, source).await {
                Ok(bundle) => bundle,
                Err(err) => {
                    report.record_error(err);
                    continue;
                }
            };
            debug!(
                "{} inlines {} file(s)",
                file.relative.display(),
                resolver.included().count()
            );

            let output = out_dir.join(&file.relative);
            let hash = hash_content(bundle.as_bytes());
            let cached = ctx
                .state
                .script_hashes
                .get(&file.path)
                .map(|h| *h == hash)
                .unwrap_or(false);
            let min_output = with_suffix(&output, suffix);
            if cached && exists(&output).await && exists(&min_output).await {
                report.unchanged += 1;
                report.claim(&output);
                report.claim(&min_output);
                continue;
            }

            if write_bundle(&output, &bundle, suffix, &mut report).await? {
                changed += 1;
            }
            ctx.state.script_hashes.insert(file.path, hash);
        }

        if config.scripts.emit_modules {
            let remembered = ctx.state.merged_scripts.read().clone();
            let merged = match remembered {
                Some(artifact) => Some(artifact.content.clone()),
                None => read_staged(ctx, FragmentKind::Script).await?,
            };
            if let Some(content) = merged {
                let output = out_dir.join(FragmentKind::Script.artifact_name());
                if write_bundle(&output, &content, suffix, &mut report).await? {
                    changed += 1;
                }
            }
        }

        if changed > 0 {
            info!("Compiled {} script bundle(s)", changed);
            ctx.reload.reload_all(format!("{} script bundle(s) changed", changed));
        }

        Ok(report)
    }
}
