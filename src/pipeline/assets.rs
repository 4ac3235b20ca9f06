//! Static asset copying
//!
//! Files are copied verbatim. A copy index maps each source to its
//! modification time at the last copy; sources whose time has not moved and
//! whose destination still exists are skipped. Sources that disappear are
//! dropped from the index, their copies are left in place.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{BuildContext, Task, TaskId, TaskReport};
use crate::config::Config;
use crate::source::SourceSet;
use crate::utils::relative_path;

/// Copies one class of static assets into the output tree
pub struct CopyAssets {
    id: TaskId,
    source: fn(&Config) -> PathBuf,
    patterns: &'static [&'static str],
    skip_partials: bool,
    dest: fn(&Config) -> PathBuf,
}

impl CopyAssets {
    /// `static/images/**/[^_]*.{jpg,gif,svg,png}` -> `assets/img`
    pub fn images() -> Self {
        Self {
            id: TaskId::CopyImages,
            source: Config::images_dir,
            patterns: &["**/*.{jpg,gif,svg,png}"],
            skip_partials: true,
            dest: Config::img_output_dir,
        }
    }

    /// `static/assets/css/**/*.css` -> `assets/css`
    pub fn css() -> Self {
        Self {
            id: TaskId::CopyAssetsCss,
            source: |config| config.assets_dir().join("css"),
            patterns: &["**/*.css"],
            skip_partials: false,
            dest: Config::css_output_dir,
        }
    }

    /// `static/assets/js/**/*.js` -> `assets/js`
    pub fn js() -> Self {
        Self {
            id: TaskId::CopyAssetsJs,
            source: |config| config.assets_dir().join("js"),
            patterns: &["**/*.js"],
            skip_partials: false,
            dest: Config::js_output_dir,
        }
    }

    /// `static/assets/fonts/**/*.{woff,woff2}` -> `assets/fonts`
    pub fn fonts() -> Self {
        Self {
            id: TaskId::CopyAssetsFonts,
            source: |config| config.assets_dir().join("fonts"),
            patterns: &["**/*.{woff,woff2}"],
            skip_partials: false,
            dest: Config::fonts_output_dir,
        }
    }

    fn sources(&self, config: &Config) -> Result<SourceSet> {
        let set = SourceSet::new((self.source)(config), self.patterns)?;
        Ok(if self.skip_partials { set.skip_partials() } else { set })
    }
}

fn is_current(ctx: &BuildContext, source: &Path, modified: Option<SystemTime>) -> bool {
    match (modified, ctx.state.copy_index.get(source)) {
        (Some(modified), Some(indexed)) => *indexed == modified,
        _ => false,
    }
}

#[async_trait]
impl Task for CopyAssets {
    fn id(&self) -> TaskId {
        self.id
    }

    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport> {
        let config = &ctx.config;
        let sources = self.sources(config)?;
        let dest_dir = (self.dest)(config);
        let mut report = TaskReport::default();

        let files = sources.discover();

        let present: HashSet<&Path> = files.iter().map(|f| f.path.as_path()).collect();
        ctx.state
            .copy_index
            .retain(|path, _| !sources.matches(path) || present.contains(path.as_path()));

        let mut copied = Vec::new();
        for file in &files {
            let metadata = tokio::fs::metadata(&file.path)
                .await
                .with_context(|| format!("Failed to stat {}", file.path.display()))?;
            let modified = metadata.modified().ok();
            let dest = dest_dir.join(&file.relative);

            if is_current(ctx, &file.path, modified) && tokio::fs::metadata(&dest).await.is_ok() {
                report.unchanged += 1;
                report.claim(&dest);
                continue;
            }

            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let size = tokio::fs::copy(&file.path, &dest).await.with_context(|| {
                format!("Failed to copy {} to {}", file.path.display(), dest.display())
            })?;
            debug!("Copied {}", file.relative.display());

            report.record_output(&dest, size as usize, true);
            if let Some(modified) = modified {
                ctx.state.copy_index.insert(file.path.clone(), modified);
            }
            copied.push(dest);
        }

        if !copied.is_empty() {
            info!("{}: copied {} file(s)", self.id, copied.len());
            if self.id == TaskId::CopyAssetsCss {
                let output_dir = config.output_dir();
                let urls = copied
                    .iter()
                    .filter_map(|path| relative_path(&output_dir, path))
                    .map(|rel| format!("/{}", rel))
                    .collect();
                ctx.reload.css_updated(urls);
            } else {
                ctx.reload
                    .reload_all(format!("{}: {} file(s) copied", self.id, copied.len()));
            }
        }

        Ok(report)
    }
}
