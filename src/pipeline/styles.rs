//! Stylesheet compilation
//!
//! Global stylesheets and the merged component stylesheet are compiled with
//! `grass`; compiled files can additionally be minified with `lightningcss`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use tracing::{debug, info};

use super::{BuildContext, PipelineError, Task, TaskId, TaskReport};
use crate::aggregate::{read_staged, FragmentKind};
use crate::source::SourceSet;
use crate::utils::{relative_path, with_suffix, write_if_changed};

const PLUGIN: &str = "scss";

/// A stylesheet to compile: where its output goes and what to compile
enum StyleInput {
    File { source: PathBuf, output: PathBuf },
    Merged { content: String, output: PathBuf },
}

impl StyleInput {
    fn output(&self) -> &Path {
        match self {
            StyleInput::File { output, .. } | StyleInput::Merged { output, .. } => output,
        }
    }

    fn source_label(&self) -> PathBuf {
        match self {
            StyleInput::File { source, .. } => source.clone(),
            StyleInput::Merged { .. } => PathBuf::from(FragmentKind::Style.artifact_name()),
        }
    }
}

/// Compile every input on a blocking thread
async fn compile_all(
    inputs: Vec<StyleInput>,
    load_paths: Vec<PathBuf>,
) -> Result<Vec<(StyleInput, std::result::Result<String, String>)>> {
    tokio::task::spawn_blocking(move || {
        let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
        for path in &load_paths {
            options = options.load_path(path);
        }

        inputs
            .into_iter()
            .map(|input| {
                let result = match &input {
                    StyleInput::File { source, .. } => grass::from_path(source, &options),
                    StyleInput::Merged { content, .. } => {
                        grass::from_string(content.clone(), &options)
                    }
                };
                (input, result.map_err(|e| e.to_string()))
            })
            .collect()
    })
    .await
    .context("Style compiler thread panicked")
}

/// Minify compiled CSS
pub fn minify_css(css: &str, filename: &str) -> std::result::Result<String, String> {
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| e.to_string())?;
    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| e.to_string())?;
    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;
    Ok(printed.code)
}

/// Global stylesheets + `modules.scss` -> `assets/css/*.css`
pub struct CompileStyles;

#[async_trait]
impl Task for CompileStyles {
    fn id(&self) -> TaskId {
        TaskId::CompileStyles
    }

    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport> {
        let config = &ctx.config;
        let styles_dir = config.styles_dir();
        let out_dir = config.css_output_dir();
        let mut report = TaskReport::default();

        let mut inputs: Vec<StyleInput> = SourceSet::new(&styles_dir, &["**/*.scss"])?
            .skip_partials()
            .discover()
            .into_iter()
            .map(|file| StyleInput::File {
                output: out_dir.join(file.relative.with_extension("css")),
                source: file.path,
            })
            .collect();

        let remembered = ctx.state.merged_styles.read().clone();
        let merged = match remembered {
            Some(artifact) => Some(artifact.content.clone()),
            None => read_staged(ctx, FragmentKind::Style).await?,
        };
        match merged {
            Some(content) => inputs.push(StyleInput::Merged {
                content,
                output: out_dir.join("modules.css"),
            }),
            None => debug!("No merged component styles, compiling global styles only"),
        }

        let load_paths = vec![styles_dir, config.components_dir()];
        let mut changed = Vec::new();

        for (input, result) in compile_all(inputs, load_paths).await? {
            let css = match result {
                Ok(css) => css,
                Err(message) => {
                    report.record_error(
                        PipelineError::new("CompileError", PLUGIN, message)
                            .with_file(input.source_label()),
                    );
                    continue;
                }
            };

            let output = input.output();
            let written = write_if_changed(output, css.as_bytes()).await?;
            report.record_output(output, css.len(), written);
            if written {
                changed.push(output.to_path_buf());
            }

            if config.styles.minify {
                let filename = output.display().to_string();
                match minify_css(&css, &filename) {
                    Ok(min) => {
                        let min_path = with_suffix(output, ".min");
                        let written = write_if_changed(&min_path, min.as_bytes()).await?;
                        report.record_output(&min_path, min.len(), written);
                    }
                    Err(message) => report.record_error(
                        PipelineError::new("MinifyError", "lightningcss", message)
                            .with_file(output),
                    ),
                }
            }
        }

        if !changed.is_empty() {
            info!("Compiled {} stylesheet(s)", changed.len());
            let output_dir = config.output_dir();
            let urls = changed
                .iter()
                .filter_map(|path| relative_path(&output_dir, path))
                .map(|rel| format!("/{}", rel))
                .collect();
            ctx.reload.css_updated(urls);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::{LiveReload, ReloadMessage};
    use std::fs;
    use std::sync::Arc;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_minify_css() {
        let min = minify_css("body {\n  color: #ff0000;\n}\n\n.a {\n  margin: 0px;\n}\n", "test.css")
            .unwrap();
        assert!(min.starts_with("body{color:"));
        assert!(!min.contains('\n'));
        assert!(!min.contains(' '));
    }

    #[tokio::test]
    async fn test_compiles_partials_imports_and_mirrors_tree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/static/styles/_vars.scss", "$accent: blue;");
        write(
            dir.path(),
            "src/static/styles/pages/home.scss",
            "@import 'vars';\n.home { a { color: $accent; } }",
        );
        let ctx = BuildContext::new(Arc::new(Config::with_root(dir.path())), LiveReload::disabled());

        let report = CompileStyles.run(&ctx).await.unwrap();

        assert!(report.is_clean(), "{:?}", report.errors);
        let css = fs::read_to_string(dir.path().join("dest/assets/css/pages/home.css")).unwrap();
        assert!(css.contains(".home a"));
        assert!(css.contains("color: blue"));
        assert!(!dir.path().join("dest/assets/css/_vars.css").exists());
        assert!(!dir.path().join("dest/assets/css/modules.css").exists());
    }

    #[tokio::test]
    async fn test_broken_file_is_reported_and_others_compile() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/static/styles/good.scss", ".good { color: red; }");
        write(dir.path(), "src/static/styles/bad.scss", ".bad { color: red;");
        let ctx = BuildContext::new(Arc::new(Config::with_root(dir.path())), LiveReload::disabled());

        let report = CompileStyles.run(&ctx).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].plugin, "scss");
        assert!(report.errors[0].file.as_ref().unwrap().ends_with("bad.scss"));
        assert!(dir.path().join("dest/assets/css/good.css").exists());
    }

    #[tokio::test]
    async fn test_minified_sibling_and_css_notification() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/static/styles/main.scss", "body { color: #ff0000; }");
        let mut config = Config::with_root(dir.path());
        config.styles.minify = true;
        let reload = LiveReload::new();
        let mut rx = reload.subscribe();
        let ctx = BuildContext::new(Arc::new(config), reload);

        CompileStyles.run(&ctx).await.unwrap();

        let min = fs::read_to_string(dir.path().join("dest/assets/css/main.min.css")).unwrap();
        assert!(min.starts_with("body{color:"));
        assert_eq!(
            rx.try_recv().unwrap(),
            ReloadMessage::CssUpdate {
                paths: vec!["/assets/css/main.css".to_string()]
            }
        );

        // Nothing changed: no second notification
        CompileStyles.run(&ctx).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
