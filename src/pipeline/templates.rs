//! Page rendering
//!
//! Page templates are Tera templates. Every template under the pages
//! directory is loaded under its relative path, and every template under the
//! components directory under `components/<relative path>`, so pages can
//! `extends`, `include` and `import` them. Pages whose file name starts with
//! `_` are layouts or partials and are not rendered on their own.
//!
//! The merged component data is the template context. Rendered pages are
//! pretty-printed before they are written.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;
use tera::{Context, Tera};
use tracing::{debug, info};

use super::pretty::pretty_html;
use super::{error_chain, BuildContext, PipelineError, Task, TaskId, TaskReport};
use crate::aggregate::{read_staged, FragmentKind};
use crate::source::SourceSet;
use crate::utils::{is_partial, path_to_slash, write_if_changed};

const PLUGIN: &str = "tera";

/// Prefix under which component templates are registered
pub const COMPONENT_PREFIX: &str = "components/";

struct Page {
    name: String,
    source: PathBuf,
    output: PathBuf,
}

type Rendered = Vec<(Page, std::result::Result<String, PipelineError>)>;

/// Load every template and render every page on a blocking thread
async fn render_pages(
    templates: Vec<(PathBuf, Option<String>)>,
    pages: Vec<Page>,
    context: Context,
) -> Result<std::result::Result<Rendered, PipelineError>> {
    tokio::task::spawn_blocking(move || {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_template_files(templates) {
            return Err(PipelineError::new("TemplateError", PLUGIN, error_chain(&e)));
        }

        Ok(pages
            .into_iter()
            .map(|page| {
                let result = tera
                    .render(&page.name, &context)
                    .map(|html| pretty_html(&html))
                    .map_err(|e| {
                        PipelineError::new("TemplateError", PLUGIN, error_chain(&e))
                            .with_file(&page.source)
                    });
                (page, result)
            })
            .collect())
    })
    .await
    .context("Template renderer thread panicked")
}

/// Data for templates rendered without a merge in the same run: read the
/// staged `modules.json`. Failures are logged and yield no data.
async fn staged_data(ctx: &BuildContext, report: &mut TaskReport) -> Result<Value> {
    let path = ctx.config.staging_dir().join(FragmentKind::Data.artifact_name());
    let error = |message: String| PipelineError::new("DataError", "data", message).with_file(&path);

    match read_staged(ctx, FragmentKind::Data).await? {
        Some(content) => match serde_json::from_str(&content) {
            Ok(value) => Ok(value),
            Err(e) => {
                report.record_error(error(e.to_string()));
                Ok(Value::Null)
            }
        },
        None => {
            report.record_error(error("merged data not found".to_string()));
            Ok(Value::Null)
        }
    }
}

/// `pages/**/[^_]*.html` + merged data -> `dest/**/*.html`
pub struct CompilePages;

#[async_trait]
impl Task for CompilePages {
    fn id(&self) -> TaskId {
        TaskId::CompilePages
    }

    async fn run(&self, ctx: &BuildContext) -> Result<TaskReport> {
        let config = &ctx.config;
        let out_dir = config.output_dir();
        let mut report = TaskReport::default();

        let remembered = ctx.state.merged_data.read().clone();
        let data = match remembered {
            Some(data) => data.value.clone(),
            None => staged_data(ctx, &mut report).await?,
        };
        let context = Context::from_value(data).unwrap_or_else(|_| {
            debug!("Template data is not an object, rendering without context");
            Context::new()
        });

        let page_files = SourceSet::new(config.pages_dir(), &["**/*.html"])?.discover();
        let component_files = SourceSet::new(config.components_dir(), &["**/*.html"])?.discover();

        let mut templates = Vec::with_capacity(page_files.len() + component_files.len());
        let mut pages = Vec::new();
        for file in page_files {
            let name = path_to_slash(&file.relative);
            if !is_partial(&file.path) {
                pages.push(Page {
                    name: name.clone(),
                    source: file.path.clone(),
                    output: out_dir.join(&file.relative),
                });
            }
            templates.push((file.path, Some(name)));
        }
        for file in component_files {
            let name = format!("{}{}", COMPONENT_PREFIX, path_to_slash(&file.relative));
            templates.push((file.path, Some(name)));
        }

        let rendered = match render_pages(templates, pages, context).await? {
            Ok(rendered) => rendered,
            Err(err) => {
                report.record_error(err);
                return Ok(report);
            }
        };

        let mut changed = 0;
        for (page, result) in rendered {
            match result {
                Ok(html) => {
                    let written = write_if_changed(&page.output, html.as_bytes()).await?;
                    report.record_output(&page.output, html.len(), written);
                    changed += usize::from(written);
                }
                Err(err) => report.record_error(err),
            }
        }

        if changed > 0 {
            info!("Rendered {} page(s)", changed);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::LiveReload;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn context(root: &Path) -> BuildContext {
        BuildContext::new(Arc::new(Config::with_root(root)), LiveReload::disabled())
    }

    #[tokio::test]
    async fn test_renders_pages_with_layouts_components_and_data() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "src/pages/_layout.html",
            "<body>{% block content %}{% endblock content %}</body>",
        );
        write(
            dir.path(),
            "src/pages/blog/post.html",
            "{% extends \"_layout.html\" %}{% block content %}{% include \"components/card/card.html\" %}{% endblock content %}",
        );
        write(dir.path(), "src/components/card/card.html", "<div>{{ card.title }}</div>");
        write(dir.path(), "tmp/modules.json", r#"{"card": {"title": "First post"}}"#);

        let report = CompilePages.run(&context(dir.path())).await.unwrap();

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(
            fs::read_to_string(dir.path().join("dest/blog/post.html")).unwrap(),
            "<body>\n  <div>First post</div>\n</body>\n"
        );
        assert!(!dir.path().join("dest/_layout.html").exists());
    }

    #[tokio::test]
    async fn test_missing_data_degrades_to_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "src/pages/index.html",
            "<h1>{{ title | default(value=\"Untitled\") }}</h1>",
        );

        let report = CompilePages.run(&context(dir.path())).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name, "DataError");
        assert_eq!(
            fs::read_to_string(dir.path().join("dest/index.html")).unwrap(),
            "<h1>Untitled</h1>\n"
        );
    }

    #[tokio::test]
    async fn test_pages_are_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tmp/modules.json", r#"{"items": ["One", "Two"]}"#);
        write(
            dir.path(),
            "src/pages/list.html",
            "<main><ul>{% for item in items %}<li>{{ item }}</li>{% endfor %}</ul></main>",
        );

        let report = CompilePages.run(&context(dir.path())).await.unwrap();

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(
            fs::read_to_string(dir.path().join("dest/list.html")).unwrap(),
            "<main>\n  <ul>\n    <li>One</li>\n    <li>Two</li>\n  </ul>\n</main>\n"
        );
    }

    #[tokio::test]
    async fn test_invalid_data_degrades_to_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/pages/index.html", "<p>ok</p>");
        write(dir.path(), "tmp/modules.json", "{ not json");

        let report = CompilePages.run(&context(dir.path())).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(dir.path().join("dest/index.html").exists());
    }

    #[tokio::test]
    async fn test_render_error_is_reported_per_page() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tmp/modules.json", "{}");
        write(dir.path(), "src/pages/good.html", "<p>good</p>");
        write(dir.path(), "src/pages/bad.html", "{{ missing.field }}");

        let report = CompilePages.run(&context(dir.path())).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].plugin, "tera");
        assert!(report.errors[0].file.as_ref().unwrap().ends_with("bad.html"));
        assert!(dir.path().join("dest/good.html").exists());
    }

    #[tokio::test]
    async fn test_syntax_error_aborts_rendering_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tmp/modules.json", "{}");
        write(dir.path(), "src/pages/index.html", "{% if %}");

        let report = CompilePages.run(&context(dir.path())).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("index.html"));
        assert!(!dir.path().join("dest/index.html").exists());
    }
}
