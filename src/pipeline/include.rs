//! Script include directives
//!
//! ```js
//! //= include lib/helpers.js
//! //= require vendor/*.js
//! ```
//!
//! Each directive line is replaced by the referenced file, itself resolved
//! recursively. Paths are relative to the including file; `.js` is appended
//! when no extension is given. `require` inlines a file at most once per
//! bundle, `include` every time it appears.

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use regex::Regex;

use super::PipelineError;
use crate::source::SourceSet;

const PLUGIN: &str = "include";

static DIRECTIVE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*//=[ \t]*(include|require)[ \t]+["']?([^"'\s]+)["']?[ \t]*\r?$"#)
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKind {
    Include,
    Require,
}

#[derive(Debug)]
struct Directive {
    span: Range<usize>,
    kind: DirectiveKind,
    target: String,
}

fn parse_directives(source: &str) -> Vec<Directive> {
    DIRECTIVE_REGEX
        .captures_iter(source)
        .filter_map(|cap| {
            let span = cap.get(0)?.range();
            let kind = match cap.get(1)?.as_str() {
                "require" => DirectiveKind::Require,
                _ => DirectiveKind::Include,
            };
            Some(Directive {
                span,
                kind,
                target: cap.get(2)?.as_str().to_string(),
            })
        })
        .collect()
}

fn include_error(message: impl Into<String>, file: &Path) -> PipelineError {
    PipelineError::new("IncludeError", PLUGIN, message).with_file(file)
}

/// Resolves the include directives of one bundle
#[derive(Debug, Default)]
pub struct IncludeResolver {
    /// Every file inlined so far
    included: HashSet<PathBuf>,

    /// Files currently being expanded, for cycle detection
    stack: Vec<PathBuf>,
}

impl IncludeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files inlined into the bundle, excluding the entry itself
    pub fn included(&self) -> impl Iterator<Item = &Path> {
        self.included.iter().map(|p| p.as_path())
    }

    /// Expand all directives of `source`, the content of `entry`
    pub async fn resolve(&mut self, entry: &Path, source: String) -> Result<String, PipelineError> {
        let entry = tokio::fs::canonicalize(entry)
            .await
            .map_err(|e| include_error(e.to_string(), entry))?;
        self.expand(entry, source).await
    }

    fn expand(&mut self, path: PathBuf, source: String) -> BoxFuture<'_, Result<String, PipelineError>> {
        async move {
            let directives = parse_directives(&source);
            if directives.is_empty() {
                return Ok(source);
            }

            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            self.stack.push(path.clone());

            let mut output = String::with_capacity(source.len());
            let mut last = 0;
            for directive in directives {
                output.push_str(&source[last..directive.span.start]);
                last = directive.span.end;

                let targets = expand_target(&dir, &directive.target);
                if targets.is_empty() {
                    return Err(include_error(
                        format!("No file matches '{}'", directive.target),
                        &path,
                    ));
                }

                let mut pieces = Vec::with_capacity(targets.len());
                for target in targets {
                    let target = tokio::fs::canonicalize(&target).await.map_err(|e| {
                        include_error(format!("{}: {}", target.display(), e), &path)
                    })?;

                    if self.stack.contains(&target) {
                        return Err(include_error(
                            format!("Include cycle through {}", target.display()),
                            &path,
                        ));
                    }
                    if directive.kind == DirectiveKind::Require && self.included.contains(&target) {
                        continue;
                    }
                    self.included.insert(target.clone());

                    let content = tokio::fs::read_to_string(&target)
                        .await
                        .map_err(|e| include_error(format!("{}: {}", target.display(), e), &path))?;
                    let expanded = self.expand(target, content).await?;
                    pieces.push(expanded.trim_end_matches(|c: char| c == '\n' || c == '\r').to_string());
                }
                output.push_str(&pieces.join("\n"));
            }
            output.push_str(&source[last..]);

            self.stack.pop();
            Ok(output)
        }
        .boxed()
    }
}

/// Files a directive target refers to, relative to `dir`
fn expand_target(dir: &Path, target: &str) -> Vec<PathBuf> {
    if target.contains(|c: char| matches!(c, '*' | '?' | '[' | '{')) {
        return SourceSet::new(dir, &[target])
            .map(|set| set.discover().into_iter().map(|f| f.path).collect())
            .unwrap_or_default();
    }

    let mut path = dir.join(target);
    if path.extension().is_none() {
        path.set_extension("js");
    }
    vec![path]
}
