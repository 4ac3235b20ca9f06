//! Project initialization command

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::DEFAULT_CONFIG_FILE;

/// Initialize a new project
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: String,

    /// Overwrite files that already exist
    #[arg(long)]
    pub force: bool,
}

const CONFIG: &str = r#"# Blocksmith configuration

[paths]
pages = "src/pages"
styles = "src/static/styles"
scripts = "src/static/scripts"
images = "src/static/images"
assets = "src/static/assets"
components = "src/components"
staging = "tmp"
output = "dest"

[styles]
minify = false

[scripts]
min_suffix = ".min"
emit_modules = false

[server]
host = "localhost"
port = 3000
open = false
live_reload = true
"#;

const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{% block title %}{{ site.title }}{% endblock title %}</title>
    <link rel="stylesheet" href="/assets/css/main.css" />
    <link rel="stylesheet" href="/assets/css/modules.css" />
  </head>
  <body>
    {% include "components/header/header.html" %}
    <main>{% block content %}{% endblock content %}</main>
    <script src="/assets/js/app.min.js"></script>
  </body>
</html>
"#;

const INDEX: &str = r#"{% extends "_layout.html" %}

{% block content %}
<p>Edit <code>src/pages/index.html</code> and save to reload.</p>
{% endblock content %}
"#;

const HEADER_HTML: &str = r#"<header class="header">
  <h1 class="header__title">{{ header.title }}</h1>
</header>
"#;

const HEADER_SCSS: &str = r#"@import 'variables';

.header {
  padding: $spacing;

  &__title {
    margin: 0;
  }
}
"#;

const HEADER_JSON: &str = r#"{
  "site": { "title": "My site" },
  "header": { "title": "Hello from Blocksmith" }
}
"#;

const HEADER_JS: &str = r#"document.querySelector('.header__title').addEventListener('click', function () {
  console.log('header clicked');
});
"#;

const VARIABLES: &str = "$spacing: 1.5rem;\n";

const MAIN_SCSS: &str = r#"@import 'variables';

body {
  margin: 0;
  font-family: system-ui, sans-serif;
}
"#;

const HELPERS_JS: &str = r#"function ready(fn) {
  if (document.readyState !== 'loading') {
    fn();
  } else {
    document.addEventListener('DOMContentLoaded', fn);
  }
}
"#;

const APP_JS: &str = r#"//= include _helpers.js

ready(function () {
  console.log('ready');
});
"#;

/// Files of a fresh project, relative to the project directory
const FILES: &[(&str, &str)] = &[
    (DEFAULT_CONFIG_FILE, CONFIG),
    ("src/pages/_layout.html", LAYOUT),
    ("src/pages/index.html", INDEX),
    ("src/components/header/header.html", HEADER_HTML),
    ("src/components/header/header.scss", HEADER_SCSS),
    ("src/components/header/header.json", HEADER_JSON),
    ("src/components/header/header.js", HEADER_JS),
    ("src/static/styles/_variables.scss", VARIABLES),
    ("src/static/styles/main.scss", MAIN_SCSS),
    ("src/static/scripts/_helpers.js", HELPERS_JS),
    ("src/static/scripts/app.js", APP_JS),
];

/// Directories created empty
const DIRS: &[&str] = &[
    "src/static/images",
    "src/static/assets/css",
    "src/static/assets/js",
    "src/static/assets/fonts",
];

impl InitCommand {
    pub async fn execute(&self) -> Result<()> {
        let project_dir = Path::new(&self.dir);

        eprintln!("{} Initializing new project...\n", "→".blue());

        scaffold(project_dir, self.force)?;

        eprintln!(
            "\n{} Project initialized successfully!\n",
            "✓".green().bold()
        );

        eprintln!("  Next steps:");
        if self.dir != "." {
            eprintln!("    {} cd {}", "→".dimmed(), self.dir.cyan());
        }
        eprintln!("    {} blocksmith dev", "→".dimmed());
        eprintln!();

        Ok(())
    }
}

/// Write the sample project into `project_dir`. Existing files are kept
/// unless `force` is set.
fn scaffold(project_dir: &Path, force: bool) -> Result<()> {
    for (rel, content) in FILES {
        let path = project_dir.join(rel);
        if path.exists() && !force {
            eprintln!("  {} Skipped {} (exists)", "•".dimmed(), rel.yellow());
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", rel))?;
        eprintln!("  {} Created {}", "✓".green(), rel.cyan());
    }

    for rel in DIRS {
        fs::create_dir_all(project_dir.join(rel))
            .with_context(|| format!("Failed to create {}", rel))?;
    }

    Ok(())
}
