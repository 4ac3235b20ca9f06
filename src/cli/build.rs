//! Build and clean command implementation

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::orchestrator::{BuildReport, Orchestrator, Target};
use crate::server::LiveReload;
use crate::utils::{format_duration, format_size};

/// Run one build target once and print what it wrote
pub async fn run_target(config: Config, target: Target) -> Result<()> {
    let orchestrator = Orchestrator::new(Arc::new(config), LiveReload::disabled());

    eprintln!("{} Running {}...", "→".blue(), target.to_string().cyan());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("  {spinner:.cyan} {msg}")?);
    spinner.set_message(format!("{} in progress", target));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let result = orchestrator.run(target).await;
    spinner.finish_and_clear();

    print_summary(orchestrator.config(), target, &result?);
    Ok(())
}

/// Remove the output tree and the staging area
pub async fn clean(config: Config) -> Result<()> {
    let orchestrator = Orchestrator::new(Arc::new(config), LiveReload::disabled());
    orchestrator.clean().await?;

    eprintln!("{} Cleaned output and staging directories\n", "✓".green().bold());
    Ok(())
}

/// Print the files a run wrote and the errors it logged
pub(crate) fn print_summary(config: &Config, target: Target, report: &BuildReport) {
    let errors = report.errors().count();
    let written: Vec<_> = report.written().collect();

    if errors == 0 {
        eprintln!(
            "\n{} Finished {} in {}\n",
            "✓".green().bold(),
            target,
            format_duration(report.duration)
        );
    } else {
        eprintln!(
            "\n{} Finished {} in {} with {} error(s)\n",
            "✗".red().bold(),
            target,
            format_duration(report.duration),
            errors
        );
    }

    for file in &written {
        let path = config
            .relative_to_root(&file.path)
            .unwrap_or_else(|| file.path.display().to_string());
        eprintln!(
            "  {} {} {}",
            "•".dimmed(),
            path.cyan(),
            format_size(file.size).dimmed()
        );
    }

    let unchanged = report.unchanged();
    if unchanged > 0 {
        eprintln!("  {} {} file(s) unchanged", "•".dimmed(), unchanged);
    }

    for error in report.errors() {
        eprintln!("  {} {}", "✗".red(), error);
    }

    eprintln!();
}
