//! Command-line interface for Blocksmith
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build-css`, `build-html`, `build-js`, `copy-images`, `copy-assets`:
//!   the individual build targets
//! - `build`: every target at once
//! - `clean`: remove the output tree and the staging area
//! - `serve`: development server with live reload
//! - `dev`: clean, build, then serve
//! - `init`: project scaffolding

mod build;
mod dev;
mod init;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::orchestrator::Target;

pub use build::{clean, run_target};
pub use dev::{DevServerOptions, ServeCommand};
pub use init::InitCommand;

/// Blocksmith - component-oriented static site builder
#[derive(Parser, Debug)]
#[command(name = "blocksmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to blocksmith.toml config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge component styles and compile every stylesheet
    BuildCss,

    /// Merge component data and render every page
    BuildHtml,

    /// Merge component scripts and bundle every script
    BuildJs,

    /// Copy images into the output tree
    CopyImages,

    /// Copy pre-built css, js and font assets into the output tree
    CopyAssets,

    /// Run every build target
    Build,

    /// Remove the output tree and the staging area
    Clean,

    /// Start the development server with live reload
    Serve(ServeCommand),

    /// Clean, build, then start the development server
    Dev(ServeCommand),

    /// Initialize a new project
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::BuildCss => run_target(load_config(&self.config)?, Target::BuildCss).await,
            Commands::BuildHtml => run_target(load_config(&self.config)?, Target::BuildHtml).await,
            Commands::BuildJs => run_target(load_config(&self.config)?, Target::BuildJs).await,
            Commands::CopyImages => {
                run_target(load_config(&self.config)?, Target::CopyImages).await
            }
            Commands::CopyAssets => {
                run_target(load_config(&self.config)?, Target::CopyAssets).await
            }
            Commands::Build => run_target(load_config(&self.config)?, Target::Build).await,
            Commands::Clean => clean(load_config(&self.config)?).await,
            Commands::Serve(cmd) => cmd.execute(load_config(&self.config)?, false).await,
            Commands::Dev(cmd) => cmd.execute(load_config(&self.config)?, true).await,
            Commands::Init(cmd) => cmd.execute().await,
        }
    }
}

/// Load the config file. The default file is optional; an explicitly named
/// one must exist.
fn load_config(path: &str) -> Result<Config> {
    if path == DEFAULT_CONFIG_FILE {
        info!("Loading configuration from {} if present", path);
        Config::load_or_default(path)
    } else {
        info!("Loading configuration from {}", path);
        Config::load(Path::new(path))
    }
}

/// Print the Blocksmith banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚒".cyan(),
        "Blocksmith".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
