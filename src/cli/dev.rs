//! Development server command implementation

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::build::print_summary;
use crate::config::Config;
use crate::orchestrator::{Orchestrator, Target};
use crate::server::{DevServer, LiveReload};

/// Start the development server with live reload
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Port to run the dev server on [default: 3000]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to [default: localhost]
    #[arg(long)]
    pub host: Option<String>,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,

    /// Disable live reload
    #[arg(long)]
    pub no_reload: bool,
}

impl ServeCommand {
    /// Serve the output tree; with `rebuild`, clean and build it first
    pub async fn execute(&self, config: Config, rebuild: bool) -> Result<()> {
        let options = DevServerOptions {
            host: self.host.clone().unwrap_or_else(|| config.server.host.clone()),
            port: self.port.unwrap_or(config.server.port),
            open: self.open || config.server.open,
        };
        let live_reload = config.server.live_reload && !self.no_reload;
        let reload = if live_reload {
            LiveReload::new()
        } else {
            LiveReload::disabled()
        };
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(config), reload));

        if rebuild {
            orchestrator.clean().await?;
            eprintln!("{} Building site...", "→".blue());
            let report = orchestrator.run(Target::Build).await?;
            print_summary(orchestrator.config(), Target::Build, &report);
        }

        eprintln!(
            "{} Starting dev server at {}\n",
            "→".blue(),
            format!("http://{}:{}", options.host, options.port)
                .cyan()
                .underline()
        );

        if live_reload {
            eprintln!("  {} Live reload {}", "•".dimmed(), "enabled".green());
        }

        eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        DevServer::new(orchestrator, options).start().await
    }
}

/// Development server options
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub host: String,
    pub port: u16,
    pub open: bool,
}
