//! Blocksmith library
//!
//! Core functionality for the Blocksmith site builder: component fragment
//! aggregation, the style, template, script and asset pipelines, the task
//! orchestrator and the live-reload development server.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod server;
pub mod source;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use orchestrator::{Orchestrator, Target};
