// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line front end for workflow documents.
//!
//! Lists the node catalog, checks and inspects saved workflows, and runs
//! them with the built-in node behaviors.

mod cli;
mod commands;
mod settings;

use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::settings::Settings;

/// Tracing target for start-up and shutdown events
pub const TRACING_TARGET_LIFECYCLE: &str = "workflow_builder_cli::lifecycle";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_LIFECYCLE,
            error = %error,
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings =
        Settings::discover(cli.config.as_deref()).context("failed to load settings")?;

    let directive = cli.log_level.as_deref().unwrap_or(&settings.log_level);
    init_tracing(directive);

    tracing::debug!(
        target: TRACING_TARGET_LIFECYCLE,
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "starting workflow builder"
    );

    commands::dispatch(cli, settings).await
}

/// Initializes tracing; `RUST_LOG` wins over the configured directive
fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
