// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use workflow_builder_graph::{NodeCategory, NodeId};

use crate::settings::SETTINGS_FILE_NAME;

/// Build, check and run node-graph workflows
#[derive(Debug, Parser)]
#[command(name = "workflow-builder", version, about)]
pub struct Cli {
    /// Settings file (defaults to ./workflow-builder.ron when present)
    #[arg(long, global = true, env = "WORKFLOW_BUILDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `workflow_builder_graph=trace`
    #[arg(long, global = true, env = "WORKFLOW_BUILDER_LOG")]
    pub log_level: Option<String>,

    /// Extra RON node catalog to load on top of the built-in types
    #[arg(long = "catalog", global = true, value_name = "FILE")]
    pub catalogs: Vec<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the node types in the catalog
    Types {
        /// Only list types in this category
        #[arg(long, value_parser = parse_category)]
        category: Option<NodeCategory>,

        /// Print the full schemas as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a workflow and report everything that would stop it running
    Validate {
        /// Workflow document
        file: PathBuf,

        /// Treat load repairs as errors
        #[arg(long)]
        strict: bool,
    },

    /// Print a workflow's nodes, ports and connections
    Inspect {
        /// Workflow document
        file: PathBuf,
    },

    /// Run a workflow with the built-in node behaviors
    Run {
        /// Workflow document
        file: PathBuf,

        /// Text handed to an input node, as `node-N=value`
        #[arg(long = "input", value_name = "NODE=VALUE", value_parser = parse_supplied)]
        inputs: Vec<(NodeId, String)>,

        /// Per-node time limit in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Nodes allowed to run at once
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_concurrency: Option<u64>,

        /// Print the trace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write an empty workflow document
    New {
        /// Destination
        file: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Write the current settings to a settings file
    InitSettings {
        /// Destination
        #[arg(default_value = SETTINGS_FILE_NAME)]
        file: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_category(value: &str) -> Result<NodeCategory, String> {
    value.parse()
}

fn parse_supplied(value: &str) -> Result<(NodeId, String), String> {
    let (node, text) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NODE=VALUE, got {value:?}"))?;
    let node = node.trim().parse::<NodeId>().map_err(|e| e.to_string())?;
    Ok((node, text.to_string()))
}
