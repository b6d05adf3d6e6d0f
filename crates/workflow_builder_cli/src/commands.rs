// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use workflow_builder_graph::document::deserialize;
use workflow_builder_graph::{
    builtin_behaviors, builtin_registry, ExecutionOptions, ExecutionTrace, Executor, Graph,
    LoadedGraph, NodeCategory, NodeId, NodeRegistry, PortValue, RunContext, WorkflowDocument,
};

use crate::cli::{Cli, Command};
use crate::settings::Settings;

/// Tracing target for command events
pub const TRACING_TARGET_COMMANDS: &str = "workflow_builder_cli::commands";

/// Run the parsed command
pub async fn dispatch(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    let mut catalogs = settings.catalogs.clone();
    catalogs.extend(cli.catalogs);
    let registry = load_registry(&catalogs)?;

    match cli.command {
        Command::Types { category, json } => list_types(&registry, category, json),
        Command::Validate { file, strict } => validate(&file, registry, strict),
        Command::Inspect { file } => inspect(&file, registry),
        Command::Run {
            file,
            inputs,
            timeout,
            max_concurrency,
            json,
        } => {
            let mut options = settings.executor.to_options();
            if let Some(secs) = timeout {
                options.node_timeout = Some(std::time::Duration::from_secs(secs));
            }
            if let Some(limit) = max_concurrency {
                options.max_concurrency = usize::try_from(limit).unwrap_or(usize::MAX);
            }
            run(&file, registry, inputs, options, json).await
        }
        Command::New { file, force } => create(&file, force),
        Command::InitSettings { file, force } => write_settings(&settings, &file, force),
    }
}

fn write_settings(settings: &Settings, path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }

    settings
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

/// Built-in catalog, extended with any RON catalogs
fn load_registry(catalogs: &[PathBuf]) -> anyhow::Result<Arc<NodeRegistry>> {
    if catalogs.is_empty() {
        return Ok(builtin_registry());
    }

    let mut registry = (*builtin_registry()).clone();
    for path in catalogs {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let added = registry
            .extend_from_ron(&source)
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        tracing::debug!(
            target: TRACING_TARGET_COMMANDS,
            catalog = %path.display(),
            types = added,
            "loaded node catalog"
        );
    }
    Ok(Arc::new(registry))
}

fn load_workflow(path: &Path, registry: Arc<NodeRegistry>) -> anyhow::Result<LoadedGraph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let document = WorkflowDocument::from_json(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    deserialize(&document, registry).with_context(|| format!("failed to load {}", path.display()))
}

fn list_types(
    registry: &NodeRegistry,
    category: Option<NodeCategory>,
    json: bool,
) -> anyhow::Result<()> {
    let types: Vec<_> = registry
        .types()
        .filter(|schema| category.map_or(true, |c| schema.category == c))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&types)?);
        return Ok(());
    }

    for schema in types {
        println!(
            "{:<16} {:<16} {:<15} {}",
            schema.type_name,
            schema.title,
            schema.category.display_name(),
            schema.description
        );
    }
    Ok(())
}

fn validate(path: &Path, registry: Arc<NodeRegistry>, strict: bool) -> anyhow::Result<()> {
    let LoadedGraph { graph, warnings } = load_workflow(path, registry)?;
    let mut problems = 0;

    for warning in &warnings {
        println!("warning: {warning}");
    }
    if strict {
        problems += warnings.len();
    }

    for issue in graph.issues() {
        println!("error: {issue}");
        problems += 1;
    }

    if let Err(cycle) = graph.topological_order() {
        println!("error: {cycle}");
        problems += 1;
    }

    if problems > 0 {
        bail!("{} has {problems} problem(s)", path.display());
    }

    println!(
        "{}: {} nodes, {} connections, ready to run",
        path.display(),
        graph.node_count(),
        graph.connection_count()
    );
    Ok(())
}

fn inspect(path: &Path, registry: Arc<NodeRegistry>) -> anyhow::Result<()> {
    let LoadedGraph { graph, .. } = load_workflow(path, registry)?;

    for node in graph.nodes() {
        let schema = graph.schema(node.id)?;
        let ports = graph.effective_ports(node.id)?;
        println!(
            "{} {} \"{}\" at ({}, {})",
            node.id,
            node.type_name,
            node.display_name().unwrap_or(&schema.title),
            node.position.x,
            node.position.y
        );
        for port in ports.inputs {
            let marker = if port.required { " (required)" } else { "" };
            println!("    in  {}: {}{marker}", port.id, port.data_type);
        }
        for port in ports.outputs {
            println!("    out {}: {}", port.id, port.data_type);
        }
    }

    if graph.connection_count() > 0 {
        println!();
    }
    for connection in graph.connections() {
        let e = &connection.endpoints;
        println!(
            "{}.{} -> {}.{}",
            e.source_node, e.source_port, e.target_node, e.target_port
        );
    }
    Ok(())
}

async fn run(
    path: &Path,
    registry: Arc<NodeRegistry>,
    inputs: Vec<(NodeId, String)>,
    options: ExecutionOptions,
    json: bool,
) -> anyhow::Result<()> {
    let LoadedGraph { graph, .. } = load_workflow(path, registry)?;

    let token = CancellationToken::new();
    let mut context = RunContext::new().cancel_with(token.clone());
    for (node_id, text) in inputs {
        if graph.node(node_id).is_none() {
            bail!("{node_id} is not in {}", path.display());
        }
        context = context.supply(node_id, text);
    }

    let watcher = tokio::spawn(cancel_on_ctrl_c(token));
    let executor = Executor::new(builtin_behaviors()).with_options(options);
    let result = executor.run_with(&graph, context).await;
    watcher.abort();

    match result {
        Ok(trace) => print_trace(&graph, &trace, json),
        Err(error) => {
            if let Some(trace) = error.trace() {
                print_trace(&graph, trace, json)?;
            }
            Err(error).context("workflow run failed")
        }
    }
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!(target: TRACING_TARGET_COMMANDS, "interrupt received, cancelling run");
        token.cancel();
    }
}

fn print_trace(graph: &Graph, trace: &ExecutionTrace, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(trace)?);
        return Ok(());
    }

    println!("run {}", trace.run_id);
    for record in &trace.records {
        let name = graph
            .node(record.node_id)
            .and_then(|node| node.display_name())
            .unwrap_or(&record.type_name);
        println!("{} {name} ({:?})", record.node_id, record.elapsed);
        for (port, value) in &record.outputs.values {
            println!("    {port} = {}", describe(value));
        }
    }
    Ok(())
}

fn describe(value: &PortValue) -> String {
    match value {
        PortValue::String(text) => format!("{text:?}"),
        PortValue::Number(number) => number.to_string(),
        PortValue::File(file) | PortValue::Audio(file) | PortValue::Image(file) => {
            format!("<{}>", file.name)
        }
        PortValue::Json(json) => json.to_string(),
    }
}

fn create(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }

    let document = WorkflowDocument::default();
    std::fs::write(path, document.to_json()?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("created {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_builder_graph::{Endpoints, Position};

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("workflow-builder-cmd-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_describe_values() {
        assert_eq!(describe(&PortValue::from("hi")), "\"hi\"");
        assert_eq!(describe(&PortValue::from(2.5)), "2.5");
    }

    #[test]
    fn test_new_refuses_to_overwrite() {
        let path = scratch_dir().join("new.json");
        let _ = std::fs::remove_file(&path);

        create(&path, false).unwrap();
        assert!(create(&path, false).is_err());
        create(&path, true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let document = WorkflowDocument::from_json(&text).unwrap();
        assert!(document.nodes.is_empty());
        assert!(document.connections.is_empty());
    }

    #[test]
    fn test_init_settings_writes_loadable_file() {
        let path = scratch_dir().join("settings.ron");
        let _ = std::fs::remove_file(&path);

        let mut settings = Settings::default();
        settings.executor.max_concurrency = 2;
        write_settings(&settings, &path, false).unwrap();
        assert!(write_settings(&settings, &path, false).is_err());

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_catalog_extends_builtins() {
        let path = scratch_dir().join("catalog.ron");
        std::fs::write(
            &path,
            r#"[(
                type_name: "relay",
                title: "Relay",
                description: "Passes data on",
                category: processing,
                inputs: [(id: "in", label: "In", data_type: "any")],
                outputs: [(id: "out", label: "Out", data_type: "any")],
            )]"#,
        )
        .unwrap();

        let registry = load_registry(&[path]).unwrap();
        assert!(registry.get("relay").is_some());
        assert!(registry.get("textInput").is_some());
        assert_eq!(registry.len(), builtin_registry().len() + 1);
    }

    #[test]
    fn test_validate_reports_unconnected_inputs() {
        let dir = scratch_dir();
        let mut graph = Graph::default();
        let text = graph.add_node("textInput", Position::default()).unwrap();
        let processor = graph.add_node("textProcessor", Position::default()).unwrap();

        let broken = dir.join("broken.json");
        std::fs::write(&broken, graph.to_document().to_json().unwrap()).unwrap();
        assert!(validate(&broken, builtin_registry(), false).is_err());

        graph
            .connect(Endpoints::new(text, "text", processor, "text"))
            .unwrap();
        let ready = dir.join("ready.json");
        std::fs::write(&ready, graph.to_document().to_json().unwrap()).unwrap();
        validate(&ready, builtin_registry(), true).unwrap();
    }

    #[tokio::test]
    async fn test_run_rejects_unknown_input_node() {
        let path = scratch_dir().join("run.json");
        let mut graph = Graph::default();
        graph.add_node("textInput", Position::default()).unwrap();
        std::fs::write(&path, graph.to_document().to_json().unwrap()).unwrap();

        let inputs = vec![(NodeId(9), "hello".to_string())];
        let options = ExecutionOptions::default();
        let result = run(&path, builtin_registry(), inputs, options, false).await;
        assert!(result.is_err());

        let inputs = vec![(NodeId(1), "hello".to_string())];
        run(&path, builtin_registry(), inputs, ExecutionOptions::default(), false)
            .await
            .unwrap();
    }
}
