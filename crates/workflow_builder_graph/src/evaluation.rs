// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph execution.
//!
//! A run works on a snapshot of the graph. Every node is checked before
//! anything executes; then nodes run as soon as all of their upstream nodes
//! have finished, with independent branches running concurrently up to
//! [`ExecutionOptions::max_concurrency`]. The first failure aborts the run and
//! the error carries the trace of everything that completed.

use crate::graph::{format_ids, CycleError, Graph};
use crate::node::NodeId;
use crate::port::{DataType, PortSpec, PortValue};
use crate::property::{Config, ConfigValue};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Values produced by a node, by output port
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeOutput {
    /// Output values by port ID
    pub values: IndexMap<String, PortValue>,
}

impl NodeOutput {
    /// Create a new empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an output value
    pub fn set(&mut self, port: impl Into<String>, value: impl Into<PortValue>) {
        self.values.insert(port.into(), value.into());
    }

    /// Builder form of [`NodeOutput::set`]
    pub fn with(mut self, port: impl Into<String>, value: impl Into<PortValue>) -> Self {
        self.set(port, value);
        self
    }

    /// Get an output value
    pub fn get(&self, port: &str) -> Option<&PortValue> {
        self.values.get(port)
    }
}

/// Everything a behavior gets to work with
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Node being executed
    pub node_id: NodeId,
    /// Its type
    pub type_name: String,
    /// Its configuration
    pub config: Config,
    /// Values that arrived on its input ports
    pub inputs: IndexMap<String, PortValue>,
    /// Value supplied for this node when the run was started
    pub supplied: Option<PortValue>,
}

impl Invocation {
    /// Value on an input port
    pub fn input(&self, port: &str) -> Option<&PortValue> {
        self.inputs.get(port)
    }

    /// Text value on an input port
    pub fn input_str(&self, port: &str) -> Option<&str> {
        self.input(port).and_then(PortValue::as_str)
    }

    /// Text configuration value
    pub fn config_str(&self, property: &str) -> Option<&str> {
        self.config.get(property).and_then(ConfigValue::as_str)
    }

    /// Checkbox configuration value
    pub fn config_bool(&self, property: &str) -> Option<bool> {
        self.config.get(property).and_then(ConfigValue::as_bool)
    }
}

/// Error reported by a behavior
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BehaviorError(pub String);

impl From<String> for BehaviorError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for BehaviorError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Implementation of a node type
pub trait NodeBehavior: Send + Sync {
    /// Execute one node
    fn execute(
        &self,
        invocation: Invocation,
    ) -> BoxFuture<'static, Result<NodeOutput, BehaviorError>>;
}

impl<F, Fut> NodeBehavior for F
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeOutput, BehaviorError>> + Send + 'static,
{
    fn execute(
        &self,
        invocation: Invocation,
    ) -> BoxFuture<'static, Result<NodeOutput, BehaviorError>> {
        self(invocation).boxed()
    }
}

/// Behaviors by node type name
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Arc<dyn NodeBehavior>>,
}

impl BehaviorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the behavior of a node type, replacing any previous one
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        behavior: impl NodeBehavior + 'static,
    ) {
        self.behaviors.insert(type_name.into(), Arc::new(behavior));
    }

    /// Get the behavior of a node type
    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn NodeBehavior>> {
        self.behaviors.get(type_name)
    }

    /// Whether a node type has a behavior
    pub fn contains(&self, type_name: &str) -> bool {
        self.behaviors.contains_key(type_name)
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.behaviors.keys().collect();
        names.sort();
        f.debug_struct("BehaviorRegistry").field("types", &names).finish()
    }
}

/// Tuning for runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Upper bound on a single node's execution time
    pub node_timeout: Option<Duration>,
    /// Nodes allowed in flight at once; 1 runs strictly in order
    pub max_concurrency: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            node_timeout: None,
            max_concurrency: 4,
        }
    }
}

/// Per-run inputs
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Values handed to specific nodes, typically input nodes
    pub supplied: HashMap<NodeId, PortValue>,
    /// Cancels the run when triggered
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Create a context with nothing supplied
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a value to a node
    pub fn supply(mut self, node_id: NodeId, value: impl Into<PortValue>) -> Self {
        self.supplied.insert(node_id, value.into());
        self
    }

    /// Use an existing cancellation token
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// One executed node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRun {
    /// Node
    pub node_id: NodeId,
    /// Its type
    pub type_name: String,
    /// Inputs it received
    pub inputs: IndexMap<String, PortValue>,
    /// Outputs it produced
    pub outputs: NodeOutput,
    /// Time spent in its behavior
    pub elapsed: Duration,
}

/// Record of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionTrace {
    /// Unique run id
    pub run_id: Uuid,
    /// Topological order of the graph
    pub order: Vec<NodeId>,
    /// Completed nodes, in completion order
    pub records: Vec<NodeRun>,
}

impl ExecutionTrace {
    fn new(order: Vec<NodeId>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            order,
            records: Vec::new(),
        }
    }

    /// Record of one node, if it completed
    pub fn record(&self, node_id: NodeId) -> Option<&NodeRun> {
        self.records.iter().find(|r| r.node_id == node_id)
    }

    /// Value a completed node produced on an output port
    pub fn output(&self, node_id: NodeId, port: &str) -> Option<&PortValue> {
        self.record(node_id)?.outputs.get(port)
    }

    /// Completed nodes in completion order
    pub fn completed(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.records.iter().map(|r| r.node_id)
    }
}

/// Why a node failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeFailure {
    /// The behavior returned an error
    #[error(transparent)]
    Behavior(#[from] BehaviorError),

    /// The behavior ran past the node timeout
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// An upstream node did not produce the value a required input is wired to
    #[error("no value arrived on required input {port:?}")]
    MissingInputValue {
        /// Input port
        port: String,
    },

    /// Output on a port the node does not have
    #[error("produced a value on undeclared output {port:?}")]
    UndeclaredOutput {
        /// Port id
        port: String,
    },

    /// Output whose type does not match its port
    #[error("output {port:?} expects {expected}, got {found}")]
    TypeMismatch {
        /// Port id
        port: String,
        /// Declared type
        expected: DataType,
        /// Produced type
        found: DataType,
    },

    /// The behavior panicked
    #[error("behavior panicked")]
    Panicked,
}

/// Error from a run
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Graph contains a cycle
    #[error("workflow contains a cycle through {}", format_ids(.nodes))]
    CycleDetected {
        /// Nodes on a cycle, ascending
        nodes: Vec<NodeId>,
    },

    /// Required input left unconnected
    #[error("{node}: required input {port:?} is not connected")]
    MissingRequiredInput {
        /// Node
        node: NodeId,
        /// Input port
        port: String,
    },

    /// Required property left empty
    #[error("{node}: required property {property:?} is empty")]
    MissingRequiredProperty {
        /// Node
        node: NodeId,
        /// Property id
        property: String,
    },

    /// No behavior registered for a node's type
    #[error("{node}: no behavior registered for node type {type_name:?}")]
    MissingBehavior {
        /// Node
        node: NodeId,
        /// Node type
        type_name: String,
    },

    /// A node failed; the trace holds every node that completed before it
    #[error("{node} failed: {reason}")]
    NodeExecutionFailed {
        /// Failing node
        node: NodeId,
        /// What went wrong
        #[source]
        reason: NodeFailure,
        /// Partial trace
        trace: Box<ExecutionTrace>,
    },

    /// The run was cancelled
    #[error("run cancelled")]
    Cancelled {
        /// Partial trace
        trace: Box<ExecutionTrace>,
    },
}

impl ExecutionError {
    /// Partial trace, for errors raised after execution started
    pub fn trace(&self) -> Option<&ExecutionTrace> {
        match self {
            Self::NodeExecutionFailed { trace, .. } | Self::Cancelled { trace } => Some(trace),
            _ => None,
        }
    }
}

impl From<CycleError> for ExecutionError {
    fn from(error: CycleError) -> Self {
        Self::CycleDetected { nodes: error.nodes }
    }
}

/// A node ready to execute, resolved during preflight
struct Step {
    type_name: String,
    config: Config,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
    /// Input port to the upstream `(node, output port)` feeding it
    feeds: HashMap<String, (NodeId, String)>,
    successors: Vec<NodeId>,
    behavior: Arc<dyn NodeBehavior>,
}

/// Runs workflow graphs
#[derive(Debug, Clone, Default)]
pub struct Executor {
    behaviors: Arc<BehaviorRegistry>,
    options: ExecutionOptions,
}

impl Executor {
    /// Create an executor over a set of behaviors
    pub fn new(behaviors: BehaviorRegistry) -> Self {
        Self {
            behaviors: Arc::new(behaviors),
            options: ExecutionOptions::default(),
        }
    }

    /// Replace the options
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Run a graph with nothing supplied
    pub async fn run(&self, graph: &Graph) -> Result<ExecutionTrace, ExecutionError> {
        self.run_with(graph, RunContext::default()).await
    }

    /// Run a graph
    pub async fn run_with(
        &self,
        graph: &Graph,
        context: RunContext,
    ) -> Result<ExecutionTrace, ExecutionError> {
        let order = graph.topological_order()?;
        let mut steps = self.preflight(graph, &order)?;
        let mut trace = ExecutionTrace::new(order);

        let mut waiting: HashMap<NodeId, usize> = steps.keys().map(|id| (*id, 0)).collect();
        for (_, target) in graph.dependency_pairs() {
            *waiting.entry(target).or_default() += 1;
        }
        let mut ready: BTreeSet<NodeId> = waiting
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        tracing::info!(run_id = %trace.run_id, nodes = steps.len(), "workflow run started");

        let limit = self.options.max_concurrency.max(1);
        let mut produced: HashMap<NodeId, NodeOutput> = HashMap::new();
        let mut inputs_of: HashMap<NodeId, IndexMap<String, PortValue>> = HashMap::new();
        let mut in_flight: HashMap<NodeId, AbortHandle> = HashMap::new();
        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < limit {
                let Some(node_id) = ready.pop_first() else {
                    break;
                };
                let Some(step) = steps.get(&node_id) else {
                    continue;
                };

                let inputs = match gather_inputs(step, &produced) {
                    Ok(inputs) => inputs,
                    Err(reason) => {
                        abort_all(&mut in_flight);
                        return Err(failed(node_id, reason, trace));
                    }
                };

                let invocation = Invocation {
                    node_id,
                    type_name: step.type_name.clone(),
                    config: step.config.clone(),
                    inputs: inputs.clone(),
                    supplied: context.supplied.get(&node_id).cloned(),
                };
                inputs_of.insert(node_id, inputs);

                tracing::debug!(node = %node_id, type_name = %step.type_name, "executing node");
                let handle = tokio::spawn(invoke(
                    step.behavior.clone(),
                    invocation,
                    self.options.node_timeout,
                ));
                in_flight.insert(node_id, handle.abort_handle());

                running.push(async move { (node_id, handle.await) });
            }

            if running.is_empty() {
                break;
            }

            let (node_id, joined) = tokio::select! {
                biased;
                () = context.cancel.cancelled() => {
                    abort_all(&mut in_flight);
                    tracing::info!(run_id = %trace.run_id, "workflow run cancelled");
                    return Err(ExecutionError::Cancelled { trace: Box::new(trace) });
                }
                Some(finished) = running.next() => finished,
            };
            in_flight.remove(&node_id);

            let Some(step) = steps.remove(&node_id) else {
                continue;
            };
            let outcome = match joined {
                Ok(result) => result.and_then(|(output, elapsed)| {
                    check_outputs(&step, &output).map(|()| (output, elapsed))
                }),
                Err(error) if error.is_panic() => Err(NodeFailure::Panicked),
                Err(_) => continue,
            };

            let (output, elapsed) = match outcome {
                Ok(done) => done,
                Err(reason) => {
                    abort_all(&mut in_flight);
                    return Err(failed(node_id, reason, trace));
                }
            };

            tracing::debug!(node = %node_id, ?elapsed, "node finished");
            trace.records.push(NodeRun {
                node_id,
                type_name: step.type_name.clone(),
                inputs: inputs_of.remove(&node_id).unwrap_or_default(),
                outputs: output.clone(),
                elapsed,
            });
            produced.insert(node_id, output);

            for next in &step.successors {
                if let Some(count) = waiting.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        tracing::info!(
            run_id = %trace.run_id,
            completed = trace.records.len(),
            "workflow run finished"
        );
        Ok(trace)
    }

    /// Resolve every node before anything runs
    fn preflight(
        &self,
        graph: &Graph,
        order: &[NodeId],
    ) -> Result<HashMap<NodeId, Step>, ExecutionError> {
        let mut steps = HashMap::with_capacity(order.len());

        for &node_id in order {
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            let Ok(schema) = graph.schema(node_id) else {
                continue;
            };
            let ports = schema.effective_ports(&node.config);

            let mut feeds = HashMap::new();
            for port in ports.inputs {
                match graph.connections_to(node_id, &port.id).next() {
                    Some(c) => {
                        feeds.insert(
                            port.id.clone(),
                            (c.source_node(), c.endpoints.source_port.clone()),
                        );
                    }
                    None if port.required => {
                        return Err(ExecutionError::MissingRequiredInput {
                            node: node_id,
                            port: port.id.clone(),
                        });
                    }
                    None => {}
                }
            }

            if let Some(property) = schema
                .properties
                .iter()
                .find(|p| p.required && p.is_unset(&node.config))
            {
                return Err(ExecutionError::MissingRequiredProperty {
                    node: node_id,
                    property: property.id.clone(),
                });
            }

            let behavior = self
                .behaviors
                .get(&node.type_name)
                .cloned()
                .ok_or_else(|| ExecutionError::MissingBehavior {
                    node: node_id,
                    type_name: node.type_name.clone(),
                })?;

            let successors: BTreeSet<NodeId> = graph
                .connections_for_node(node_id)
                .filter(|c| c.source_node() == node_id)
                .map(|c| c.target_node())
                .collect();

            steps.insert(
                node_id,
                Step {
                    type_name: node.type_name.clone(),
                    config: node.config.clone(),
                    inputs: ports.inputs.to_vec(),
                    outputs: ports.outputs.to_vec(),
                    feeds,
                    successors: successors.into_iter().collect(),
                    behavior,
                },
            );
        }

        Ok(steps)
    }
}

/// Call a behavior under the node timeout, timing it
async fn invoke(
    behavior: Arc<dyn NodeBehavior>,
    invocation: Invocation,
    timeout: Option<Duration>,
) -> Result<(NodeOutput, Duration), NodeFailure> {
    let started = Instant::now();
    let future = behavior.execute(invocation);
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| NodeFailure::TimedOut(limit))??,
        None => future.await?,
    };
    Ok((output, started.elapsed()))
}

fn gather_inputs(
    step: &Step,
    produced: &HashMap<NodeId, NodeOutput>,
) -> Result<IndexMap<String, PortValue>, NodeFailure> {
    let mut inputs = IndexMap::new();
    for port in &step.inputs {
        let Some((source, source_port)) = step.feeds.get(&port.id) else {
            continue;
        };
        match produced.get(source).and_then(|output| output.get(source_port)) {
            Some(value) => {
                inputs.insert(port.id.clone(), value.clone());
            }
            None if port.required => {
                return Err(NodeFailure::MissingInputValue {
                    port: port.id.clone(),
                });
            }
            None => {}
        }
    }
    Ok(inputs)
}

fn check_outputs(step: &Step, output: &NodeOutput) -> Result<(), NodeFailure> {
    for (port_id, value) in &output.values {
        let port = step
            .outputs
            .iter()
            .find(|p| p.id == *port_id)
            .ok_or_else(|| NodeFailure::UndeclaredOutput {
                port: port_id.clone(),
            })?;
        if !value.conforms_to(&port.data_type) {
            return Err(NodeFailure::TypeMismatch {
                port: port_id.clone(),
                expected: port.data_type.clone(),
                found: value.data_type(),
            });
        }
    }
    Ok(())
}

fn abort_all(in_flight: &mut HashMap<NodeId, AbortHandle>) {
    for (_, handle) in in_flight.drain() {
        handle.abort();
    }
}

fn failed(node: NodeId, reason: NodeFailure, trace: ExecutionTrace) -> ExecutionError {
    tracing::warn!(run_id = %trace.run_id, %node, %reason, "workflow run failed");
    ExecutionError::NodeExecutionFailed {
        node,
        reason,
        trace: Box::new(trace),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Endpoints;
    use crate::node::{NodeCategory, NodeRegistry, NodeTypeSchema, Position};
    use crate::property::PropertySpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        let types = [
            NodeTypeSchema::new("source", "Source", NodeCategory::Input, "")
                .output(PortSpec::new("out", "Out", DataType::String))
                .property(PropertySpec::text("value", "Value").with_default("hello")),
            NodeTypeSchema::new("upper", "Upper", NodeCategory::Processing, "")
                .input(PortSpec::new("in", "In", DataType::String).required())
                .output(PortSpec::new("out", "Out", DataType::String)),
            NodeTypeSchema::new("join", "Join", NodeCategory::Processing, "")
                .input(PortSpec::new("a", "A", DataType::String).required())
                .input(PortSpec::new("b", "B", DataType::String).required())
                .output(PortSpec::new("out", "Out", DataType::String)),
            NodeTypeSchema::new("relay", "Relay", NodeCategory::Processing, "")
                .input(PortSpec::new("in", "In", DataType::Any))
                .output(PortSpec::new("out", "Out", DataType::Any)),
            NodeTypeSchema::new("labelled", "Labelled", NodeCategory::Output, "")
                .property(PropertySpec::text("label", "Label").required()),
        ];
        for schema in types {
            registry.register(schema).unwrap();
        }
        Arc::new(registry)
    }

    fn sync<F>(f: F) -> impl NodeBehavior
    where
        F: Fn(Invocation) -> Result<NodeOutput, BehaviorError> + Send + Sync + 'static,
    {
        move |invocation: Invocation| futures::future::ready(f(invocation))
    }

    fn behaviors() -> BehaviorRegistry {
        let mut behaviors = BehaviorRegistry::new();
        behaviors.register(
            "source",
            sync(|invocation| {
                let value = invocation.config_str("value").unwrap_or_default().to_string();
                Ok(NodeOutput::new().with("out", value))
            }),
        );
        behaviors.register(
            "upper",
            sync(|invocation| {
                let text = invocation.input_str("in").unwrap_or_default();
                Ok(NodeOutput::new().with("out", text.to_uppercase()))
            }),
        );
        behaviors.register(
            "join",
            sync(|invocation| {
                let a = invocation.input_str("a").unwrap_or_default();
                let b = invocation.input_str("b").unwrap_or_default();
                Ok(NodeOutput::new().with("out", format!("{a} {b}")))
            }),
        );
        behaviors.register(
            "relay",
            sync(|invocation| {
                let mut output = NodeOutput::new();
                if let Some(value) = invocation.input("in") {
                    output.set("out", value.clone());
                }
                Ok(output)
            }),
        );
        behaviors.register("labelled", sync(|_| Ok(NodeOutput::new())));
        behaviors
    }

    fn executor(max_concurrency: usize) -> Executor {
        Executor::new(behaviors()).with_options(ExecutionOptions {
            node_timeout: None,
            max_concurrency,
        })
    }

    fn set_value(graph: &mut Graph, node: NodeId, value: &str) {
        graph
            .update_config(node, "value", ConfigValue::from(value))
            .unwrap();
    }

    #[tokio::test]
    async fn test_values_flow_downstream() {
        let mut graph = Graph::new(registry());
        let join = graph.add_node("join", Position::default()).unwrap();
        let left = graph.add_node("source", Position::default()).unwrap();
        let right = graph.add_node("source", Position::default()).unwrap();
        let upper = graph.add_node("upper", Position::default()).unwrap();
        set_value(&mut graph, right, "world");

        graph.connect(Endpoints::new(left, "out", upper, "in")).unwrap();
        graph.connect(Endpoints::new(upper, "out", join, "a")).unwrap();
        graph.connect(Endpoints::new(right, "out", join, "b")).unwrap();

        let trace = executor(1).run(&graph).await.unwrap();
        assert_eq!(trace.order, vec![left, right, upper, join]);
        assert_eq!(trace.completed().collect::<Vec<_>>(), trace.order);
        assert_eq!(
            trace.output(join, "out"),
            Some(&PortValue::from("HELLO world"))
        );
        assert_eq!(
            trace.record(upper).unwrap().inputs.get("in"),
            Some(&PortValue::from("hello"))
        );
    }

    #[tokio::test]
    async fn test_cycle_detected() {
        let mut graph = Graph::new(registry());
        let a = graph.add_node("relay", Position::default()).unwrap();
        let b = graph.add_node("relay", Position::default()).unwrap();
        let c = graph.add_node("relay", Position::default()).unwrap();
        graph.connect(Endpoints::new(a, "out", b, "in")).unwrap();
        graph.connect(Endpoints::new(b, "out", c, "in")).unwrap();
        graph.connect(Endpoints::new(c, "out", a, "in")).unwrap();

        let error = executor(4).run(&graph).await.unwrap_err();
        assert!(matches!(
            error,
            ExecutionError::CycleDetected { ref nodes } if *nodes == vec![a, b, c]
        ));
        assert!(error.trace().is_none());
    }

    #[tokio::test]
    async fn test_preflight_runs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut behaviors = behaviors();
        behaviors.register(
            "source",
            sync(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(NodeOutput::new().with("out", "x"))
            }),
        );
        let executor = Executor::new(behaviors);

        let mut graph = Graph::new(registry());
        graph.add_node("source", Position::default()).unwrap();
        let upper = graph.add_node("upper", Position::default()).unwrap();

        let error = executor.run(&graph).await.unwrap_err();
        assert!(matches!(
            error,
            ExecutionError::MissingRequiredInput { node, ref port } if node == upper && port == "in"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_property_and_behavior() {
        let mut graph = Graph::new(registry());
        let labelled = graph.add_node("labelled", Position::default()).unwrap();
        assert!(matches!(
            executor(1).run(&graph).await,
            Err(ExecutionError::MissingRequiredProperty { node, .. }) if node == labelled
        ));

        graph
            .update_config(labelled, "label", ConfigValue::from("done"))
            .unwrap();
        executor(1).run(&graph).await.unwrap();

        let executor = Executor::new(BehaviorRegistry::new());
        assert!(matches!(
            executor.run(&graph).await,
            Err(ExecutionError::MissingBehavior { ref type_name, .. }) if type_name == "labelled"
        ));
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_trace() {
        let mut behaviors = behaviors();
        behaviors.register("upper", sync(|_| Err(BehaviorError::from("quota exceeded"))));
        let executor = Executor::new(behaviors);

        let mut graph = Graph::new(registry());
        let source = graph.add_node("source", Position::default()).unwrap();
        let upper = graph.add_node("upper", Position::default()).unwrap();
        let relay = graph.add_node("relay", Position::default()).unwrap();
        graph.connect(Endpoints::new(source, "out", upper, "in")).unwrap();
        graph.connect(Endpoints::new(upper, "out", relay, "in")).unwrap();

        let error = executor.run(&graph).await.unwrap_err();
        let ExecutionError::NodeExecutionFailed { node, reason, trace } = error else {
            panic!("expected a node failure, got {error}");
        };
        assert_eq!(node, upper);
        assert_eq!(reason, NodeFailure::Behavior(BehaviorError::from("quota exceeded")));
        assert_eq!(trace.completed().collect::<Vec<_>>(), vec![source]);
    }

    #[tokio::test]
    async fn test_outputs_are_checked() {
        let mut behaviors = behaviors();
        behaviors.register("source", sync(|_| Ok(NodeOutput::new().with("extra", "x"))));
        let mut graph = Graph::new(registry());
        let source = graph.add_node("source", Position::default()).unwrap();

        let error = Executor::new(behaviors).run(&graph).await.unwrap_err();
        assert!(matches!(
            error,
            ExecutionError::NodeExecutionFailed {
                node,
                reason: NodeFailure::UndeclaredOutput { .. },
                ..
            } if node == source
        ));

        let mut behaviors = self::behaviors();
        behaviors.register("source", sync(|_| Ok(NodeOutput::new().with("out", 3.0))));
        let error = Executor::new(behaviors).run(&graph).await.unwrap_err();
        assert!(matches!(
            error,
            ExecutionError::NodeExecutionFailed {
                reason: NodeFailure::TypeMismatch {
                    expected: DataType::String,
                    found: DataType::Number,
                    ..
                },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_upstream_value() {
        let mut behaviors = behaviors();
        behaviors.register("source", sync(|_| Ok(NodeOutput::new())));
        let mut graph = Graph::new(registry());
        let source = graph.add_node("source", Position::default()).unwrap();
        let upper = graph.add_node("upper", Position::default()).unwrap();
        graph.connect(Endpoints::new(source, "out", upper, "in")).unwrap();

        let error = Executor::new(behaviors).run(&graph).await.unwrap_err();
        assert!(matches!(
            error,
            ExecutionError::NodeExecutionFailed {
                node,
                reason: NodeFailure::MissingInputValue { .. },
                ..
            } if node == upper
        ));
    }

    #[tokio::test]
    async fn test_panic_is_a_failure() {
        let mut behaviors = behaviors();
        behaviors.register("source", sync(|_| panic!("boom")));
        let mut graph = Graph::new(registry());
        graph.add_node("source", Position::default()).unwrap();

        let error = Executor::new(behaviors).run(&graph).await.unwrap_err();
        assert!(matches!(
            error,
            ExecutionError::NodeExecutionFailed {
                reason: NodeFailure::Panicked,
                ..
            }
        ));
    }

    async fn stall(_: Invocation) -> Result<NodeOutput, BehaviorError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(NodeOutput::new().with("out", "late"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_timeout() {
        let mut behaviors = behaviors();
        behaviors.register("upper", stall);
        let executor = Executor::new(behaviors).with_options(ExecutionOptions {
            node_timeout: Some(Duration::from_secs(5)),
            max_concurrency: 2,
        });

        let mut graph = Graph::new(registry());
        let source = graph.add_node("source", Position::default()).unwrap();
        let upper = graph.add_node("upper", Position::default()).unwrap();
        graph.connect(Endpoints::new(source, "out", upper, "in")).unwrap();

        let error = executor.run(&graph).await.unwrap_err();
        let ExecutionError::NodeExecutionFailed { node, reason, trace } = error else {
            panic!("expected a node failure, got {error}");
        };
        assert_eq!(node, upper);
        assert_eq!(reason, NodeFailure::TimedOut(Duration::from_secs(5)));
        assert!(trace.record(source).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let mut behaviors = behaviors();
        behaviors.register("upper", stall);
        let executor = Executor::new(behaviors);

        let mut graph = Graph::new(registry());
        let source = graph.add_node("source", Position::default()).unwrap();
        let upper = graph.add_node("upper", Position::default()).unwrap();
        graph.connect(Endpoints::new(source, "out", upper, "in")).unwrap();

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let error = executor
            .run_with(&graph, RunContext::new().cancel_with(token))
            .await
            .unwrap_err();
        let ExecutionError::Cancelled { trace } = error else {
            panic!("expected cancellation, got {error}");
        };
        assert_eq!(trace.completed().collect::<Vec<_>>(), vec![source]);
    }

    struct Tracked {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl NodeBehavior for Tracked {
        fn execute(&self, _: Invocation) -> BoxFuture<'static, Result<NodeOutput, BehaviorError>> {
            let active = self.active.clone();
            let peak = self.peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, BehaviorError>(NodeOutput::new().with("out", "x"))
            }
            .boxed()
        }
    }

    async fn peak_concurrency(max_concurrency: usize) -> usize {
        let peak = Arc::new(AtomicUsize::new(0));
        let mut behaviors = behaviors();
        behaviors.register(
            "source",
            Tracked {
                active: Arc::new(AtomicUsize::new(0)),
                peak: peak.clone(),
            },
        );
        let executor = Executor::new(behaviors).with_options(ExecutionOptions {
            node_timeout: None,
            max_concurrency,
        });

        let mut graph = Graph::new(registry());
        for _ in 0..3 {
            graph.add_node("source", Position::default()).unwrap();
        }
        let trace = executor.run(&graph).await.unwrap();
        assert_eq!(trace.records.len(), 3);
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_branches_run_concurrently() {
        assert_eq!(peak_concurrency(3).await, 3);
        assert_eq!(peak_concurrency(2).await, 2);
        assert_eq!(peak_concurrency(1).await, 1);
    }
}
