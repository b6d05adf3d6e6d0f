// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and connections.

use crate::catalog;
use crate::connection::{Connection, ConnectionError, ConnectionId, Endpoints};
use crate::node::{
    EffectivePorts, Node, NodeId, NodeRegistry, NodeTypeSchema, Position, UnknownNodeType,
};
use crate::port::PortDirection;
use crate::property::{ConfigValue, PropertySpec, ValueError};
use crate::validation::{resolve_port, validate_connection};
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// A workflow graph
#[derive(Debug, Clone)]
pub struct Graph {
    /// Node types the graph may contain
    registry: Arc<NodeRegistry>,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Connections between nodes
    connections: IndexMap<ConnectionId, Connection>,
    /// Last id handed out
    last_id: u64,
}

/// A node removed from the graph with the connections that went with it
#[derive(Debug, Clone)]
pub struct RemovedNode {
    /// The node
    pub node: Node,
    /// Connections that touched it
    pub connections: Vec<Connection>,
}

/// Problem that keeps a graph from running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// Required input port without a connection
    UnconnectedInput {
        /// Node
        node: NodeId,
        /// Input port
        port: String,
    },
    /// Required property left empty
    EmptyProperty {
        /// Node
        node: NodeId,
        /// Property id
        property: String,
    },
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnconnectedInput { node, port } => {
                write!(f, "{node}: required input {port:?} is not connected")
            }
            Self::EmptyProperty { node, property } => {
                write!(f, "{node}: required property {property:?} is empty")
            }
        }
    }
}

impl Graph {
    /// Create a new empty graph over a registry
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            last_id: 0,
        }
    }

    /// Node types available to this graph
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Add a node of a registered type, seeded with the type's defaults
    pub fn add_node(&mut self, type_name: &str, position: Position) -> Result<NodeId, GraphError> {
        let schema = self.registry.lookup(type_name)?;
        let next = self
            .last_id
            .checked_add(1)
            .ok_or(GraphError::IdSpaceExhausted)?;
        let id = NodeId(next);
        let node = Node::new(id, schema, position);

        self.last_id = id.0;
        self.nodes.insert(id, node);
        tracing::debug!(node = %id, type_name, "added node");
        Ok(id)
    }

    /// Remove a node and its connections
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<RemovedNode, GraphError> {
        let node = self
            .nodes
            .shift_remove(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;

        let mut removed = Vec::new();
        self.connections.retain(|_, c| {
            if c.involves_node(node_id) {
                removed.push(c.clone());
                false
            } else {
                true
            }
        });

        tracing::debug!(node = %node_id, connections = removed.len(), "removed node");
        Ok(RemovedNode {
            node,
            connections: removed,
        })
    }

    /// Set one configuration property of a node.
    ///
    /// Returns the connections that no longer fit the node's ports under the
    /// new configuration; they have been removed.
    pub fn update_config(
        &mut self,
        node_id: NodeId,
        property: &str,
        value: ConfigValue,
    ) -> Result<Vec<Connection>, GraphError> {
        let node = self.nodes.get(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let schema = self.registry.lookup(&node.type_name)?;
        let spec = schema
            .property_spec(property)
            .ok_or_else(|| GraphError::UnknownProperty {
                node: node_id,
                property: property.to_string(),
            })?;

        spec.validate(&value).map_err(|reason| GraphError::InvalidValue {
            node: node_id,
            property: property.to_string(),
            reason,
        })?;

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.config.insert(property.to_string(), value);
        }

        let dropped = self.prune_connections(node_id);
        for connection in &dropped {
            tracing::warn!(
                node = %node_id,
                property,
                source = %connection.endpoints.source_node,
                source_port = %connection.endpoints.source_port,
                target = %connection.endpoints.target_node,
                target_port = %connection.endpoints.target_port,
                "dropped connection after port change"
            );
        }
        Ok(dropped)
    }

    /// Move a node on the canvas
    pub fn move_node(&mut self, node_id: NodeId, position: Position) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.position = position;
        Ok(())
    }

    /// Validate and add a connection between ports
    pub fn connect(&mut self, endpoints: Endpoints) -> Result<ConnectionId, ConnectionError> {
        validate_connection(self, &endpoints)?;

        tracing::debug!(
            source = %endpoints.source_node,
            source_port = %endpoints.source_port,
            target = %endpoints.target_node,
            target_port = %endpoints.target_port,
            "connected"
        );
        let connection = Connection::new(endpoints);
        let id = connection.id;
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Check whether a connection would be accepted
    pub fn can_connect(&self, endpoints: &Endpoints) -> Result<(), ConnectionError> {
        validate_connection(self, endpoints)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections.shift_remove(&connection_id)
    }

    /// Remove every connection attached to one port of a node
    pub fn disconnect_port(
        &mut self,
        node_id: NodeId,
        direction: PortDirection,
        port: &str,
    ) -> Vec<Connection> {
        let mut removed = Vec::new();
        self.connections.retain(|_, c| {
            let attached = match direction {
                PortDirection::Input => c.is_into(node_id, port),
                PortDirection::Output => c.is_from(node_id, port),
            };
            if attached {
                removed.push(c.clone());
            }
            !attached
        });
        removed
    }

    /// Remove all nodes and connections and restart id assignment
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
        self.last_id = 0;
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Last id handed out; the next node gets the one after it
    pub fn last_node_id(&self) -> u64 {
        self.last_id
    }

    /// Schema of a node's type
    pub fn schema(&self, node_id: NodeId) -> Result<&NodeTypeSchema, GraphError> {
        let node = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        Ok(self.registry.lookup(&node.type_name)?)
    }

    /// Ports of a node under its current configuration
    pub fn effective_ports(&self, node_id: NodeId) -> Result<EffectivePorts<'_>, GraphError> {
        let node = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let schema = self.registry.lookup(&node.type_name)?;
        Ok(schema.effective_ports(&node.config))
    }

    /// Properties of a node visible under its current configuration
    pub fn visible_properties(&self, node_id: NodeId) -> Result<Vec<&PropertySpec>, GraphError> {
        let node = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let schema = self.registry.lookup(&node.type_name)?;
        Ok(schema.visible_properties(&node.config).collect())
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections in insertion order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get connections from a specific output port
    pub fn connections_from<'a>(
        &'a self,
        node_id: NodeId,
        port: &'a str,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| c.is_from(node_id, port))
    }

    /// Get connections to a specific input port
    pub fn connections_to<'a>(
        &'a self,
        node_id: NodeId,
        port: &'a str,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| c.is_into(node_id, port))
    }

    /// Get connections involving a node
    pub fn connections_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.involves_node(node_id))
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Required inputs left unconnected and required properties left empty
    pub fn issues(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();
        for node in self.nodes.values() {
            let Ok(schema) = self.registry.lookup(&node.type_name) else {
                continue;
            };

            let ports = schema.effective_ports(&node.config);
            for port in ports.inputs.iter().filter(|p| p.required) {
                if self.connections_to(node.id, &port.id).next().is_none() {
                    issues.push(GraphIssue::UnconnectedInput {
                        node: node.id,
                        port: port.id.clone(),
                    });
                }
            }

            for property in schema.properties.iter().filter(|p| p.required) {
                if property.is_unset(&node.config) {
                    issues.push(GraphIssue::EmptyProperty {
                        node: node.id,
                        property: property.id.clone(),
                    });
                }
            }
        }
        issues
    }

    /// Get nodes in topological order, breaking ties by ascending id
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for (source, target) in self.dependency_pairs() {
            successors.entry(source).or_default().push(target);
            *in_degree.entry(target).or_default() += 1;
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node_id) = ready.pop_first() {
            order.push(node_id);
            for next in successors.get(&node_id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        let placed: HashSet<NodeId> = order.into_iter().collect();
        let remaining: BTreeSet<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !placed.contains(id))
            .copied()
            .collect();
        Err(CycleError {
            nodes: self.cycle_members(&remaining, &successors),
        })
    }

    /// Distinct `(source, target)` node pairs joined by at least one connection
    pub(crate) fn dependency_pairs(&self) -> BTreeSet<(NodeId, NodeId)> {
        self.connections
            .values()
            .map(|c| (c.source_node(), c.target_node()))
            .collect()
    }

    /// Nodes of `remaining` that lie on a cycle.
    ///
    /// Nodes left over by the topological sort are either on a cycle or
    /// downstream of one; strongly connected components separate the two.
    fn cycle_members(
        &self,
        remaining: &BTreeSet<NodeId>,
        successors: &HashMap<NodeId, Vec<NodeId>>,
    ) -> Vec<NodeId> {
        let mut tarjan = Tarjan {
            remaining,
            successors,
            index: 0,
            indices: HashMap::new(),
            low_links: HashMap::new(),
            stack: Vec::new(),
            on_stack: HashSet::new(),
            self_loops: HashSet::new(),
            members: BTreeSet::new(),
        };

        for node_id in remaining {
            if !tarjan.indices.contains_key(node_id) {
                tarjan.visit(*node_id);
            }
        }
        tarjan.members.into_iter().collect()
    }

    /// Drop connections of a node whose ports no longer exist or no longer match
    fn prune_connections(&mut self, node_id: NodeId) -> Vec<Connection> {
        let stale: Vec<ConnectionId> = self
            .connections_for_node(node_id)
            .filter(|c| !self.still_valid(&c.endpoints))
            .map(|c| c.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.connections.shift_remove(&id))
            .collect()
    }

    fn still_valid(&self, endpoints: &Endpoints) -> bool {
        let source = resolve_port(self, endpoints, PortDirection::Output);
        let target = resolve_port(self, endpoints, PortDirection::Input);
        match (source, target) {
            (Ok(source), Ok(target)) => source.data_type.can_connect_to(&target.data_type),
            _ => false,
        }
    }

    /// Insert a node with a known id, keeping the id counter ahead of it
    pub(crate) fn restore_node(&mut self, node: Node) {
        self.last_id = self.last_id.max(node.id.0);
        self.nodes.insert(node.id, node);
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(catalog::builtin_registry())
    }
}

struct Tarjan<'a> {
    remaining: &'a BTreeSet<NodeId>,
    successors: &'a HashMap<NodeId, Vec<NodeId>>,
    index: usize,
    indices: HashMap<NodeId, usize>,
    low_links: HashMap<NodeId, usize>,
    stack: Vec<NodeId>,
    on_stack: HashSet<NodeId>,
    self_loops: HashSet<NodeId>,
    members: BTreeSet<NodeId>,
}

impl Tarjan<'_> {
    /// Walk everything reachable from `root` with an explicit frame stack
    fn visit(&mut self, root: NodeId) {
        let successors = self.successors;
        let remaining = self.remaining;

        // (node, position of the next successor to look at)
        let mut frames: Vec<(NodeId, usize)> = vec![(root, 0)];
        self.open(root);

        while let Some(frame) = frames.last_mut() {
            let node_id = frame.0;
            let next = successors
                .get(&node_id)
                .and_then(|targets| targets.get(frame.1))
                .copied();
            frame.1 += 1;

            match next {
                Some(next) if !remaining.contains(&next) => {}
                Some(next) => {
                    if next == node_id {
                        self.self_loops.insert(node_id);
                    }
                    if !self.indices.contains_key(&next) {
                        self.open(next);
                        frames.push((next, 0));
                    } else if self.on_stack.contains(&next) {
                        let low = self.low_links[&node_id].min(self.indices[&next]);
                        self.low_links.insert(node_id, low);
                    }
                }
                None => {
                    frames.pop();
                    self.close(node_id);
                    if let Some(&(parent, _)) = frames.last() {
                        let low = self.low_links[&parent].min(self.low_links[&node_id]);
                        self.low_links.insert(parent, low);
                    }
                }
            }
        }
    }

    fn open(&mut self, node_id: NodeId) {
        self.indices.insert(node_id, self.index);
        self.low_links.insert(node_id, self.index);
        self.index += 1;
        self.stack.push(node_id);
        self.on_stack.insert(node_id);
    }

    /// Pop the component rooted at `node_id`, if it is a root
    fn close(&mut self, node_id: NodeId) {
        if self.low_links[&node_id] != self.indices[&node_id] {
            return;
        }

        let mut component = Vec::new();
        while let Some(member) = self.stack.pop() {
            self.on_stack.remove(&member);
            component.push(member);
            if member == node_id {
                break;
            }
        }
        if component.len() > 1 || self.self_loops.contains(&node_id) {
            self.members.extend(component);
        }
    }
}

/// Error from a graph mutation
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node type not registered
    #[error(transparent)]
    UnknownNodeType(#[from] UnknownNodeType),

    /// Node not found
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Every node id has been handed out
    #[error("no node ids left")]
    IdSpaceExhausted,

    /// Property not declared by the node's type
    #[error("{node} has no property {property:?}")]
    UnknownProperty {
        /// Node
        node: NodeId,
        /// Property id
        property: String,
    },

    /// Value violates the property's constraints
    #[error("invalid value for {property:?} on {node}: {reason}")]
    InvalidValue {
        /// Node
        node: NodeId,
        /// Property id
        property: String,
        /// Constraint that failed
        #[source]
        reason: ValueError,
    },
}

/// Error when graph contains a cycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("graph contains a cycle through {}", format_ids(.nodes))]
pub struct CycleError {
    /// Nodes on a cycle, ascending
    pub nodes: Vec<NodeId>,
}

pub(crate) fn format_ids(ids: &[NodeId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// A graph shared between an editing front end and running workflows.
///
/// Every mutation holds the write lock for its whole duration, so readers
/// never observe half-applied changes such as a removed node whose
/// connections are still present.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<RwLock<Graph>>,
}

impl SharedGraph {
    /// Wrap a graph
    pub fn new(graph: Graph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    /// Lock for reading
    pub fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.inner.read()
    }

    /// Lock for writing
    pub fn write(&self) -> RwLockWriteGuard<'_, Graph> {
        self.inner.write()
    }

    /// Apply a mutation atomically
    pub fn update<T>(&self, mutation: impl FnOnce(&mut Graph) -> T) -> T {
        mutation(&mut *self.inner.write())
    }

    /// Copy of the current graph, detached from further edits
    pub fn snapshot(&self) -> Graph {
        self.inner.read().clone()
    }

    /// Swap in a whole new graph, returning the previous one
    pub fn replace(&self, graph: Graph) -> Graph {
        std::mem::replace(&mut *self.inner.write(), graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeCategory;
    use crate::port::{DataType, PortSpec};

    fn graph() -> Graph {
        Graph::default()
    }

    #[test]
    fn test_add_node_seeds_defaults() {
        let mut graph = graph();
        for schema in graph.registry().clone().types() {
            let id = graph.add_node(&schema.type_name, Position::new(10.0, 20.0)).unwrap();
            let node = graph.node(id).unwrap();
            assert_eq!(node.config, schema.default_config());
            assert_eq!(node.position, Position::new(10.0, 20.0));
        }
    }

    #[test]
    fn test_add_unknown_type() {
        let mut graph = graph();
        assert!(matches!(
            graph.add_node("teleporter", Position::default()),
            Err(GraphError::UnknownNodeType(_))
        ));
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.last_node_id(), 0);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut graph = graph();
        let a = graph.add_node("textInput", Position::default()).unwrap();
        let b = graph.add_node("textInput", Position::default()).unwrap();
        graph.remove_node(b).unwrap();
        let c = graph.add_node("textInput", Position::default()).unwrap();

        assert_eq!(a, NodeId(1));
        assert_eq!(b, NodeId(2));
        assert_eq!(c, NodeId(3));
    }

    #[test]
    fn test_remove_node_cascades_exactly() {
        let mut graph = graph();
        let input = graph.add_node("textInput", Position::default()).unwrap();
        let upper = graph.add_node("textProcessor", Position::default()).unwrap();
        let display = graph.add_node("display", Position::default()).unwrap();
        let other = graph.add_node("textInput", Position::default()).unwrap();
        let export = graph.add_node("fileExport", Position::default()).unwrap();

        graph.connect(Endpoints::new(input, "text", upper, "text")).unwrap();
        graph.connect(Endpoints::new(upper, "result", display, "data")).unwrap();
        let kept = graph.connect(Endpoints::new(other, "text", export, "data")).unwrap();

        let before: Vec<Connection> = graph.connections().cloned().collect();
        let removed = graph.remove_node(upper).unwrap();

        let expected: Vec<&Connection> =
            before.iter().filter(|c| !c.involves_node(upper)).collect();
        let after: Vec<&Connection> = graph.connections().collect();
        assert_eq!(after, expected);
        assert_eq!(removed.connections.len(), 2);
        assert!(graph.connection(kept).is_some());

        assert!(matches!(graph.remove_node(upper), Err(GraphError::NodeNotFound(_))));
    }

    #[test]
    fn test_update_config_validates() {
        let mut graph = graph();
        let llm = graph.add_node("openai", Position::default()).unwrap();

        graph.update_config(llm, "maxTokens", ConfigValue::Number(2000.0)).unwrap();
        assert_eq!(
            graph.node(llm).unwrap().config["maxTokens"],
            ConfigValue::Number(2000.0)
        );

        assert!(matches!(
            graph.update_config(llm, "maxTokens", ConfigValue::Number(9000.0)),
            Err(GraphError::InvalidValue { .. })
        ));
        assert!(matches!(
            graph.update_config(llm, "model", ConfigValue::from("gpt-2")),
            Err(GraphError::InvalidValue { .. })
        ));
        assert!(matches!(
            graph.update_config(llm, "streamResponse", ConfigValue::from("yes")),
            Err(GraphError::InvalidValue { .. })
        ));
        assert!(matches!(
            graph.update_config(llm, "voice", ConfigValue::from("calm")),
            Err(GraphError::UnknownProperty { .. })
        ));
        assert!(matches!(
            graph.update_config(NodeId(42), "name", ConfigValue::from("x")),
            Err(GraphError::NodeNotFound(_))
        ));

        // Rejected updates leave the config untouched
        assert_eq!(
            graph.node(llm).unwrap().config["maxTokens"],
            ConfigValue::Number(2000.0)
        );
    }

    #[test]
    fn test_hidden_property_still_validates() {
        let mut graph = graph();
        let processor = graph.add_node("textProcessor", Position::default()).unwrap();

        let visible: Vec<&str> = graph
            .visible_properties(processor)
            .unwrap()
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert!(!visible.contains(&"findText"));

        assert!(graph
            .update_config(processor, "findText", ConfigValue::Number(3.0))
            .is_err());
        graph
            .update_config(processor, "findText", ConfigValue::from("cat"))
            .unwrap();

        graph
            .update_config(processor, "operation", ConfigValue::from("replace"))
            .unwrap();
        let visible = graph.visible_properties(processor).unwrap();
        assert!(visible.iter().any(|p| p.id == "findText"));
    }

    #[test]
    fn test_mode_change_drops_stale_connections() {
        let mut graph = graph();
        let input = graph.add_node("input", Position::default()).unwrap();
        let upper = graph.add_node("textProcessor", Position::default()).unwrap();
        let sink = graph.add_node("transformer", Position::default()).unwrap();

        let text = graph.connect(Endpoints::new(input, "text", upper, "text")).unwrap();

        let dropped = graph
            .update_config(input, "type", ConfigValue::from("file"))
            .unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].id, text);
        assert_eq!(graph.connection_count(), 0);

        // The file mode exposes its own ports
        graph
            .connect(Endpoints::new(input, "processed_text", upper, "text"))
            .unwrap();
        graph.connect(Endpoints::new(input, "file", sink, "data")).unwrap();
        assert_eq!(
            graph.connect(Endpoints::new(input, "text", sink, "data")),
            Err(ConnectionError::InvalidDirection {
                node: input,
                port: "text".to_string(),
                expected: PortDirection::Output,
            })
        );

        let dropped = graph
            .update_config(input, "type", ConfigValue::from("audio"))
            .unwrap();
        assert_eq!(dropped.len(), 2);
    }

    #[test]
    fn test_output_mode_retypes_input() {
        let mut graph = graph();
        let text = graph.add_node("textInput", Position::default()).unwrap();
        let output = graph.add_node("output", Position::default()).unwrap();

        graph.connect(Endpoints::new(text, "text", output, "output")).unwrap();

        // Same port, still compatible: kept
        let dropped = graph
            .update_config(output, "type", ConfigValue::from("streamed_text"))
            .unwrap();
        assert!(dropped.is_empty());

        // Same port, now typed `file`: dropped
        let dropped = graph
            .update_config(output, "type", ConfigValue::from("file"))
            .unwrap();
        assert_eq!(dropped.len(), 1);

        // `json` takes anything
        graph
            .update_config(output, "type", ConfigValue::from("json"))
            .unwrap();
        graph.connect(Endpoints::new(text, "text", output, "output")).unwrap();
    }

    #[test]
    fn test_move_node() {
        let mut graph = graph();
        let id = graph.add_node("display", Position::default()).unwrap();
        graph.move_node(id, Position::new(300.0, 40.0)).unwrap();
        assert_eq!(graph.node(id).unwrap().position, Position::new(300.0, 40.0));
        assert!(matches!(
            graph.move_node(NodeId(9), Position::default()),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_fan_in_scenario() {
        let mut graph = graph();
        let a = graph.add_node("textInput", Position::default()).unwrap();
        let b = graph.add_node("textProcessor", Position::default()).unwrap();
        let c = graph.add_node("textInput", Position::default()).unwrap();

        graph.connect(Endpoints::new(a, "text", b, "text")).unwrap();
        assert_eq!(
            graph.connect(Endpoints::new(c, "text", b, "text")),
            Err(ConnectionError::TargetAlreadyConnected {
                node: b,
                port: "text".to_string(),
            })
        );
        assert_eq!(graph.connections_to(b, "text").count(), 1);
    }

    #[test]
    fn test_file_into_string_rejected() {
        let mut graph = graph();
        let upload = graph.add_node("fileInput", Position::default()).unwrap();
        let processor = graph.add_node("textProcessor", Position::default()).unwrap();

        assert_eq!(
            graph.connect(Endpoints::new(upload, "file", processor, "text")),
            Err(ConnectionError::IncompatibleTypes {
                source_type: DataType::File,
                target_type: DataType::String,
            })
        );
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_disconnect_port() {
        let mut graph = graph();
        let a = graph.add_node("textInput", Position::default()).unwrap();
        let b = graph.add_node("display", Position::default()).unwrap();
        let c = graph.add_node("fileExport", Position::default()).unwrap();
        graph.connect(Endpoints::new(a, "text", b, "data")).unwrap();
        graph.connect(Endpoints::new(a, "text", c, "data")).unwrap();

        let removed = graph.disconnect_port(a, PortDirection::Output, "text");
        assert_eq!(removed.len(), 2);
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_clear_resets_counter() {
        let mut graph = graph();
        graph.add_node("textInput", Position::default()).unwrap();
        graph.add_node("textInput", Position::default()).unwrap();
        graph.clear();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.add_node("display", Position::default()).unwrap(), NodeId(1));
    }

    #[test]
    fn test_topological_order_ties_by_id() {
        let mut graph = graph();
        let a = graph.add_node("textInput", Position::default()).unwrap();
        let b = graph.add_node("textInput", Position::default()).unwrap();
        let upper = graph.add_node("textProcessor", Position::default()).unwrap();
        let show = graph.add_node("display", Position::default()).unwrap();

        graph.connect(Endpoints::new(b, "text", upper, "text")).unwrap();
        graph.connect(Endpoints::new(upper, "result", show, "data")).unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec![a, b, upper, show]);
    }

    fn looping_registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                NodeTypeSchema::new("relay", "Relay", NodeCategory::Processing, "")
                    .input(PortSpec::new("in", "In", DataType::Any))
                    .output(PortSpec::new("out", "Out", DataType::Any)),
            )
            .unwrap();
        registry
            .register(
                NodeTypeSchema::new("named", "Named", NodeCategory::Processing, "")
                    .property(PropertySpec::text("label", "Label").required()),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_cycle_reports_only_members() {
        let mut graph = Graph::new(looping_registry());
        let a = graph.add_node("relay", Position::default()).unwrap();
        let b = graph.add_node("relay", Position::default()).unwrap();
        let c = graph.add_node("relay", Position::default()).unwrap();
        let downstream = graph.add_node("relay", Position::default()).unwrap();

        graph.connect(Endpoints::new(a, "out", b, "in")).unwrap();
        graph.connect(Endpoints::new(b, "out", c, "in")).unwrap();
        graph.connect(Endpoints::new(c, "out", a, "in")).unwrap();
        graph.connect(Endpoints::new(c, "out", downstream, "in")).unwrap();

        let error = graph.topological_order().unwrap_err();
        assert_eq!(error.nodes, vec![a, b, c]);
        assert_eq!(
            error.to_string(),
            "graph contains a cycle through node-1, node-2, node-3"
        );
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut graph = Graph::new(looping_registry());
        let a = graph.add_node("relay", Position::default()).unwrap();
        graph.connect(Endpoints::new(a, "out", a, "in")).unwrap();
        assert_eq!(graph.topological_order().unwrap_err().nodes, vec![a]);
    }

    #[test]
    fn test_long_cycle_members() {
        // A lead-in chain 1..=10 feeding a ring 11..=200_010
        let ring = 11..=200_010u64;
        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for id in 1..=200_010u64 {
            let next = if id == *ring.end() { *ring.start() } else { id + 1 };
            successors.insert(NodeId(id), vec![NodeId(next)]);
        }
        let remaining: BTreeSet<NodeId> = (1..=200_010u64).map(NodeId).collect();

        let members = graph().cycle_members(&remaining, &successors);
        assert_eq!(members.len(), 200_000);
        assert_eq!(members.first(), Some(&NodeId(11)));
        assert_eq!(members.last(), Some(&NodeId(200_010)));
    }

    #[test]
    fn test_issues() {
        let mut graph = Graph::default();
        let output = graph.add_node("output", Position::default()).unwrap();
        let issues = graph.issues();
        assert!(issues.contains(&GraphIssue::UnconnectedInput {
            node: output,
            port: "output".to_string(),
        }));
        assert!(issues.contains(&GraphIssue::EmptyProperty {
            node: output,
            property: "outputField".to_string(),
        }));

        let mut graph = Graph::new(looping_registry());
        let named = graph.add_node("named", Position::default()).unwrap();
        graph.update_config(named, "label", ConfigValue::from("x")).unwrap();
        assert!(graph.issues().is_empty());
    }

    #[test]
    fn test_shared_snapshot_is_detached() {
        let shared = SharedGraph::default();
        let id = shared
            .update(|graph| graph.add_node("textInput", Position::default()))
            .unwrap();

        let snapshot = shared.snapshot();
        shared.update(|graph| graph.remove_node(id)).unwrap();

        assert!(snapshot.node(id).is_some());
        assert!(shared.read().node(id).is_none());
    }
}
