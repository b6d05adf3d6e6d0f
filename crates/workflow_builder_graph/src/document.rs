// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow documents.
//!
//! A document is the JSON form of a graph:
//!
//! ```json
//! {
//!   "nodes": {
//!     "node-1": {
//!       "type": "textInput",
//!       "config": { "name": "Prompt" },
//!       "position": { "x": 40, "y": 80 }
//!     }
//!   },
//!   "connections": [
//!     {
//!       "sourceNode": "node-1",
//!       "sourcePort": "text",
//!       "targetNode": "node-2",
//!       "targetPort": "prompt"
//!     }
//!   ]
//! }
//! ```
//!
//! Loading is tolerant of what older editors wrote: stale configuration and
//! dangling connections are repaired and reported as [`LoadWarning`]s, while
//! unknown node types and structurally broken documents fail the load.

use crate::connection::{ConnectionError, Endpoints};
use crate::graph::{Graph, SharedGraph};
use crate::node::{Node, NodeId, NodeRegistry, NodeTypeSchema, Position, UnknownNodeType};
use crate::property::{Config, ConfigValue, PropertySpec, ValueError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Serialized workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    /// Nodes keyed by id
    #[serde(default)]
    pub nodes: IndexMap<String, NodeRecord>,
    /// Connections in insertion order
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

/// Serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Configuration as written
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
}

/// Serialized connection.
///
/// Node ids are kept as text so that one bad reference drops a single
/// connection instead of failing the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Source node id
    #[serde(default)]
    pub source_node: String,
    /// Source (output) port
    #[serde(default)]
    pub source_port: String,
    /// Target node id
    #[serde(default)]
    pub target_node: String,
    /// Target (input) port
    #[serde(default)]
    pub target_port: String,
}

impl ConnectionRecord {
    fn endpoints(&self) -> Result<Endpoints, DropReason> {
        let source_node = parse_reference(&self.source_node)?;
        let target_node = parse_reference(&self.target_node)?;
        Ok(Endpoints::new(
            source_node,
            self.source_port.clone(),
            target_node,
            self.target_port.clone(),
        ))
    }
}

fn parse_reference(id: &str) -> Result<NodeId, DropReason> {
    id.parse().map_err(|_| DropReason::InvalidNodeId(id.to_string()))
}

impl From<&Endpoints> for ConnectionRecord {
    fn from(endpoints: &Endpoints) -> Self {
        Self {
            source_node: endpoints.source_node.to_string(),
            source_port: endpoints.source_port.clone(),
            target_node: endpoints.target_node.to_string(),
            target_port: endpoints.target_port.clone(),
        }
    }
}

impl fmt::Display for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source_node, self.source_port, self.target_node, self.target_port
        )
    }
}

impl WorkflowDocument {
    /// Parse a document from JSON text
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(text).map_err(|error| {
            if error.is_data() {
                DocumentError::Malformed {
                    reason: error.to_string(),
                }
            } else {
                DocumentError::Syntax(error)
            }
        })
    }

    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Non-fatal problem found while loading a document
#[derive(Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// Config entry the node type does not declare; dropped
    UnknownProperty {
        /// Node
        node: NodeId,
        /// Property id
        property: String,
    },
    /// Config entry that failed validation; reset to the default
    InvalidValue {
        /// Node
        node: NodeId,
        /// Property id
        property: String,
        /// Value as written
        value: serde_json::Value,
        /// Constraint that failed
        reason: ValueError,
    },
    /// Connection that could not be restored; dropped
    ConnectionDropped {
        /// Connection as written
        connection: ConnectionRecord,
        /// Why it was dropped
        reason: DropReason,
    },
}

/// Why a connection was dropped on load
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// Node reference is not a node id
    InvalidNodeId(String),
    /// Validation rejected the connection
    Rejected(ConnectionError),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNodeId(id) => write!(f, "invalid node id {id:?}"),
            Self::Rejected(error) => write!(f, "{error}"),
        }
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProperty { node, property } => {
                write!(f, "{node}: dropped unknown property {property:?}")
            }
            Self::InvalidValue {
                node,
                property,
                value,
                reason,
            } => write!(
                f,
                "{node}: reset {property:?} to its default, {value} is invalid: {reason}"
            ),
            Self::ConnectionDropped { connection, reason } => {
                write!(f, "dropped connection {connection}: {reason}")
            }
        }
    }
}

/// Error that aborts loading a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Text is not JSON
    #[error("malformed document: {0}")]
    Syntax(#[source] serde_json::Error),

    /// JSON does not have the document's shape
    #[error("malformed document: {reason}")]
    Malformed {
        /// Description
        reason: String,
    },

    /// Node of a type the registry does not know
    #[error("{node}: {source}")]
    UnknownNodeType {
        /// Node
        node: NodeId,
        /// Missing type
        source: UnknownNodeType,
    },
}

/// A graph restored from a document
#[derive(Debug)]
pub struct LoadedGraph {
    /// Restored graph
    pub graph: Graph,
    /// Repairs made while loading
    pub warnings: Vec<LoadWarning>,
}

/// Serialize a graph into a document
pub fn serialize(graph: &Graph) -> WorkflowDocument {
    let nodes = graph
        .nodes()
        .map(|node| {
            let record = NodeRecord {
                type_name: node.type_name.clone(),
                config: node
                    .config
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
                position: node.position,
            };
            (node.id.to_string(), record)
        })
        .collect();

    let connections = graph
        .connections()
        .map(|c| ConnectionRecord::from(&c.endpoints))
        .collect();

    WorkflowDocument { nodes, connections }
}

/// Restore a graph from a document
pub fn deserialize(
    document: &WorkflowDocument,
    registry: Arc<NodeRegistry>,
) -> Result<LoadedGraph, DocumentError> {
    let mut graph = Graph::new(registry.clone());
    let mut warnings = Vec::new();

    for (key, record) in &document.nodes {
        let id = key
            .parse::<NodeId>()
            .map_err(|error| DocumentError::Malformed {
                reason: error.to_string(),
            })?;
        if graph.node(id).is_some() {
            return Err(DocumentError::Malformed {
                reason: format!("duplicate node id {id}"),
            });
        }
        let schema = registry
            .lookup(&record.type_name)
            .map_err(|source| DocumentError::UnknownNodeType { node: id, source })?;

        let config = restore_config(id, schema, &record.config, &mut warnings);
        graph.restore_node(Node {
            id,
            type_name: schema.type_name.clone(),
            config,
            position: record.position,
        });
    }

    for record in &document.connections {
        let restored = record
            .endpoints()
            .and_then(|endpoints| graph.connect(endpoints).map_err(DropReason::Rejected));

        if let Err(reason) = restored {
            warnings.push(LoadWarning::ConnectionDropped {
                connection: record.clone(),
                reason,
            });
        }
    }

    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    tracing::debug!(
        nodes = graph.node_count(),
        connections = graph.connection_count(),
        warnings = warnings.len(),
        "loaded workflow document"
    );

    Ok(LoadedGraph { graph, warnings })
}

fn restore_config(
    node: NodeId,
    schema: &NodeTypeSchema,
    written: &serde_json::Map<String, serde_json::Value>,
    warnings: &mut Vec<LoadWarning>,
) -> Config {
    for key in written.keys() {
        if schema.property_spec(key).is_none() {
            warnings.push(LoadWarning::UnknownProperty {
                node,
                property: key.clone(),
            });
        }
    }

    schema
        .properties
        .iter()
        .map(|spec| {
            let value = match written.get(&spec.id) {
                Some(value) => restore_value(spec, value).unwrap_or_else(|reason| {
                    warnings.push(LoadWarning::InvalidValue {
                        node,
                        property: spec.id.clone(),
                        value: value.clone(),
                        reason,
                    });
                    spec.initial_value()
                }),
                None => spec.initial_value(),
            };
            (spec.id.clone(), value)
        })
        .collect()
}

fn restore_value(
    spec: &PropertySpec,
    value: &serde_json::Value,
) -> Result<ConfigValue, ValueError> {
    let coerced = spec.coerce(value).ok_or_else(|| ValueError::WrongType {
        kind: spec.kind,
        expected: spec.kind.expected_shape(),
        found: json_shape(value),
    })?;
    spec.validate(&coerced)?;
    Ok(coerced)
}

fn json_shape(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "text",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl Graph {
    /// Serialize into a document
    pub fn to_document(&self) -> WorkflowDocument {
        serialize(self)
    }
}

impl SharedGraph {
    /// Replace the graph with one loaded from JSON text.
    ///
    /// The current graph is left untouched when loading fails.
    pub fn load_json(&self, text: &str) -> Result<Vec<LoadWarning>, DocumentError> {
        let document = WorkflowDocument::from_json(text)?;
        let registry = self.read().registry().clone();
        let loaded = deserialize(&document, registry)?;
        self.replace(loaded.graph);
        Ok(loaded.warnings)
    }
}
