// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use crate::node::NodeId;
use crate::port::{DataType, PortDirection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle of a connection inside a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Proposed edge from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    /// Source node ID
    pub source_node: NodeId,
    /// Source (output) port
    pub source_port: String,
    /// Target node ID
    pub target_node: NodeId,
    /// Target (input) port
    pub target_port: String,
}

impl Endpoints {
    /// Create a new edge proposal
    pub fn new(
        source_node: NodeId,
        source_port: impl Into<String>,
        target_node: NodeId,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source_node,
            source_port: source_port.into(),
            target_node,
            target_port: target_port.into(),
        }
    }
}

/// A connection between two ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Connected ports
    pub endpoints: Endpoints,
}

impl Connection {
    /// Create a new connection
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            id: ConnectionId::new(),
            endpoints,
        }
    }

    /// Source node ID
    pub fn source_node(&self) -> NodeId {
        self.endpoints.source_node
    }

    /// Target node ID
    pub fn target_node(&self) -> NodeId {
        self.endpoints.target_node
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.endpoints.source_node == node_id || self.endpoints.target_node == node_id
    }

    /// Check if this connection starts at an output port
    pub fn is_from(&self, node_id: NodeId, port: &str) -> bool {
        self.endpoints.source_node == node_id && self.endpoints.source_port == port
    }

    /// Check if this connection ends at an input port
    pub fn is_into(&self, node_id: NodeId, port: &str) -> bool {
        self.endpoints.target_node == node_id && self.endpoints.target_port == port
    }
}

/// Error when creating a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port missing on the required side of the node
    #[error("{node} has no {expected} port {port:?}")]
    InvalidDirection {
        /// Node the port was looked up on
        node: NodeId,
        /// Port id
        port: String,
        /// Side the port had to be on
        expected: PortDirection,
    },

    /// Incompatible port types
    #[error("incompatible connection: {source_type} cannot connect to {target_type}")]
    IncompatibleTypes {
        /// Output port type
        source_type: DataType,
        /// Input port type
        target_type: DataType,
    },

    /// Input port already has a connection
    #[error("input port {port:?} of {node} already has a connection")]
    TargetAlreadyConnected {
        /// Target node
        node: NodeId,
        /// Target port
        port: String,
    },
}
