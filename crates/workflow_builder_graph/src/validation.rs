// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection validation.
//!
//! Both nodes must exist. A proposed edge is then checked against three
//! rules, in order:
//! 1. direction: the source port is an output and the target port an input
//!    of the nodes' effective ports,
//! 2. type compatibility: equal data types or `any` on either side,
//! 3. fan-in: the target input has no connection yet.
//!
//! Cycles are not rejected here; the executor reports them.

use crate::connection::{ConnectionError, Endpoints};
use crate::graph::Graph;
use crate::port::{PortDirection, PortSpec};

/// Check a proposed connection against a graph without adding it
pub fn validate_connection(graph: &Graph, endpoints: &Endpoints) -> Result<(), ConnectionError> {
    for node_id in [endpoints.source_node, endpoints.target_node] {
        if graph.node(node_id).is_none() {
            return Err(ConnectionError::NodeNotFound(node_id));
        }
    }

    let source = resolve_port(graph, endpoints, PortDirection::Output)?;
    let target = resolve_port(graph, endpoints, PortDirection::Input)?;

    if !source.data_type.can_connect_to(&target.data_type) {
        return Err(ConnectionError::IncompatibleTypes {
            source_type: source.data_type.clone(),
            target_type: target.data_type.clone(),
        });
    }

    if graph
        .connections_to(endpoints.target_node, &endpoints.target_port)
        .next()
        .is_some()
    {
        return Err(ConnectionError::TargetAlreadyConnected {
            node: endpoints.target_node,
            port: endpoints.target_port.clone(),
        });
    }

    Ok(())
}

/// Look up one end of a proposed connection in the node's effective ports
pub(crate) fn resolve_port<'g>(
    graph: &'g Graph,
    endpoints: &Endpoints,
    direction: PortDirection,
) -> Result<&'g PortSpec, ConnectionError> {
    let (node_id, port) = match direction {
        PortDirection::Output => (endpoints.source_node, &endpoints.source_port),
        PortDirection::Input => (endpoints.target_node, &endpoints.target_port),
    };

    let ports = graph
        .effective_ports(node_id)
        .map_err(|_| ConnectionError::NodeNotFound(node_id))?;

    ports
        .port(direction, port)
        .ok_or_else(|| ConnectionError::InvalidDirection {
            node: node_id,
            port: port.clone(),
            expected: direction,
        })
}
