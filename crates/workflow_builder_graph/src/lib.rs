// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph core for the workflow builder.
//!
//! This crate provides the model behind a visual workflow editor:
//! - A registry of node types with typed ports and configurable properties
//! - A graph store whose connections are validated on the way in
//! - A JSON document format with tolerant loading
//! - An executor that runs a graph against pluggable node behaviors
//!
//! ## Architecture
//!
//! Node types are plain data ([`NodeTypeSchema`]). A node's ports can depend
//! on its configuration, so every read path derives the node's effective
//! ports from its schema and current config instead of storing them.
//! Connections are accepted only when the source is an output, the target an
//! input, the data types are compatible and the target input is still free.
//! Cycles are allowed while editing and reported when a run starts.

pub mod behaviors;
pub mod catalog;
pub mod connection;
pub mod document;
pub mod evaluation;
pub mod graph;
pub mod node;
pub mod port;
pub mod property;
pub mod validation;

pub use behaviors::builtin_behaviors;
pub use catalog::builtin_registry;
pub use connection::{Connection, ConnectionError, ConnectionId, Endpoints};
pub use document::{DocumentError, LoadWarning, LoadedGraph, WorkflowDocument};
pub use evaluation::{
    BehaviorError, BehaviorRegistry, ExecutionError, ExecutionOptions, ExecutionTrace, Executor,
    Invocation, NodeBehavior, NodeFailure, NodeOutput, RunContext,
};
pub use graph::{CycleError, Graph, GraphError, GraphIssue, SharedGraph};
pub use node::{
    Node, NodeCategory, NodeId, NodeRegistry, NodeTypeSchema, Position, SchemaError,
    UnknownNodeType,
};
pub use port::{DataType, PortDirection, PortSpec, PortValue};
pub use property::{Config, ConfigValue, PropertyKind, PropertySpec};
pub use validation::validate_connection;
