// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions, node type schemas and the type registry.

use crate::port::{PortDirection, PortSpec};
use crate::property::{Config, ConfigValue, PropertyKind, PropertySpec, ValueError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Prefix of node ids in documents
const NODE_ID_PREFIX: &str = "node-";

/// Identifier of a node within a graph.
///
/// Ids are handed out by a monotonic counter and never reused, so a stale
/// reference to a deleted node can always be told apart from a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(pub u64);

impl NodeId {
    /// Raw counter value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{NODE_ID_PREFIX}{}", self.0)
    }
}

/// Error when a string is not a node id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id {0:?}, expected the form \"node-<n>\"")]
pub struct ParseNodeIdError(pub String);

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Canonical form only, as written by `Display`
        s.strip_prefix(NODE_ID_PREFIX)
            .filter(|digits| {
                !digits.is_empty()
                    && digits.bytes().all(|b| b.is_ascii_digit())
                    && (*digits == "0" || !digits.starts_with('0'))
            })
            .and_then(|digits| digits.parse::<u64>().ok())
            .map(NodeId)
            .ok_or_else(|| ParseNodeIdError(s.to_string()))
    }
}

impl TryFrom<String> for NodeId {
    type Error = ParseNodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// Position on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset
    pub x: f32,
    /// Vertical offset
    pub y: f32,
}

impl Position {
    /// Create a new position
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Palette category of a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Sources of data
    Input,
    /// Transformations of data
    Processing,
    /// Sinks of data
    Output,
    /// Language model calls
    LanguageModel,
}

impl NodeCategory {
    /// Get display name for this category
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Processing => "Processing",
            Self::Output => "Output",
            Self::LanguageModel => "Language Model",
        }
    }
}

impl FromStr for NodeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "input" => Ok(Self::Input),
            "processing" => Ok(Self::Processing),
            "output" => Ok(Self::Output),
            "language_model" | "llm" => Ok(Self::LanguageModel),
            other => Err(format!("unknown category {other:?}")),
        }
    }
}

/// Port overrides applied when a select property holds a given value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortCase {
    /// Option value that activates this case
    pub when: String,
    /// Replacement input ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<PortSpec>>,
    /// Replacement output ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<PortSpec>>,
}

/// Ports that change shape with a select property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPorts {
    /// Select property that picks the case
    pub property: String,
    /// Cases by option value
    pub cases: Vec<PortCase>,
}

/// Ports of a node under its current configuration
#[derive(Debug, Clone, Copy)]
pub struct EffectivePorts<'a> {
    /// Input ports
    pub inputs: &'a [PortSpec],
    /// Output ports
    pub outputs: &'a [PortSpec],
}

impl<'a> EffectivePorts<'a> {
    /// Find an input port by id
    pub fn input(&self, id: &str) -> Option<&'a PortSpec> {
        self.inputs.iter().find(|port| port.id == id)
    }

    /// Find an output port by id
    pub fn output(&self, id: &str) -> Option<&'a PortSpec> {
        self.outputs.iter().find(|port| port.id == id)
    }

    /// Find a port on one side
    pub fn port(&self, direction: PortDirection, id: &str) -> Option<&'a PortSpec> {
        match direction {
            PortDirection::Input => self.input(id),
            PortDirection::Output => self.output(id),
        }
    }
}

/// Immutable definition of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeSchema {
    /// Unique type name
    pub type_name: String,
    /// Display title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Palette category
    pub category: NodeCategory,
    /// Input ports when no dynamic case applies
    #[serde(default)]
    pub inputs: Vec<PortSpec>,
    /// Output ports when no dynamic case applies
    #[serde(default)]
    pub outputs: Vec<PortSpec>,
    /// Configurable properties
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    /// Ports that depend on configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_ports: Option<DynamicPorts>,
}

impl NodeTypeSchema {
    /// Create a schema with no ports or properties
    pub fn new(
        type_name: impl Into<String>,
        title: impl Into<String>,
        category: NodeCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            title: title.into(),
            description: description.into(),
            category,
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
            dynamic_ports: None,
        }
    }

    /// Add an input port
    pub fn input(mut self, port: PortSpec) -> Self {
        self.inputs.push(port);
        self
    }

    /// Add an output port
    pub fn output(mut self, port: PortSpec) -> Self {
        self.outputs.push(port);
        self
    }

    /// Add a property
    pub fn property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    /// Set the dynamic port rule
    pub fn dynamic_ports(mut self, rule: DynamicPorts) -> Self {
        self.dynamic_ports = Some(rule);
        self
    }

    /// Get a property by id
    pub fn property_spec(&self, id: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Configuration seeded into new nodes
    pub fn default_config(&self) -> Config {
        self.properties
            .iter()
            .map(|p| (p.id.clone(), p.initial_value()))
            .collect()
    }

    /// Derive the ports of a node of this type under `config`
    pub fn effective_ports<'a>(&'a self, config: &Config) -> EffectivePorts<'a> {
        let mut ports = EffectivePorts {
            inputs: &self.inputs,
            outputs: &self.outputs,
        };

        let Some(rule) = &self.dynamic_ports else {
            return ports;
        };
        let Some(selected) = config.get(&rule.property).and_then(ConfigValue::as_str) else {
            return ports;
        };

        if let Some(case) = rule.cases.iter().find(|case| case.when == selected) {
            if let Some(inputs) = &case.inputs {
                ports.inputs = inputs;
            }
            if let Some(outputs) = &case.outputs {
                ports.outputs = outputs;
            }
        }
        ports
    }

    /// Properties visible under `config`
    pub fn visible_properties<'a>(
        &'a self,
        config: &'a Config,
    ) -> impl Iterator<Item = &'a PropertySpec> + 'a {
        self.properties.iter().filter(move |p| p.is_visible(config))
    }

    /// Check the schema for internal consistency
    pub fn validate(&self) -> Result<(), SchemaError> {
        let type_name = &self.type_name;
        if type_name.trim().is_empty() {
            return Err(SchemaError::EmptyTypeName);
        }

        check_unique_ports(type_name, PortDirection::Input, &self.inputs)?;
        check_unique_ports(type_name, PortDirection::Output, &self.outputs)?;

        let mut property_ids = HashSet::new();
        for property in &self.properties {
            if !property_ids.insert(property.id.as_str()) {
                return Err(SchemaError::DuplicateProperty {
                    type_name: type_name.clone(),
                    property: property.id.clone(),
                });
            }

            if property.kind == PropertyKind::Select && property.options.is_empty() {
                return Err(SchemaError::NoOptions {
                    type_name: type_name.clone(),
                    property: property.id.clone(),
                });
            }

            if let (Some(min), Some(max)) = (property.min, property.max) {
                if min > max {
                    return Err(SchemaError::InvalidRange {
                        type_name: type_name.clone(),
                        property: property.id.clone(),
                    });
                }
            }

            property
                .validate(&property.initial_value())
                .map_err(|reason| SchemaError::InvalidDefault {
                    type_name: type_name.clone(),
                    property: property.id.clone(),
                    reason,
                })?;
        }

        if let Some(rule) = &self.dynamic_ports {
            let selector = self
                .property_spec(&rule.property)
                .filter(|p| p.kind == PropertyKind::Select)
                .ok_or_else(|| SchemaError::InvalidPortRule {
                    type_name: type_name.clone(),
                    reason: format!("{:?} is not a select property", rule.property),
                })?;

            for case in &rule.cases {
                if !selector.has_option(&case.when) {
                    return Err(SchemaError::InvalidPortRule {
                        type_name: type_name.clone(),
                        reason: format!("{:?} is not an option of {:?}", case.when, rule.property),
                    });
                }
                if let Some(inputs) = &case.inputs {
                    check_unique_ports(type_name, PortDirection::Input, inputs)?;
                }
                if let Some(outputs) = &case.outputs {
                    check_unique_ports(type_name, PortDirection::Output, outputs)?;
                }
            }
        }

        Ok(())
    }
}

fn check_unique_ports(
    type_name: &str,
    direction: PortDirection,
    ports: &[PortSpec],
) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port.id.as_str()) {
            return Err(SchemaError::DuplicatePort {
                type_name: type_name.to_string(),
                direction,
                port: port.id.clone(),
            });
        }
    }
    Ok(())
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Node type name
    pub type_name: String,
    /// Current configuration
    pub config: Config,
    /// Position in the canvas
    pub position: Position,
}

impl Node {
    /// Create a new node from a type definition
    pub fn new(id: NodeId, schema: &NodeTypeSchema, position: Position) -> Self {
        Self {
            id,
            type_name: schema.type_name.clone(),
            config: schema.default_config(),
            position,
        }
    }

    /// Display name from the `name` property, if set
    pub fn display_name(&self) -> Option<&str> {
        self.config
            .get("name")
            .and_then(ConfigValue::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// Error when a node type is not registered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node type {0:?}")]
pub struct UnknownNodeType(pub String);

/// Error when registering a node type
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Type name is blank
    #[error("node type name is empty")]
    EmptyTypeName,

    /// Type name already registered
    #[error("node type {0:?} is already registered")]
    DuplicateType(String),

    /// Two ports share an id on the same side
    #[error("{type_name}: duplicate {direction} port {port:?}")]
    DuplicatePort {
        /// Node type
        type_name: String,
        /// Side of the node
        direction: PortDirection,
        /// Port id
        port: String,
    },

    /// Two properties share an id
    #[error("{type_name}: duplicate property {property:?}")]
    DuplicateProperty {
        /// Node type
        type_name: String,
        /// Property id
        property: String,
    },

    /// Select property with nothing to select
    #[error("{type_name}: select property {property:?} has no options")]
    NoOptions {
        /// Node type
        type_name: String,
        /// Property id
        property: String,
    },

    /// Minimum above maximum
    #[error("{type_name}: property {property:?} has min greater than max")]
    InvalidRange {
        /// Node type
        type_name: String,
        /// Property id
        property: String,
    },

    /// Default violates the property's own constraints
    #[error("{type_name}: invalid default for {property:?}: {reason}")]
    InvalidDefault {
        /// Node type
        type_name: String,
        /// Property id
        property: String,
        /// Constraint that failed
        #[source]
        reason: ValueError,
    },

    /// Dynamic port rule is inconsistent with the properties
    #[error("{type_name}: invalid dynamic port rule: {reason}")]
    InvalidPortRule {
        /// Node type
        type_name: String,
        /// Description
        reason: String,
    },

    /// Catalog text could not be parsed
    #[error("failed to parse node catalog: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Registry of available node types
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    /// Registered node types by name
    types: IndexMap<String, NodeTypeSchema>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type after validating it
    pub fn register(&mut self, schema: NodeTypeSchema) -> Result<(), SchemaError> {
        schema.validate()?;
        if self.types.contains_key(&schema.type_name) {
            return Err(SchemaError::DuplicateType(schema.type_name));
        }
        self.types.insert(schema.type_name.clone(), schema);
        Ok(())
    }

    /// Register every type of a RON catalog (a list of schemas).
    ///
    /// Nothing is registered unless the whole catalog is valid.
    pub fn extend_from_ron(&mut self, source: &str) -> Result<usize, SchemaError> {
        let schemas: Vec<NodeTypeSchema> = ron::from_str(source)?;

        let mut staged = self.clone();
        for schema in schemas.iter().cloned() {
            staged.register(schema)?;
        }
        *self = staged;
        Ok(schemas.len())
    }

    /// Get a node type by name
    pub fn get(&self, type_name: &str) -> Option<&NodeTypeSchema> {
        self.types.get(type_name)
    }

    /// Get a node type by name, failing if it is not registered
    pub fn lookup(&self, type_name: &str) -> Result<&NodeTypeSchema, UnknownNodeType> {
        self.get(type_name)
            .ok_or_else(|| UnknownNodeType(type_name.to_string()))
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeSchema> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(
        &self,
        category: NodeCategory,
    ) -> impl Iterator<Item = &NodeTypeSchema> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
