// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nodes that bring data into a workflow.

use super::name_property;
use crate::node::{DynamicPorts, NodeCategory, NodeRegistry, NodeTypeSchema, PortCase, SchemaError};
use crate::port::{DataType, PortSpec};
use crate::property::PropertySpec;

pub(super) fn register(registry: &mut NodeRegistry) -> Result<(), SchemaError> {
    // ========================================================================
    // Generic input
    // ========================================================================

    registry.register(
        NodeTypeSchema::new(
            "input",
            "Input",
            NodeCategory::Input,
            "Pass data of different types into your workflow",
        )
        .output(PortSpec::new("text", "Text", DataType::String))
        .property(name_property("Input"))
        .property(
            PropertySpec::select(
                "type",
                "Type",
                &[("text", "Text"), ("file", "File"), ("audio", "Audio")],
            )
                .with_default("text"),
        )
        .dynamic_ports(DynamicPorts {
            property: "type".to_string(),
            cases: vec![
                PortCase {
                    when: "file".to_string(),
                    inputs: None,
                    outputs: Some(vec![
                        PortSpec::new("processed_text", "Processed Text", DataType::String),
                        PortSpec::new("file", "File", DataType::File),
                    ]),
                },
                PortCase {
                    when: "audio".to_string(),
                    inputs: None,
                    outputs: Some(vec![PortSpec::new("audio", "Audio", DataType::Audio)]),
                },
            ],
        }),
    )?;

    // ========================================================================
    // Typed inputs
    // ========================================================================

    registry.register(
        NodeTypeSchema::new(
            "textInput",
            "Text Input",
            NodeCategory::Input,
            "Provides text input to the workflow",
        )
        .output(PortSpec::new("text", "Text", DataType::String))
        .property(name_property("Text Input"))
        .property(PropertySpec::text("defaultValue", "Default Value"))
        .property(PropertySpec::text("placeholder", "Placeholder").with_default("Enter text..."))
        .property(PropertySpec::checkbox("required", "Required").with_default(false)),
    )?;

    registry.register(
        NodeTypeSchema::new(
            "fileInput",
            "File Upload",
            NodeCategory::Input,
            "Allows uploading files to the workflow",
        )
        .output(PortSpec::new("file", "File", DataType::File))
        .property(name_property("File Upload"))
        .property(
            PropertySpec::text("acceptTypes", "Accept File Types").help("e.g. .jpg,.png,image/*"),
        )
        .property(PropertySpec::checkbox("multiple", "Allow Multiple Files").with_default(false)),
    )?;

    registry.register(
        NodeTypeSchema::new(
            "apiInput",
            "API Request",
            NodeCategory::Input,
            "Fetches data from an API endpoint",
        )
        .output(PortSpec::new("data", "Data", DataType::Any))
        .property(name_property("API Request"))
        .property(PropertySpec::text("url", "API URL"))
        .property(
            PropertySpec::select(
                "method",
                "Method",
                &[("GET", "GET"), ("POST", "POST"), ("PUT", "PUT"), ("DELETE", "DELETE")],
            )
            .with_default("GET"),
        )
        .property(PropertySpec::textarea("headers", "Headers (JSON)").with_default("{}"))
        .property(PropertySpec::textarea("body", "Request Body (JSON)").with_default("{}")),
    )?;

    Ok(())
}
