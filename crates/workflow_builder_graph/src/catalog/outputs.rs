// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nodes that take data out of a workflow.

use super::name_property;
use crate::node::{DynamicPorts, NodeCategory, NodeRegistry, NodeTypeSchema, PortCase, SchemaError};
use crate::port::{DataType, PortSpec};
use crate::property::PropertySpec;

/// Output modes and the data type each accepts
const OUTPUT_MODES: [(&str, &str, DataType); 6] = [
    ("text", "Text", DataType::String),
    ("streamed_text", "Streamed Text", DataType::String),
    ("file", "File", DataType::File),
    ("image", "Image", DataType::Image),
    ("audio", "Audio", DataType::Audio),
    ("json", "JSON", DataType::Any),
];

fn output_port(data_type: DataType) -> PortSpec {
    PortSpec::new("output", "Output", data_type).required()
}

pub(super) fn register(registry: &mut NodeRegistry) -> Result<(), SchemaError> {
    let modes: Vec<(&str, &str)> = OUTPUT_MODES
        .iter()
        .map(|(value, label, _)| (*value, *label))
        .collect();

    registry.register(
        NodeTypeSchema::new(
            "output",
            "Output",
            NodeCategory::Output,
            "Output data of different types from your workflow",
        )
        .input(output_port(DataType::Any))
        .property(name_property("Output"))
        .property(PropertySpec::select("type", "Type", &modes).with_default("text"))
        .property(PropertySpec::text("outputField", "Output").required())
        .property(PropertySpec::checkbox("formatOutput", "Format Output").with_default(true))
        .dynamic_ports(DynamicPorts {
            property: "type".to_string(),
            cases: OUTPUT_MODES
                .into_iter()
                .map(|(value, _, data_type)| PortCase {
                    when: value.to_string(),
                    inputs: Some(vec![output_port(data_type)]),
                    outputs: None,
                })
                .collect(),
        }),
    )?;

    registry.register(
        NodeTypeSchema::new(
            "display",
            "Display Results",
            NodeCategory::Output,
            "Shows data in the workflow",
        )
        .input(PortSpec::new("data", "Data", DataType::Any))
        .property(name_property("Display Results"))
        .property(
            PropertySpec::select(
                "displayFormat",
                "Display Format",
                &[("text", "Text"), ("json", "JSON"), ("table", "Table")],
            )
            .with_default("text"),
        ),
    )?;

    registry.register(
        NodeTypeSchema::new(
            "fileExport",
            "Export to File",
            NodeCategory::Output,
            "Exports data to a downloadable file",
        )
        .input(PortSpec::new("data", "Data", DataType::Any))
        .property(name_property("Export to File"))
        .property(PropertySpec::text("fileName", "File Name").with_default("export.txt"))
        .property(
            PropertySpec::select(
                "fileType",
                "File Type",
                &[("text", "Text (.txt)"), ("json", "JSON (.json)"), ("csv", "CSV (.csv)")],
            )
            .with_default("text"),
        ),
    )?;

    registry.register(
        NodeTypeSchema::new(
            "apiOutput",
            "API Post",
            NodeCategory::Output,
            "Sends data to an API endpoint",
        )
        .input(PortSpec::new("data", "Data", DataType::Any))
        .output(PortSpec::new("response", "Response", DataType::Any))
        .property(name_property("API Post"))
        .property(PropertySpec::text("url", "API URL"))
        .property(
            PropertySpec::select(
                "method",
                "Method",
                &[("POST", "POST"), ("PUT", "PUT"), ("PATCH", "PATCH")],
            )
            .with_default("POST"),
        )
        .property(PropertySpec::textarea("headers", "Headers (JSON)").with_default("{}")),
    )?;

    Ok(())
}
