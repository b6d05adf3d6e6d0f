// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nodes that transform data.

use super::name_property;
use crate::node::{NodeCategory, NodeRegistry, NodeTypeSchema, SchemaError};
use crate::port::{DataType, PortSpec};
use crate::property::PropertySpec;

pub(super) fn register(registry: &mut NodeRegistry) -> Result<(), SchemaError> {
    registry.register(
        NodeTypeSchema::new(
            "textProcessor",
            "Text Processor",
            NodeCategory::Processing,
            "Performs operations on text data",
        )
        .input(PortSpec::new("text", "Text", DataType::String).required())
        .output(PortSpec::new("result", "Result", DataType::String))
        .property(name_property("Text Processor"))
        .property(
            PropertySpec::select(
                "operation",
                "Operation",
                &[
                    ("toUpperCase", "To Upper Case"),
                    ("toLowerCase", "To Lower Case"),
                    ("trim", "Trim Whitespace"),
                    ("replace", "Replace Text"),
                ],
            )
            .with_default("toUpperCase"),
        )
        .property(PropertySpec::text("findText", "Find Text").visible_when("operation", "replace"))
        .property(
            PropertySpec::text("replaceWith", "Replace With").visible_when("operation", "replace"),
        ),
    )?;

    registry.register(
        NodeTypeSchema::new(
            "filter",
            "Filter",
            NodeCategory::Processing,
            "Filters data based on conditions",
        )
        .input(PortSpec::new("data", "Data", DataType::Any))
        .output(PortSpec::new("filtered", "Filtered", DataType::Any))
        .property(name_property("Filter"))
        .property(
            PropertySpec::textarea("condition", "Filter Condition")
                .with_default("true")
                .help("Expression to filter data items. Use \"item\" variable, e.g., item.id > 10"),
        ),
    )?;

    registry.register(
        NodeTypeSchema::new(
            "transformer",
            "Transformer",
            NodeCategory::Processing,
            "Transforms data using custom code",
        )
        .input(PortSpec::new("data", "Data", DataType::Any))
        .output(PortSpec::new("result", "Result", DataType::Any))
        .property(name_property("Transformer"))
        .property(
            PropertySpec::textarea("transformation", "Transformation Code")
                .with_default("return input;")
                .help("Code to transform input. Use \"input\" variable and return result."),
        ),
    )?;

    Ok(())
}
