// SPDX-License-Identifier: MIT OR Apache-2.0
//! Behaviors for the built-in node types that need no external service.
//!
//! Language model, API and file export nodes have no built-in behavior;
//! hosts register their own.

use crate::evaluation::{BehaviorError, BehaviorRegistry, Invocation, NodeOutput};
use crate::port::PortValue;

/// Registry with every built-in behavior
pub fn builtin_behaviors() -> BehaviorRegistry {
    let mut behaviors = BehaviorRegistry::new();
    behaviors.register("input", input);
    behaviors.register("textInput", text_input);
    behaviors.register("textProcessor", text_processor);
    behaviors.register("filter", filter);
    behaviors.register("transformer", transformer);
    behaviors.register("display", sink);
    behaviors.register("output", sink);
    behaviors
}

fn supplied_text(invocation: &Invocation) -> Result<Option<String>, BehaviorError> {
    match &invocation.supplied {
        None => Ok(None),
        Some(PortValue::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(BehaviorError(format!(
            "expected text to be supplied, got {}",
            other.data_type()
        ))),
    }
}

async fn input(invocation: Invocation) -> Result<NodeOutput, BehaviorError> {
    match invocation.config_str("type").unwrap_or("text") {
        "text" => {
            let text = supplied_text(&invocation)?.unwrap_or_default();
            Ok(NodeOutput::new().with("text", text))
        }
        "file" => match &invocation.supplied {
            Some(file @ PortValue::File(_)) => Ok(NodeOutput::new()
                .with("processed_text", String::new())
                .with("file", file.clone())),
            _ => Err("no file was supplied".into()),
        },
        "audio" => match &invocation.supplied {
            Some(clip @ PortValue::Audio(_)) => Ok(NodeOutput::new().with("audio", clip.clone())),
            _ => Err("no audio was supplied".into()),
        },
        other => Err(BehaviorError(format!("unsupported input type {other:?}"))),
    }
}

async fn text_input(invocation: Invocation) -> Result<NodeOutput, BehaviorError> {
    let text = match supplied_text(&invocation)? {
        Some(text) => text,
        None => invocation
            .config_str("defaultValue")
            .unwrap_or_default()
            .to_string(),
    };

    if text.is_empty() && invocation.config_bool("required").unwrap_or(false) {
        return Err("a value is required".into());
    }
    Ok(NodeOutput::new().with("text", text))
}

async fn text_processor(invocation: Invocation) -> Result<NodeOutput, BehaviorError> {
    let text = invocation.input_str("text").unwrap_or_default();
    let result = match invocation.config_str("operation").unwrap_or("toUpperCase") {
        "toUpperCase" => text.to_uppercase(),
        "toLowerCase" => text.to_lowercase(),
        "trim" => text.trim().to_string(),
        "replace" => {
            let find = invocation.config_str("findText").unwrap_or_default();
            let with = invocation.config_str("replaceWith").unwrap_or_default();
            if find.is_empty() {
                text.to_string()
            } else {
                text.replace(find, with)
            }
        }
        other => return Err(BehaviorError(format!("unsupported operation {other:?}"))),
    };
    Ok(NodeOutput::new().with("result", result))
}

/// Passes data through while the condition is the literal `true`
async fn filter(invocation: Invocation) -> Result<NodeOutput, BehaviorError> {
    let condition = invocation.config_str("condition").unwrap_or("true").trim();
    let mut output = NodeOutput::new();
    match condition {
        "true" => {
            if let Some(data) = invocation.input("data") {
                output.set("filtered", data.clone());
            }
        }
        "false" => {}
        other => {
            return Err(BehaviorError(format!(
                "condition {other:?} needs a script runtime"
            )))
        }
    }
    Ok(output)
}

/// Supports only the identity transformation
async fn transformer(invocation: Invocation) -> Result<NodeOutput, BehaviorError> {
    let script = invocation
        .config_str("transformation")
        .unwrap_or("return input;")
        .trim();
    if script != "return input;" {
        return Err(BehaviorError(format!(
            "transformation {script:?} needs a script runtime"
        )));
    }

    let mut output = NodeOutput::new();
    if let Some(data) = invocation.input("data") {
        output.set("result", data.clone());
    }
    Ok(output)
}

async fn sink(invocation: Invocation) -> Result<NodeOutput, BehaviorError> {
    for (port, value) in &invocation.inputs {
        tracing::info!(node = %invocation.node_id, port = %port, ?value, "received");
    }
    Ok(NodeOutput::new())
}
