// SPDX-License-Identifier: MIT OR Apache-2.0
//! Language model nodes.
//!
//! Every provider node takes a prompt and reports the response with its
//! token accounting. Providers differ in their model lists, temperature
//! ceiling and which answer annotations they support.

use super::name_property;
use crate::node::{NodeCategory, NodeRegistry, NodeTypeSchema, SchemaError};
use crate::port::{DataType, PortSpec};
use crate::property::PropertySpec;

struct Provider {
    type_name: &'static str,
    title: &'static str,
    description: &'static str,
    models: &'static [(&'static str, &'static str)],
    default_model: &'static str,
    max_temperature: f64,
    show_sources: bool,
    show_confidence: bool,
}

const PROVIDERS: [Provider; 5] = [
    Provider {
        type_name: "openai",
        title: "OpenAI",
        description: "Use OpenAI language models to generate text",
        models: &[
            ("gpt-4", "GPT-4"),
            ("gpt-4-turbo", "GPT-4 Turbo"),
            ("gpt-3.5-turbo", "GPT-3.5 Turbo"),
        ],
        default_model: "gpt-3.5-turbo",
        max_temperature: 2.0,
        show_sources: true,
        show_confidence: true,
    },
    Provider {
        type_name: "anthropic",
        title: "Anthropic",
        description: "Use Anthropic Claude language models",
        models: &[
            ("claude-3-opus", "Claude 3 Opus"),
            ("claude-3-sonnet", "Claude 3 Sonnet"),
            ("claude-3-haiku", "Claude 3 Haiku"),
        ],
        default_model: "claude-3-haiku",
        max_temperature: 1.0,
        show_sources: true,
        show_confidence: true,
    },
    Provider {
        type_name: "cohere",
        title: "Cohere",
        description: "Use Cohere language models",
        models: &[("command-r", "Command R"), ("command-r-plus", "Command R+")],
        default_model: "command-r",
        max_temperature: 1.0,
        show_sources: false,
        show_confidence: false,
    },
    Provider {
        type_name: "google",
        title: "Google",
        description: "Use Google Gemini language models",
        models: &[("gemini-pro", "Gemini Pro"), ("gemini-ultra", "Gemini Ultra")],
        default_model: "gemini-pro",
        max_temperature: 1.0,
        show_sources: true,
        show_confidence: false,
    },
    Provider {
        type_name: "azure",
        title: "Azure OpenAI",
        description: "Use Azure OpenAI language models",
        models: &[("gpt-4", "GPT-4"), ("gpt-3.5-turbo", "GPT-3.5 Turbo")],
        default_model: "gpt-3.5-turbo",
        max_temperature: 1.0,
        show_sources: true,
        show_confidence: true,
    },
];

fn language_model(provider: &Provider) -> NodeTypeSchema {
    let mut schema = NodeTypeSchema::new(
        provider.type_name,
        provider.title,
        NodeCategory::LanguageModel,
        provider.description,
    )
    .input(PortSpec::new("prompt", "Prompt", DataType::String).required())
    .output(PortSpec::new("response", "Response", DataType::String))
    .output(PortSpec::new("tokens_used", "Tokens Used", DataType::Number))
    .output(PortSpec::new("input_tokens", "Input Tokens", DataType::Number))
    .output(PortSpec::new("output_tokens", "Output Tokens", DataType::Number))
    .output(PortSpec::new("credits_used", "Credits Used", DataType::Number))
    .property(name_property(provider.title));

    // OpenAI nodes can be routed through another vendor
    if provider.type_name == "openai" {
        schema = schema.property(
            PropertySpec::select(
                "provider",
                "Provider",
                &[
                    ("openai", "OpenAI"),
                    ("azure", "Azure OpenAI"),
                    ("anthropic", "Anthropic"),
                    ("google", "Google"),
                ],
            )
            .with_default("openai"),
        );
    }

    schema = schema.property(
        PropertySpec::select("model", "Model", provider.models)
            .with_default(provider.default_model),
    );

    if provider.type_name == "azure" {
        schema = schema.property(PropertySpec::text("deploymentName", "Deployment Name"));
    }

    schema = schema
        .property(
            PropertySpec::number("maxTokens", "Max Tokens")
                .with_default(1000.0)
                .range(50.0, 4000.0),
        )
        .property(
            PropertySpec::number("temperature", "Temperature")
                .with_default(0.7)
                .range(0.0, provider.max_temperature)
                .step(0.1),
        )
        .property(
            PropertySpec::number("topP", "Top P")
                .with_default(1.0)
                .range(0.0, 1.0)
                .step(0.01),
        )
        .property(PropertySpec::checkbox("streamResponse", "Stream Response").with_default(false))
        .property(PropertySpec::checkbox("jsonOutput", "JSON Output").with_default(false));

    if provider.show_sources {
        schema = schema
            .property(PropertySpec::checkbox("showSources", "Show Sources").with_default(false));
    }
    if provider.show_confidence {
        schema = schema.property(
            PropertySpec::checkbox("showConfidence", "Show Confidence").with_default(false),
        );
    }

    schema
        .property(
            PropertySpec::checkbox("toxicInputFiltration", "Toxic Input Filtration")
                .with_default(true),
        )
        .property(PropertySpec::checkbox("detectPII", "Detect PII").with_default(true))
}

pub(super) fn register(registry: &mut NodeRegistry) -> Result<(), SchemaError> {
    for provider in &PROVIDERS {
        registry.register(language_model(provider))?;
    }
    Ok(())
}
