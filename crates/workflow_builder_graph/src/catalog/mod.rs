// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node types of the workflow builder.

mod inputs;
mod language_models;
mod outputs;
mod processing;

use crate::node::{NodeRegistry, SchemaError};
use crate::property::PropertySpec;
use std::sync::{Arc, OnceLock};

static BUILTIN: OnceLock<Arc<NodeRegistry>> = OnceLock::new();

/// Create a registry holding every built-in node type
pub fn create_builtin_registry() -> Result<NodeRegistry, SchemaError> {
    let mut registry = NodeRegistry::new();
    inputs::register(&mut registry)?;
    processing::register(&mut registry)?;
    outputs::register(&mut registry)?;
    language_models::register(&mut registry)?;
    Ok(registry)
}

/// Shared registry of built-in node types, created on first use
pub fn builtin_registry() -> Arc<NodeRegistry> {
    BUILTIN
        .get_or_init(|| {
            Arc::new(create_builtin_registry().expect("built-in node catalog is valid"))
        })
        .clone()
}

/// The display name every node type carries, defaulting to its title
fn name_property(title: &str) -> PropertySpec {
    PropertySpec::text("name", "Node Name").with_default(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeCategory;
    use crate::property::ConfigValue;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let registry = create_builtin_registry().unwrap();
        assert_eq!(registry.len(), 16);

        let names: Vec<&str> = registry.types().map(|t| t.type_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "input",
                "textInput",
                "fileInput",
                "apiInput",
                "textProcessor",
                "filter",
                "transformer",
                "output",
                "display",
                "fileExport",
                "apiOutput",
                "openai",
                "anthropic",
                "cohere",
                "google",
                "azure",
            ]
        );
    }

    #[test]
    fn test_every_type_is_named_after_its_title() {
        for schema in builtin_registry().types() {
            assert_eq!(
                schema.default_config()["name"],
                ConfigValue::from(schema.title.as_str()),
                "{}",
                schema.type_name
            );
        }
    }

    #[test]
    fn test_categories() {
        let registry = builtin_registry();
        let count = |category| registry.types_in_category(category).count();
        assert_eq!(count(NodeCategory::Input), 4);
        assert_eq!(count(NodeCategory::Processing), 3);
        assert_eq!(count(NodeCategory::Output), 4);
        assert_eq!(count(NodeCategory::LanguageModel), 5);
    }
}
