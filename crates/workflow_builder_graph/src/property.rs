// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configurable node properties and their constraints.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node configuration: property id to value, in declaration order
pub type Config = IndexMap<String, ConfigValue>;

/// Editor kind of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Single-line text
    Text,
    /// Numeric value with optional bounds
    Number,
    /// One of a fixed set of options
    Select,
    /// Boolean toggle
    Checkbox,
    /// Multi-line text
    Textarea,
}

impl PropertyKind {
    /// Shape of value this kind stores, for error messages
    pub fn expected_shape(&self) -> &'static str {
        match self {
            Self::Number => "a number",
            Self::Checkbox => "a boolean",
            Self::Text | Self::Select | Self::Textarea => "text",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Select => "select",
            Self::Checkbox => "checkbox",
            Self::Textarea => "textarea",
        };
        f.write_str(name)
    }
}

/// A stored configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Checkbox state
    Bool(bool),
    /// Number
    Number(f64),
    /// Text, textarea or select value
    Text(String),
}

impl ConfigValue {
    /// Short name of the value's shape, for error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }

    /// Borrow the text, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the number, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// Get the boolean, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Convert into a JSON value for documents
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(flag) => serde_json::Value::Bool(*flag),
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(text) => serde_json::Value::String(text.clone()),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<f64> for ConfigValue {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl From<bool> for ConfigValue {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "{text:?}"),
        }
    }
}

/// An option of a select property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Stored value
    pub value: String,
    /// Display label
    pub label: String,
}

impl SelectOption {
    /// Create a new option
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Show a property only while another property holds a given value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    /// Property the condition reads
    pub property: String,
    /// Value that makes the property visible
    pub equals: ConfigValue,
}

impl Visibility {
    /// Evaluate against a configuration
    pub fn is_visible(&self, config: &Config) -> bool {
        config.get(&self.property) == Some(&self.equals)
    }
}

/// Why a value was rejected for a property
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    /// Value has the wrong shape for the property kind
    #[error("{kind} property expects {expected}, got {found}")]
    WrongType {
        /// Property kind
        kind: PropertyKind,
        /// Expected shape
        expected: &'static str,
        /// Shape that was given
        found: &'static str,
    },

    /// Number is NaN or infinite
    #[error("number must be finite")]
    NotFinite,

    /// Number is outside the declared range
    #[error("{value} is below the minimum of {min}")]
    BelowMinimum {
        /// Rejected value
        value: f64,
        /// Declared minimum
        min: f64,
    },

    /// Number is outside the declared range
    #[error("{value} is above the maximum of {max}")]
    AboveMaximum {
        /// Rejected value
        value: f64,
        /// Declared maximum
        max: f64,
    },

    /// Select value is not among the declared options
    #[error("{value:?} is not one of the options")]
    NotAnOption {
        /// Rejected value
        value: String,
    },
}

/// A configurable property declared by a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Property identifier
    pub id: String,
    /// Display label
    pub label: String,
    /// Editor kind
    pub kind: PropertyKind,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ConfigValue>,
    /// Minimum (number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum (number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Editor step (number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Allowed values (select)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    /// Must hold a non-empty value before the workflow can run
    #[serde(default)]
    pub required: bool,
    /// Help text shown under the editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Visibility condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<Visibility>,
}

impl PropertySpec {
    /// Create a new property of the given kind
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            default: None,
            min: None,
            max: None,
            step: None,
            options: Vec::new(),
            required: false,
            help: None,
            visible_when: None,
        }
    }

    /// Create a text property
    pub fn text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, PropertyKind::Text)
    }

    /// Create a textarea property
    pub fn textarea(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, PropertyKind::Textarea)
    }

    /// Create a number property
    pub fn number(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, PropertyKind::Number)
    }

    /// Create a checkbox property
    pub fn checkbox(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, PropertyKind::Checkbox)
    }

    /// Create a select property from `(value, label)` pairs
    pub fn select(
        id: impl Into<String>,
        label: impl Into<String>,
        options: &[(&str, &str)],
    ) -> Self {
        let mut spec = Self::new(id, label, PropertyKind::Select);
        spec.options = options
            .iter()
            .map(|(value, label)| SelectOption::new(*value, *label))
            .collect();
        spec
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the numeric range
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Set the editor step
    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set help text
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Show only while `property` equals `value`
    pub fn visible_when(
        mut self,
        property: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Self {
        self.visible_when = Some(Visibility {
            property: property.into(),
            equals: value.into(),
        });
        self
    }

    /// Check whether the property is visible under a configuration
    pub fn is_visible(&self, config: &Config) -> bool {
        self.visible_when
            .as_ref()
            .map_or(true, |condition| condition.is_visible(config))
    }

    /// Check whether a select property offers a value
    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }

    /// Value seeded into new nodes
    pub fn initial_value(&self) -> ConfigValue {
        if let Some(default) = &self.default {
            return default.clone();
        }

        match self.kind {
            PropertyKind::Text | PropertyKind::Textarea => ConfigValue::Text(String::new()),
            PropertyKind::Number => ConfigValue::Number(self.min.unwrap_or(0.0)),
            PropertyKind::Checkbox => ConfigValue::Bool(false),
            PropertyKind::Select => ConfigValue::Text(
                self.options
                    .first()
                    .map(|option| option.value.clone())
                    .unwrap_or_default(),
            ),
        }
    }

    /// Validate a value against the declared kind and constraints
    pub fn validate(&self, value: &ConfigValue) -> Result<(), ValueError> {
        let wrong_type = || ValueError::WrongType {
            kind: self.kind,
            expected: self.kind.expected_shape(),
            found: value.shape(),
        };

        match (self.kind, value) {
            (PropertyKind::Text | PropertyKind::Textarea, ConfigValue::Text(_))
            | (PropertyKind::Checkbox, ConfigValue::Bool(_)) => Ok(()),
            (PropertyKind::Select, ConfigValue::Text(choice)) => {
                if self.has_option(choice) {
                    Ok(())
                } else {
                    Err(ValueError::NotAnOption {
                        value: choice.clone(),
                    })
                }
            }
            (PropertyKind::Number, ConfigValue::Number(number)) => {
                let number = *number;
                if !number.is_finite() {
                    return Err(ValueError::NotFinite);
                }
                if let Some(min) = self.min.filter(|min| number < *min) {
                    return Err(ValueError::BelowMinimum { value: number, min });
                }
                if let Some(max) = self.max.filter(|max| number > *max) {
                    return Err(ValueError::AboveMaximum { value: number, max });
                }
                Ok(())
            }
            _ => Err(wrong_type()),
        }
    }

    /// Check whether a required property is left empty
    pub fn is_unset(&self, config: &Config) -> bool {
        match config.get(&self.id) {
            None => true,
            Some(ConfigValue::Text(text)) => text.trim().is_empty(),
            Some(_) => false,
        }
    }

    /// Coerce a loosely typed document value into this property's shape.
    ///
    /// Form editors store numbers as strings, so numeric text is accepted
    /// for number properties.
    pub fn coerce(&self, value: &serde_json::Value) -> Option<ConfigValue> {
        match (self.kind, value) {
            (_, serde_json::Value::Bool(flag)) => Some(ConfigValue::Bool(*flag)),
            (_, serde_json::Value::Number(number)) => number.as_f64().map(ConfigValue::Number),
            (PropertyKind::Number, serde_json::Value::String(text)) => {
                text.trim().parse::<f64>().ok().map(ConfigValue::Number)
            }
            (_, serde_json::Value::String(text)) => Some(ConfigValue::Text(text.clone())),
            _ => None,
        }
    }
}
