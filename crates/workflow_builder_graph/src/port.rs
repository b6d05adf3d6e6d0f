// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Data type that can flow through ports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    /// Text value
    String,
    /// Numeric value
    Number,
    /// Uploaded or generated file
    File,
    /// Audio clip
    Audio,
    /// Image
    Image,
    /// Any type (wildcard)
    Any,
    /// Type declared by an external catalog
    Custom(String),
}

impl DataType {
    /// Name used in documents and catalogs
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Any => "any",
            Self::Custom(name) => name,
        }
    }

    /// Check if an output of this type can feed an input of `other`
    pub fn can_connect_to(&self, other: &DataType) -> bool {
        // The wildcard matches anything on either side
        if matches!(self, Self::Any) || matches!(other, Self::Any) {
            return true;
        }

        self == other
    }
}

impl From<String> for DataType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "file" => Self::File,
            "audio" => Self::Audio,
            "image" => Self::Image,
            "any" => Self::Any,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for DataType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port declared by a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port identifier, unique per direction within a node type
    pub id: String,
    /// Display label
    pub label: String,
    /// Data type
    pub data_type: DataType,
    /// Whether an input must be connected before the workflow can run
    #[serde(default)]
    pub required: bool,
}

impl PortSpec {
    /// Create a new port
    pub fn new(id: impl Into<String>, label: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            required: false,
        }
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Reference to a file-like payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// File name or path
    pub name: String,
    /// MIME type, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Value carried along an edge during execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PortValue {
    /// Text
    String(String),
    /// Number
    Number(f64),
    /// File
    File(FileRef),
    /// Audio clip
    Audio(FileRef),
    /// Image
    Image(FileRef),
    /// Structured data with no declared type
    Json(serde_json::Value),
}

impl PortValue {
    /// Get the data type for this value
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Number(_) => DataType::Number,
            Self::File(_) => DataType::File,
            Self::Audio(_) => DataType::Audio,
            Self::Image(_) => DataType::Image,
            Self::Json(_) => DataType::Any,
        }
    }

    /// Check if this value may be emitted on a port of the given type
    pub fn conforms_to(&self, data_type: &DataType) -> bool {
        match data_type {
            DataType::Any => true,
            DataType::Custom(_) => matches!(self, Self::Json(_)),
            declared => self.data_type() == *declared,
        }
    }

    /// Borrow the text, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }
}

impl From<String> for PortValue {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<&str> for PortValue {
    fn from(text: &str) -> Self {
        Self::String(text.to_string())
    }
}

impl From<f64> for PortValue {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}
