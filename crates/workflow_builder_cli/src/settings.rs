// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line settings.
//!
//! Settings live in a RON file. Command-line flags override what the file
//! says; a missing default file means built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use workflow_builder_graph::ExecutionOptions;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file looked up in the working directory
pub const SETTINGS_FILE_NAME: &str = "workflow-builder.ron";

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Per-node time limit in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_timeout_secs: Option<u64>,
    /// Nodes allowed to run at once
    pub max_concurrency: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        let options = ExecutionOptions::default();
        Self {
            node_timeout_secs: None,
            max_concurrency: options.max_concurrency,
        }
    }
}

impl ExecutorSettings {
    /// Convert into executor options
    pub fn to_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            node_timeout: self.node_timeout_secs.map(Duration::from_secs),
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Settings file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Format version
    pub version: u32,
    /// Default log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Executor tuning
    #[serde(default)]
    pub executor: ExecutorSettings,
    /// Extra node catalogs, relative to the settings file
    #[serde(default)]
    pub catalogs: Vec<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            log_level: default_log_level(),
            executor: ExecutorSettings::default(),
            catalogs: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: Settings = ron::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        // Version check
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_FORMAT_VERSION
                ),
            ));
        }

        if let Some(base) = path.parent() {
            for catalog in &mut settings.catalogs {
                if catalog.is_relative() {
                    *catalog = base.join(&*catalog);
                }
            }
        }

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, config).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(path, content)
    }

    /// Load an explicitly named file, or the default file when present
    pub fn discover(explicit: Option<&Path>) -> std::io::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let fallback = Path::new(SETTINGS_FILE_NAME);
        if fallback.is_file() {
            Self::load(fallback)
        } else {
            Ok(Self::default())
        }
    }
}
