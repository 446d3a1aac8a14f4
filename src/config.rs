//! Engine configuration, loadable from TOML
use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Spacing between generated sequence numbers (10, 20, 30, ...)
    pub sequence_step: u32,
    /// When false, a resolved approver list naming someone twice is refused
    pub allow_duplicate_approvers: bool,
    /// Label cached on a line when its document cannot be resolved
    pub unknown_document_label: String,
    pub lines_tree: String,
    pub index_tree: String,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sequence_step: 10,
            allow_duplicate_approvers: false,
            unknown_document_label: "Unknown".to_owned(),
            lines_tree: "approval_lines".to_owned(),
            index_tree: "approval_line_index".to_owned(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Compact,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_step == 0 {
            return Err(ConfigError::Validation(
                "sequence_step must be greater than zero".into(),
            ));
        }
        if self.lines_tree.is_empty() || self.index_tree.is_empty() {
            return Err(ConfigError::Validation("tree names must not be empty".into()));
        }
        if self.lines_tree == self.index_tree {
            return Err(ConfigError::Validation(
                "lines_tree and index_tree must differ".into(),
            ));
        }
        Ok(())
    }

    /// Sequence number of the approver at `position` (zero based)
    pub fn sequence_for(&self, position: usize) -> u32 {
        let step = u64::from(self.sequence_step);
        u32::try_from((position as u64 + 1) * step).unwrap_or(u32::MAX)
    }
}
