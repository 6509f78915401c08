use std::path::Path;

use lvt_core::KEY_ATTRIBUTE_PRIORITY;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Per-session engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Strip the `<root>`/`</root>` markers the encoder wraps fragments in
    pub strip_root_wrapper: bool,
    /// Key attribute prefixes, highest priority first
    pub key_attributes: Vec<String>,
    /// Maximum nesting depth walked when resolving and rendering
    pub max_depth: usize,
    /// Forward fallback diagnostics to the `log` facade
    pub log_diagnostics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strip_root_wrapper: true,
            key_attributes: KEY_ATTRIBUTE_PRIORITY.iter().map(|a| a.to_string()).collect(),
            max_depth: 64,
            log_diagnostics: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.strip_root_wrapper);
        assert_eq!(config.key_attributes[0], "data-lvt-key=\"");
        assert_eq!(config.key_attributes.len(), 4);
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"max_depth": 8}"#).unwrap();
        assert_eq!(config.max_depth, 8);
        assert!(config.strip_root_wrapper);
        assert!(config.log_diagnostics);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let err = EngineConfig::from_json_str("{max_depth").unwrap_err();
        assert!(matches!(err, EngineError::Json(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"strip_root_wrapper": false, "key_attributes": ["data-row=\""]}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert!(!config.strip_root_wrapper);
        assert_eq!(config.key_attributes, vec!["data-row=\"".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/lvt-config.json").unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
