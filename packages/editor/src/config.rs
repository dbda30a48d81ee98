use std::path::Path;

use scribe_view::DEFAULT_PRIORITY;
use serde::{Deserialize, Serialize};

use crate::EditorError;

/// Editor configuration, usually read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub undo: UndoConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Editable roots created at startup
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UndoConfig {
    /// Maximum number of undo steps (0 = unlimited)
    #[serde(default)]
    pub step_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Priority of highlight spans whose descriptor sets none
    #[serde(default = "default_highlight_priority")]
    pub marker_highlight_priority: u32,
}

fn default_roots() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_highlight_priority() -> u32 {
    DEFAULT_PRIORITY
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo: UndoConfig::default(),
            conversion: ConversionConfig::default(),
            roots: default_roots(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            marker_highlight_priority: default_highlight_priority(),
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EditorError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EditorError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "undo": { "step_limit": 20 },
            "conversion": { "marker_highlight_priority": 5 },
            "roots": ["main", "title"]
        }"#;

        let config = EditorConfig::from_json_str(json).unwrap();
        assert_eq!(config.undo.step_limit, 20);
        assert_eq!(config.conversion.marker_highlight_priority, 5);
        assert_eq!(config.roots, vec!["main", "title"]);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = EditorConfig::from_json_str(r#"{ "undo": {} }"#).unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.undo.step_limit, 0);
        assert_eq!(config.conversion.marker_highlight_priority, DEFAULT_PRIORITY);
        assert_eq!(config.roots, vec!["main"]);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("scribe-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "undo": { "step_limit": 3 } }"#).unwrap();
        let config = EditorConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.unwrap().undo.step_limit, 3);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let error = EditorConfig::load("/nonexistent/scribe/config.json").unwrap_err();
        assert!(matches!(error, EditorError::Io(_)));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let error = EditorConfig::from_json_str(r#"{ "roots": "main" }"#).unwrap_err();
        assert!(matches!(error, EditorError::Config(_)));
    }
}
