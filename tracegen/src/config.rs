use crate::annotation::MAX_ENTRIES;
use crate::writer::DEFAULT_FLUSH_THRESHOLD;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    #[serde(default = "default_max_annotation_entries")]
    pub max_annotation_entries: usize,

    #[serde(default = "default_buffer_size_kb")]
    pub buffer_size_kb: u32,

    #[serde(default = "default_data_source_name")]
    pub data_source_name: String,

    /// Name of the root process track; defaults to argv[0].
    #[serde(default)]
    pub process_name: Option<String>,
}

fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

fn default_max_annotation_entries() -> usize {
    MAX_ENTRIES
}

fn default_buffer_size_kb() -> u32 {
    1024
}

fn default_data_source_name() -> String {
    "track_event".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            max_annotation_entries: default_max_annotation_entries(),
            buffer_size_kb: default_buffer_size_kb(),
            data_source_name: default_data_source_name(),
            process_name: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_toml(
            r#"
flush_threshold = 5
process_name = "worker"
"#,
        )
        .unwrap();
        assert_eq!(config.flush_threshold, 5);
        assert_eq!(config.process_name.as_deref(), Some("worker"));
        assert_eq!(config.max_annotation_entries, 16);
        assert_eq!(config.data_source_name, "track_event");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            Config::from_toml("flush_threshold = \"many\""),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tracegen.toml");
        std::fs::write(&path, "buffer_size_kb = 4096\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().buffer_size_kb, 4096);
    }
}
