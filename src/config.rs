use crate::vocab::{BuildOptions, OovPolicy, TokenOrdering};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// What to do with a corpus pair whose side does not fit `max_seq_len` once
/// the end marker is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlengthPolicy {
    /// Skip the pair (what the seq2seq loaders did).
    #[default]
    Drop,
    /// Keep the first `max_seq_len - 1` tokens of each side.
    Truncate,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed encoded length, end marker included.
    pub max_seq_len: usize,
    /// Decoder step cap.
    pub max_output_len: usize,
    pub delimiter: char,
    pub lowercase: bool,
    pub overlength: OverlengthPolicy,
    pub ordering: TokenOrdering,
    pub min_freq: usize,
    pub max_size: Option<usize>,
    pub oov: OovPolicy,
    pub unknown_label: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 15,
            max_output_len: 20,
            delimiter: '@',
            lowercase: false,
            overlength: OverlengthPolicy::Drop,
            ordering: TokenOrdering::FirstSeen,
            min_freq: 1,
            max_size: None,
            oov: OovPolicy::Reserved,
            unknown_label: "o".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound(String),
    IoError(io::Error),
    JsonError(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(p) => write!(f, "Config file not found at: {}", p),
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::JsonError(e) => write!(f, "JSON error: {}", e),
            ConfigError::Invalid(s) => write!(f, "Invalid config: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::JsonError(err)
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let path = config_path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_seq_len == 0 {
            return Err(ConfigError::Invalid("max_seq_len must be greater than 0".to_string()));
        }
        if self.delimiter.is_whitespace() {
            return Err(ConfigError::Invalid(
                "delimiter cannot be whitespace, tokens are whitespace-separated".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            ordering: self.ordering,
            min_freq: self.min_freq,
            max_size: self.max_size,
            oov: self.oov,
            ..BuildOptions::default()
        }
    }
}
