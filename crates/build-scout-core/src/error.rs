use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Not a build directory: {path}")]
    NotABuildDirectory { path: PathBuf },

    #[error("Blender executable not found: {path}")]
    ExecutableNotFound { path: PathBuf },

    #[error("Failed to extract build information from {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidConfigValue { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("No download source could be reached")]
    SourcesUnreachable,

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    pub(crate) fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotABuildDirectory { .. } => 2,
            Self::ExecutableNotFound { .. } => 3,
            Self::Extraction { .. } => 4,
            Self::ConfigParse { .. } | Self::ConfigKeyNotFound { .. } => 5,
            Self::InvalidConfigValue { .. } => 6,
            Self::SourcesUnreachable => 7,
            _ => 1,
        }
    }
}
