use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("missing setting '{key}' ({description})")]
    Configuration { key: String, description: String },

    #[error("stage '{stage}' is not in the allowed list: {allowed}")]
    InvalidStage { stage: String, allowed: String },

    #[error("invalid store address '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to read values from {}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: Box<ImportError>,
    },

    #[error("failed to write key '{key}'")]
    Import {
        key: String,
        #[source]
        source: Box<ImportError>,
    },

    #[error("import into {target} failed")]
    ImportFailed {
        target: String,
        #[source]
        source: Box<ImportError>,
    },

    #[error("store rejected write to '{path}': {reason}")]
    KvWrite { path: String, reason: String },

    #[error("update check failed: {0}")]
    UpdateCheck(String),

    #[error("update failed: {0}")]
    UpdateApply(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ImportError {
    pub fn configuration(key: impl Into<String>, description: impl Into<String>) -> Self {
        ImportError::Configuration {
            key: key.into(),
            description: description.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
