use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the wake word engine and its settings store.
///
/// Only `PermissionDenied` and `SourceUnavailable` describe runtime failures of
/// the engine itself; transient session ends are absorbed by the state machine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("transcript source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid wake phrase: {0:?}")]
    InvalidPhrase(String),

    #[error("settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}
