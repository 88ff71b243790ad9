//! Engine errors.
//!
//! Activation failures (missing samples, failed renders) are fatal to the
//! activation that hit them and are never retried. Nothing here covers the
//! empty-pool mandatory trigger: that is a silent no-op in the chord planner.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error("sample group not found in library: {name}")]
    MissingSample { name: String },

    #[error("offline render of {variant} failed: {reason}")]
    RenderFailure { variant: String, reason: String },

    #[error("rendered variant {variant} has no buffers")]
    EmptyVariant { variant: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, DriftError>;

impl DriftError {
    pub(crate) fn missing(name: impl Into<String>) -> Self {
        DriftError::MissingSample { name: name.into() }
    }

    pub(crate) fn render(variant: impl Into<String>, reason: impl Into<String>) -> Self {
        DriftError::RenderFailure { variant: variant.into(), reason: reason.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriftError::Io { path: path.into(), source }
    }
}
