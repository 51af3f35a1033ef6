use std::path::PathBuf;

use crate::engine::EngineCode;

/// Result alias that carries the custom [`AmbienceError`] type.
pub type Result<T> = std::result::Result<T, AmbienceError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum AmbienceError {
    /// An engine operation returned a non-success status.
    #[error("engine call `{operation}` failed ({code}): {message}")]
    EngineCall {
        operation: &'static str,
        code: u32,
        message: &'static str,
    },
    /// A playback request referenced a sound outside the registry.
    #[error("sound index {index} is out of range for a registry of {len} sounds")]
    SoundIndexOutOfRange { index: usize, len: usize },
    /// The asset base directory does not exist.
    #[error("asset mount point `{}` does not exist", .0.display())]
    MountPoint(PathBuf),
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A thread panicked while holding the named lock.
    #[error("{0} lock has been poisoned")]
    LockPoisoned(&'static str),
    /// The requested engine backend was not compiled into this build.
    #[error("audio backend `{0}` is not available in this build")]
    BackendUnavailable(String),
}

impl AmbienceError {
    /// Builds the error raised for a failed engine operation. The message is
    /// the engine's own description of the status code.
    pub fn engine(operation: &'static str, code: EngineCode) -> Self {
        Self::EngineCall {
            operation,
            code: code.code(),
            message: code.describe(),
        }
    }

    /// Returns the engine status carried by this error, if any.
    pub fn engine_code(&self) -> Option<u32> {
        match self {
            Self::EngineCall { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Converts an engine status into the crate error, naming the operation that
/// produced it.
pub fn check<T>(operation: &'static str, result: std::result::Result<T, EngineCode>) -> Result<T> {
    result.map_err(|code| AmbienceError::engine(operation, code))
}
