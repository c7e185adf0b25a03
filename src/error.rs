// Errors surfaced by the conversion core

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::StreamKind;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("output path {} would overwrite the input", path.display())]
    OutputIsInput { path: PathBuf },

    #[error("no compatible {kind} codec for format '{format}'")]
    NoCompatibleCodec { format: String, kind: StreamKind },

    #[error("conversion failed after {attempts} attempt(s):\n{diagnostic}")]
    AllAttemptsExhausted { attempts: usize, diagnostic: String },

    #[error("conversion cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn no_codec(format: impl Into<String>, kind: StreamKind) -> Self {
        Self::NoCompatibleCodec {
            format: format.into(),
            kind,
        }
    }

    /// Cancellation is a user decision, not a failure to report.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
