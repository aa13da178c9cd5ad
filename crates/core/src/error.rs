use std::{path::PathBuf, time::Duration};

use crate::GenerationPhase;

/// Result alias that carries the custom [`ClickTrackError`] type.
pub type Result<T> = std::result::Result<T, ClickTrackError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ClickTrackError {
    /// A replay file or sound directory does not exist.
    #[error("{what} not found: {}", path.display())]
    SourceNotFound { what: &'static str, path: PathBuf },
    /// Truncated or corrupt binary replay, or unreadable JSON input.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The sound directory holds no usable press sounds.
    #[error("{0}")]
    EmptyLibrary(String),
    /// The external mixing tool failed.
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    /// The final merge of a chunked render failed.
    #[error("merge failed: {0}")]
    MergeFailure(String),
    /// Invalid generator configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Tags an error with the generation phase that produced it.
    #[error("{phase} failed: {source}")]
    Phase {
        phase: GenerationPhase,
        #[source]
        source: Box<ClickTrackError>,
    },
}

impl ClickTrackError {
    pub(crate) fn in_phase(self, phase: GenerationPhase) -> Self {
        match self {
            tagged @ Self::Phase { .. } => tagged,
            other => Self::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Returns the underlying error with any phase tag stripped.
    pub fn root(&self) -> &ClickTrackError {
        match self {
            Self::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Phase the error was raised in, when known.
    pub fn phase(&self) -> Option<GenerationPhase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Errors raised while decoding replays or reading alternate input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormatError {
    #[error("replay truncated: needed {needed} bytes at offset {offset}, buffer holds {len}")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },
    #[error("replay header declares {required} bytes of records but the buffer holds {len}")]
    CountsExceedBuffer { required: u64, len: usize },
    #[error("replay tick rate must be positive, got {0}")]
    InvalidTickRate(f32),
    #[error("replay contains no input events")]
    NoInputEvents,
    #[error("invalid macro document: {0}")]
    Json(String),
}

impl From<serde_json::Error> for FormatError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value.to_string())
    }
}

/// Failure modes of a single external mixer invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("failed to launch mixer `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("lost contact with mixer: {0}")]
    Wait(#[source] std::io::Error),
    #[error("mixer exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
    #[error("mixer did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("mixer produced {produced} bytes of output, limit is {limit}")]
    OutputOverflow { limit: usize, produced: usize },
}
