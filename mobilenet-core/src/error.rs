use thiserror::Error;

/// Failures reported by a [`ComputeBackend`](crate::backend::ComputeBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown kernel '{0}'")]
    UnknownKernel(String),
    #[error("kernel '{kernel}' takes {expected} arguments, got {found}")]
    ArgumentCount {
        kernel: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("kernel '{kernel}' argument {position}: expected {expected}, got {found}")]
    ArgumentMismatch {
        kernel: &'static str,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("kernel '{kernel}' cannot run over index space {space:?}: {detail}")]
    IndexSpace {
        kernel: &'static str,
        space: [usize; 3],
        detail: String,
    },
    #[error("failed to build kernel '{kernel}': {detail}")]
    Build { kernel: &'static str, detail: String },
    #[error("dispatch of kernel '{kernel}' failed: {detail}")]
    Dispatch { kernel: &'static str, detail: String },
    #[error("reading back results of kernel '{kernel}' failed: {detail}")]
    Readback { kernel: &'static str, detail: String },
}

/// Errors surfaced by the inference engine. None of them are recovered locally.
#[derive(Debug, Error)]
pub enum Error {
    /// A layer was configured with a kernel/stride/padding combination that has no algorithm.
    #[error("{layer}: unsupported configuration ({detail})")]
    UnsupportedConfiguration { layer: &'static str, detail: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("malformed input: {0}")]
    InputFormat(String),
    /// Tensor length or shape disagreement; always an internal bug.
    #[error("tensor invariant violated: {0}")]
    InvariantViolation(String),
    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn unsupported(layer: &'static str, detail: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration {
            layer,
            detail: detail.into(),
        }
    }
}
