//! Error taxonomy for the trace engine and its collaborators.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("could not resolve host: {0}")]
    ResolutionFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
