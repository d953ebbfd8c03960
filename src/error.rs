use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a lookalike run. The display strings are shown
/// to the user as-is.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Invalid user encoding.")]
    InvalidQuery,
    #[error("No valid presidents.")]
    NoValidCandidates,
    #[error("No distances found.")]
    NoDistances,
    #[error("Can't access the webcam.")]
    SourceUnavailable(#[source] anyhow::Error),
    #[error("No face found.")]
    NoFaceFound,
    #[error("Invalid Path.")]
    InvalidPath(PathBuf),
    #[error("face recognition failed")]
    Backend(#[source] anyhow::Error),
}

pub type Result<T, E = MatchError> = std::result::Result<T, E>;
