//! Errors raised on the write path of the rotating writer

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while opening, rotating or appending to the live file
#[derive(Debug, Error)]
pub enum RotateError {
    #[error("failed to create log directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to inspect {}: {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("failed to open log file {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to write to {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl RotateError {
    /// Underlying I/O error
    pub fn io_error(&self) -> &io::Error {
        match self {
            RotateError::CreateDir { source, .. }
            | RotateError::Stat { source, .. }
            | RotateError::Open { source, .. }
            | RotateError::Rename { source, .. }
            | RotateError::Write { source, .. } => source,
        }
    }
}

impl From<RotateError> for io::Error {
    fn from(err: RotateError) -> Self {
        io::Error::new(err.io_error().kind(), err)
    }
}
