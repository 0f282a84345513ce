use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Remote failure: {0}")]
    Remote(#[from] RemoteError),

    /// The remote store accepted the change but the local tree could not follow.
    /// Call `SyncEngine::resync` to recover.
    #[error("Workspace out of sync after {operation}: {detail}")]
    Consistency { operation: &'static str, detail: String },

    #[error("ZIP error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workspace closed")]
    Closed,
}

impl WorkspaceError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn consistency(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Consistency {
            operation,
            detail: cause.to_string(),
        }
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }

    /// True when the operation failed without touching local or remote state.
    pub fn is_clean_failure(&self) -> bool {
        !self.is_consistency()
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
