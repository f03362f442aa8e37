//! Workspace error types.

use thiserror::Error;

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Errors that can occur during workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// File or revision not found where the operation requires it.
    #[error("not found: {path} in workspace {workspace_id}")]
    NotFound { workspace_id: String, path: String },

    /// The latest-revision guard failed during a write.
    #[error(
        "conflict writing {path} in workspace {workspace_id}: expected latest revision {latest_revision_id}, but current revision is {current_revision_id}"
    )]
    Conflict {
        workspace_id: String,
        path: String,
        latest_revision_id: String,
        current_revision_id: String,
    },

    /// A write with the if-not-exists guard found the file already present.
    #[error("file already exists: {path} in workspace {workspace_id}")]
    FileExists { workspace_id: String, path: String },

    /// The caller asked for a revision ID on a handle opened without the flag.
    #[error("revision ID was not requested when the file was opened")]
    RevisionNotRequested,

    /// The path failed confinement or naming validation.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The workspace URI could not be parsed.
    #[error("invalid workspace id: {0}")]
    InvalidWorkspaceId(String),

    /// The URI named a provider that is not registered.
    #[error("invalid workspace provider: {0}")]
    InvalidProvider(String),

    /// IO error from the local filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport, authentication, or storage-service error.
    #[error("backend error: {0}")]
    Backend(String),
}

impl WorkspaceError {
    pub(crate) fn not_found(workspace_id: impl Into<String>, path: impl Into<String>) -> Self {
        WorkspaceError::NotFound {
            workspace_id: workspace_id.into(),
            path: path.into(),
        }
    }

    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkspaceError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error represents a missing file or revision.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkspaceError::NotFound { .. })
    }

    /// Whether this error represents a failed latest-revision guard.
    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkspaceError::Conflict { .. })
    }
}
