//! File metadata and readable file handles.

use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use super::error::{Result, WorkspaceError};

/// Metadata about a file in a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// The workspace URI the file belongs to.
    pub workspace_id: String,
    /// Path relative to the workspace root, `/`-separated.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modified time (UTC).
    pub mod_time: DateTime<Utc>,
    /// Detected MIME type, `type/subtype` without parameters.
    pub mime_type: String,
    /// Latest revision ID, present only when requested at stat time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

impl FileInfo {
    /// The latest revision ID recorded at stat time.
    ///
    /// Fails with [`WorkspaceError::RevisionNotRequested`] if the stat was not
    /// performed with `with_latest_revision_id`.
    pub fn latest_revision_id(&self) -> Result<&str> {
        self.revision_id
            .as_deref()
            .ok_or(WorkspaceError::RevisionNotRequested)
    }
}

/// An archived prior version of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Monotone decimal revision identifier, starting at `"1"`.
    pub revision_id: String,
    /// Attributes of the archived snapshot.
    #[serde(flatten)]
    pub info: FileInfo,
}

/// A readable file handle returned by open and get-revision operations.
///
/// The handle owns the underlying stream; dropping it releases the resource.
pub struct WorkspaceFile {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    revision_id: Option<String>,
}

impl WorkspaceFile {
    pub(crate) fn new(reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self {
            reader,
            revision_id: None,
        }
    }

    pub(crate) fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Box::new(Cursor::new(data.into())))
    }

    pub(crate) fn with_revision_id(mut self, revision_id: Option<String>) -> Self {
        self.revision_id = revision_id;
        self
    }

    /// The revision ID attached to this handle.
    ///
    /// For handles opened with `with_latest_revision_id` this is the current
    /// counter value (`"0"` for a never-overwritten file); for revision reads
    /// it is the requested revision. Fails with
    /// [`WorkspaceError::RevisionNotRequested`] otherwise.
    pub fn revision_id(&self) -> Result<&str> {
        self.revision_id
            .as_deref()
            .ok_or(WorkspaceError::RevisionNotRequested)
    }

    /// Read the remaining content into memory.
    pub async fn read_to_bytes(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

impl AsyncRead for WorkspaceFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for WorkspaceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceFile")
            .field("revision_id", &self.revision_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_to_bytes() {
        let file = WorkspaceFile::from_bytes(b"hello".to_vec());
        assert_eq!(file.read_to_bytes().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_revision_id_not_requested() {
        let file = WorkspaceFile::from_bytes(Vec::new());
        assert!(matches!(
            file.revision_id(),
            Err(WorkspaceError::RevisionNotRequested)
        ));
    }

    #[tokio::test]
    async fn test_revision_id_attached() {
        let file = WorkspaceFile::from_bytes(Vec::new()).with_revision_id(Some("2".to_string()));
        assert_eq!(file.revision_id().unwrap(), "2");
    }
}
