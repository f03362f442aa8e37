//! Backend capability traits.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::Result;
use super::file::{FileInfo, RevisionInfo, WorkspaceFile};
use super::options::{OpenOptions, StatOptions, WriteOptions};

/// The capability set every storage backend implements for one workspace.
///
/// A revision sub-client is the same capability set, specialized by
/// construction to operate in the workspace's shadow revisions area.
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// The workspace URI this client operates on.
    fn workspace_id(&self) -> &str;

    /// List all files whose relative path begins with `prefix`, recursively.
    ///
    /// A missing prefix yields an empty list, not an error.
    async fn ls(&self, prefix: &str) -> Result<Vec<String>>;

    /// Open a file for reading.
    async fn open_file(&self, file_name: &str, opts: OpenOptions) -> Result<WorkspaceFile>;

    /// Create or overwrite a file.
    async fn write_file(&self, file_name: &str, data: Bytes, opts: WriteOptions) -> Result<()>;

    /// Delete a file and, best effort, its revisions. Deleting a missing
    /// file succeeds.
    async fn delete_file(&self, file_name: &str) -> Result<()>;

    /// Stat a file, detecting its MIME type from content.
    async fn stat_file(&self, file_name: &str, opts: StatOptions) -> Result<FileInfo>;

    /// Remove every file under `prefix`. A missing prefix succeeds.
    async fn remove_all_with_prefix(&self, prefix: &str) -> Result<()>;

    /// List the archived revisions of a file, oldest first.
    async fn list_revisions(&self, file_name: &str) -> Result<Vec<RevisionInfo>>;

    /// Open an archived revision for reading.
    async fn get_revision(&self, file_name: &str, revision_id: &str) -> Result<WorkspaceFile>;

    /// Delete one archived revision. Idempotent.
    async fn delete_revision(&self, file_name: &str, revision_id: &str) -> Result<()>;

    /// The sub-client operating directly inside this workspace's shadow
    /// revisions area. `None` for the sub-client itself.
    fn revision_client(&self) -> Option<Arc<dyn WorkspaceClient>>;
}

/// Mints workspace IDs and clients for one provider.
#[async_trait]
pub trait WorkspaceFactory: Send + Sync {
    /// Construct a client for an existing workspace URI.
    async fn new_client(&self, id: &str) -> Result<Arc<dyn WorkspaceClient>>;

    /// Create a new empty workspace and return its URI.
    async fn create(&self) -> Result<String>;

    /// Remove a workspace: its live tree definitively, its shadow revisions
    /// tree best effort.
    async fn rm(&self, id: &str) -> Result<()>;
}
