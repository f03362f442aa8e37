//! Workspace abstraction layer.
//!
//! Provides a backend-independent client over three storage backends:
//! - Local directory (always registered)
//! - S3-compatible object storage
//! - Azure Blob Storage
//!
//! The [`Client`] resolves opaque workspace URIs (`provider://locator`) to the
//! right backend and routes file and revision operations to it. All mutable
//! state lives in the backing store; the client itself only holds the
//! factory registry built at construction.

mod azure;
mod directory;
mod error;
mod file;
mod mime;
mod options;
mod revisions;
mod s3;
mod traits;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

pub use error::{Result, WorkspaceError};
pub use file::{FileInfo, RevisionInfo, WorkspaceFile};
pub use options::{ClientOptions, OpenOptions, StatOptions, WriteOptions};
pub use traits::{WorkspaceClient, WorkspaceFactory};

use azure::AzureFactory;
use directory::DirectoryFactory;
use s3::S3Factory;

pub const DIRECTORY_PROVIDER: &str = "directory";
pub const S3_PROVIDER: &str = "s3";
pub const AZURE_PROVIDER: &str = "azure";

/// Multi-backend workspace client.
pub struct Client {
    factories: HashMap<String, Arc<dyn WorkspaceFactory>>,
}

impl Client {
    /// Build a client from zero or more option records (merged right-biased,
    /// see [`ClientOptions`]). The directory backend is always registered;
    /// S3 requires a bucket name and Azure a connection string.
    pub async fn new(opts: &[ClientOptions]) -> Result<Self> {
        let opt = ClientOptions::merged(opts);

        let data_home = opt.directory_data_home.unwrap_or_else(default_data_home);

        let mut factories: HashMap<String, Arc<dyn WorkspaceFactory>> = HashMap::new();
        factories.insert(
            DIRECTORY_PROVIDER.to_string(),
            Arc::new(DirectoryFactory::new(data_home)),
        );

        if let Some(bucket) = opt.s3_bucket_name.filter(|b| !b.is_empty()) {
            factories.insert(
                S3_PROVIDER.to_string(),
                Arc::new(
                    S3Factory::new(bucket, opt.s3_base_endpoint, opt.s3_use_path_style).await?,
                ),
            );
        }

        if let Some(connection_string) = opt.azure_connection_string.filter(|c| !c.is_empty()) {
            factories.insert(
                AZURE_PROVIDER.to_string(),
                Arc::new(AzureFactory::new(
                    opt.azure_container_name.unwrap_or_default(),
                    &connection_string,
                )?),
            );
        }

        Ok(Self { factories })
    }

    /// The initialized provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = self.factories.keys().cloned().collect();
        providers.sort();
        providers
    }

    /// Create a new empty workspace in `provider` (default: directory),
    /// then copy the live files and revision history of every `from`
    /// workspace into it. Sources may live in different providers.
    pub async fn create(&self, provider: &str, from_workspaces: &[String]) -> Result<String> {
        let provider = if provider.is_empty() {
            DIRECTORY_PROVIDER
        } else {
            provider
        };

        let factory = self.factory(provider)?;
        let id = factory.create().await?;
        let dest = factory.new_client(&id).await?;

        for from in from_workspaces {
            let source = self.client_for(from).await?;
            copy_workspace(source.as_ref(), dest.as_ref()).await?;

            if let (Some(source_rev), Some(dest_rev)) =
                (source.revision_client(), dest.revision_client())
            {
                copy_workspace(source_rev.as_ref(), dest_rev.as_ref()).await?;
            }
        }

        debug!("created workspace {id}");
        Ok(id)
    }

    /// Remove a workspace: its live tree and, best effort, its shadow
    /// revisions tree.
    pub async fn rm(&self, id: &str) -> Result<()> {
        let (provider, _) = split_id(id)?;
        self.factory(provider)?.rm(id).await
    }

    /// List all files in the workspace whose relative path begins with
    /// `prefix`, recursively.
    pub async fn ls(&self, id: &str, prefix: &str) -> Result<Vec<String>> {
        self.client_for(id).await?.ls(prefix).await
    }

    /// Open a file for reading.
    pub async fn open_file(
        &self,
        id: &str,
        file_name: &str,
        opts: &[OpenOptions],
    ) -> Result<WorkspaceFile> {
        let opt = OpenOptions::merged(opts);
        self.client_for(id).await?.open_file(file_name, opt).await
    }

    /// Create or overwrite a file.
    ///
    /// With `if_not_exists`, the latest-revision guard is forced to the
    /// `"-1"` sentinel and a conflict is reported as
    /// [`WorkspaceError::FileExists`].
    pub async fn write_file(
        &self,
        id: &str,
        file_name: &str,
        data: Bytes,
        opts: &[WriteOptions],
    ) -> Result<()> {
        let mut opt = WriteOptions::merged(opts);
        if opt.if_not_exists {
            opt.latest_revision_id = Some("-1".to_string());
        }
        let if_not_exists = opt.if_not_exists;

        let client = self.client_for(id).await?;
        match client.write_file(file_name, data, opt).await {
            Err(WorkspaceError::Conflict {
                workspace_id, path, ..
            }) if if_not_exists => Err(WorkspaceError::FileExists { workspace_id, path }),
            other => other,
        }
    }

    /// Delete a file and its revisions. Deleting a missing file succeeds.
    pub async fn delete_file(&self, id: &str, file_name: &str) -> Result<()> {
        self.client_for(id).await?.delete_file(file_name).await
    }

    /// Stat a file.
    pub async fn stat_file(
        &self,
        id: &str,
        file_name: &str,
        opts: &[StatOptions],
    ) -> Result<FileInfo> {
        let opt = StatOptions::merged(opts);
        self.client_for(id).await?.stat_file(file_name, opt).await
    }

    /// Remove every file under `prefix`. A missing prefix succeeds.
    pub async fn remove_all_with_prefix(&self, id: &str, prefix: &str) -> Result<()> {
        self.client_for(id).await?.remove_all_with_prefix(prefix).await
    }

    /// List the archived revisions of a file, oldest first.
    pub async fn list_revisions(&self, id: &str, file_name: &str) -> Result<Vec<RevisionInfo>> {
        self.client_for(id).await?.list_revisions(file_name).await
    }

    /// Open an archived revision for reading.
    pub async fn get_revision(
        &self,
        id: &str,
        file_name: &str,
        revision_id: &str,
    ) -> Result<WorkspaceFile> {
        self.client_for(id)
            .await?
            .get_revision(file_name, revision_id)
            .await
    }

    /// Delete one archived revision. Idempotent.
    pub async fn delete_revision(&self, id: &str, file_name: &str, revision_id: &str) -> Result<()> {
        self.client_for(id)
            .await?
            .delete_revision(file_name, revision_id)
            .await
    }

    fn factory(&self, provider: &str) -> Result<&Arc<dyn WorkspaceFactory>> {
        self.factories
            .get(provider)
            .ok_or_else(|| WorkspaceError::InvalidProvider(provider.to_string()))
    }

    async fn client_for(&self, id: &str) -> Result<Arc<dyn WorkspaceClient>> {
        let (provider, _) = split_id(id)?;
        self.factory(provider)?.new_client(id).await
    }
}

fn split_id(id: &str) -> Result<(&str, &str)> {
    id.split_once("://")
        .ok_or_else(|| WorkspaceError::InvalidWorkspaceId(id.to_string()))
}

fn default_data_home() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("workspace-provider")
}

/// Stream every file of `source` into `dest`.
async fn copy_workspace(source: &dyn WorkspaceClient, dest: &dyn WorkspaceClient) -> Result<()> {
    for entry in source.ls("").await? {
        if entry.is_empty() {
            continue;
        }

        let file = source.open_file(&entry, OpenOptions::default()).await?;
        let data = file.read_to_bytes().await?;
        dest.write_file(&entry, Bytes::from(data), WriteOptions::default())
            .await?;
    }

    Ok(())
}
