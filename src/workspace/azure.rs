//! Azure Blob Storage backend.
//!
//! Structurally the same flat keyed model as S3: a workspace is a blob-name
//! prefix inside one container, with the shadow revisions tree under
//! `revisions/<dir>/`. Unlike S3, every caller-supplied path is structurally
//! validated before any SDK call, and deletions are single-blob.

use std::sync::Arc;

use async_trait::async_trait;
use azure_storage::{ConnectionString, StorageCredentials};
use azure_storage_blobs::prelude::{BlobServiceClient, ContainerClient};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::debug;
use uuid::Uuid;

use super::error::{Result, WorkspaceError};
use super::file::{FileInfo, RevisionInfo, WorkspaceFile};
use super::mime;
use super::options::{OpenOptions, StatOptions, WriteOptions};
use super::revisions::{self, REVISIONS_DIR};
use super::traits::{WorkspaceClient, WorkspaceFactory};
use super::AZURE_PROVIDER;

const MAX_PATH_LEN: usize = 1024;
const FORBIDDEN_CHARS: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

pub(crate) struct AzureFactory {
    container_name: String,
    service: BlobServiceClient,
}

impl AzureFactory {
    pub(crate) fn new(container_name: String, connection_string: &str) -> Result<Self> {
        let connection = ConnectionString::new(connection_string)
            .map_err(|err| WorkspaceError::Backend(err.to_string()))?;
        let credentials: StorageCredentials = connection
            .storage_credentials()
            .map_err(|err| WorkspaceError::Backend(err.to_string()))?;
        let account = connection.account_name.unwrap_or_default().to_string();

        Ok(Self {
            container_name,
            service: BlobServiceClient::new(account, credentials),
        })
    }

    fn workspace_for(&self, id: &str) -> Result<AzureWorkspace> {
        let locator = id
            .strip_prefix(&format!("{AZURE_PROVIDER}://"))
            .unwrap_or(id);
        let (container, dir) = locator.split_once('/').unwrap_or((locator, ""));

        if dir == REVISIONS_DIR {
            return Err(WorkspaceError::InvalidWorkspaceId(format!(
                "{id}: cannot create a workspace client for the revisions directory"
            )));
        }

        let container_client = self.service.container_client(container);
        let revisions = AzureWorkspace {
            workspace_id: format!("{AZURE_PROVIDER}://{container}/{REVISIONS_DIR}/{dir}"),
            dir: format!("{REVISIONS_DIR}/{dir}"),
            container: container_client.clone(),
            revisions: None,
        };

        Ok(AzureWorkspace {
            workspace_id: format!("{AZURE_PROVIDER}://{container}/{dir}"),
            dir: dir.to_string(),
            container: container_client,
            revisions: Some(Arc::new(revisions)),
        })
    }
}

#[async_trait]
impl WorkspaceFactory for AzureFactory {
    async fn new_client(&self, id: &str) -> Result<Arc<dyn WorkspaceClient>> {
        Ok(Arc::new(self.workspace_for(id)?))
    }

    async fn create(&self) -> Result<String> {
        // Lazy: no blob exists until the first write.
        Ok(format!(
            "{AZURE_PROVIDER}://{}/{}",
            self.container_name,
            Uuid::new_v4()
        ))
    }

    async fn rm(&self, id: &str) -> Result<()> {
        let workspace = self.workspace_for(id)?;

        if let Some(rev) = &workspace.revisions {
            // Best effort for the shadow tree.
            let _ = rev.remove_all_with_prefix("").await;
        }

        workspace.remove_all_with_prefix("").await
    }
}

struct AzureWorkspace {
    workspace_id: String,
    dir: String,
    container: ContainerClient,
    revisions: Option<Arc<AzureWorkspace>>,
}

impl AzureWorkspace {
    fn blob_name(&self, file_name: &str) -> String {
        format!("{}/{}", self.dir, file_name)
    }

    fn list_prefix(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            format!("{}/", self.dir)
        } else {
            format!("{}/{}/", self.dir, prefix.trim_end_matches('/'))
        }
    }

    fn revisions_client(&self) -> Result<&AzureWorkspace> {
        match &self.revisions {
            Some(rev) => Ok(rev.as_ref()),
            None => Err(WorkspaceError::Backend(
                "revision operations are not available inside the revisions area".to_string(),
            )),
        }
    }

    async fn latest_revision_id(&self, file_name: &str) -> Result<String> {
        revisions::latest_revision_id(self.revisions_client()?, file_name).await
    }

    /// First bytes of the blob for MIME detection; errors are advisory.
    async fn sniff_head(&self, file_name: &str) -> Option<Vec<u8>> {
        let mut head = Vec::new();
        let mut stream = self
            .container
            .blob_client(self.blob_name(file_name))
            .get()
            .range(0u64..mime::SNIFF_LEN)
            .into_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.ok()?;
            let data = chunk.data.collect().await.ok()?;
            head.extend_from_slice(&data);
        }

        Some(head)
    }
}

#[async_trait]
impl WorkspaceClient for AzureWorkspace {
    fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    async fn ls(&self, prefix: &str) -> Result<Vec<String>> {
        let trimmed = prefix.trim_end_matches('/');
        validate_path_allow_empty(trimmed)?;

        let list_prefix = self.list_prefix(trimmed);
        let strip = format!("{}/", self.dir);

        let mut files = Vec::new();
        let mut pages = self
            .container
            .list_blobs()
            .prefix(list_prefix)
            .into_stream();

        while let Some(page) = pages.next().await {
            let page = page.map_err(backend_error)?;
            for blob in page.blobs.blobs() {
                files.push(
                    blob.name
                        .strip_prefix(&strip)
                        .unwrap_or(&blob.name)
                        .to_string(),
                );
            }
        }

        Ok(files)
    }

    async fn open_file(&self, file_name: &str, opts: OpenOptions) -> Result<WorkspaceFile> {
        validate_path(file_name)?;

        let data = match self
            .container
            .blob_client(self.blob_name(file_name))
            .get_content()
            .await
        {
            Ok(data) => data,
            Err(err) if is_not_found(&err) => {
                return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
            }
            Err(err) => return Err(backend_error(err)),
        };

        let revision_id = if opts.with_latest_revision_id {
            Some(self.latest_revision_id(file_name).await?)
        } else {
            None
        };

        Ok(WorkspaceFile::from_bytes(data).with_revision_id(revision_id))
    }

    async fn write_file(&self, file_name: &str, data: Bytes, opts: WriteOptions) -> Result<()> {
        validate_path(file_name)?;

        if let Some(rev) = &self.revisions {
            if opts.revision_enabled() {
                revisions::record_revision(rev.as_ref(), self, file_name, &opts).await?;
            }
        }

        let len = data.len();
        self.container
            .blob_client(self.blob_name(file_name))
            .put_block_blob(data)
            .await
            .map_err(backend_error)?;

        debug!("wrote {} bytes to {}", len, self.blob_name(file_name));
        Ok(())
    }

    async fn delete_file(&self, file_name: &str) -> Result<()> {
        validate_path(file_name)?;

        match self
            .container
            .blob_client(self.blob_name(file_name))
            .delete()
            .await
        {
            Ok(_) => debug!("deleted {}", self.blob_name(file_name)),
            Err(err) if is_not_found(&err) => {}
            Err(err) => return Err(backend_error(err)),
        }

        if let Some(rev) = &self.revisions {
            revisions::remove_file_revisions(rev.as_ref(), file_name).await?;
        }

        Ok(())
    }

    async fn stat_file(&self, file_name: &str, opts: StatOptions) -> Result<FileInfo> {
        validate_path(file_name)?;

        let properties = match self
            .container
            .blob_client(self.blob_name(file_name))
            .get_properties()
            .await
        {
            Ok(response) => response.blob.properties,
            Err(err) if is_not_found(&err) => {
                return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
            }
            Err(err) => return Err(backend_error(err)),
        };

        // Stored Content-Type is only as good as the uploader; prefer
        // sniffing the leading bytes.
        let server_mime = Some(mime::strip_params(&properties.content_type))
            .filter(|m| !m.is_empty());
        let head = self.sniff_head(file_name).await.unwrap_or_default();
        let mime_type = mime::detect(&head)
            .or(server_mime)
            .unwrap_or_else(|| mime::detect_or_guess(&head, file_name));

        let revision_id = if opts.with_latest_revision_id {
            Some(self.latest_revision_id(file_name).await?)
        } else {
            None
        };

        Ok(FileInfo {
            workspace_id: self.workspace_id.clone(),
            name: file_name.to_string(),
            size: properties.content_length,
            mod_time: DateTime::<Utc>::from_timestamp(
                properties.last_modified.unix_timestamp(),
                properties.last_modified.nanosecond(),
            )
            .unwrap_or_default(),
            mime_type,
            revision_id,
        })
    }

    async fn remove_all_with_prefix(&self, prefix: &str) -> Result<()> {
        let trimmed = prefix.trim_end_matches('/');
        validate_path_allow_empty(trimmed)?;

        let list_prefix = self.list_prefix(trimmed);
        let mut pages = self
            .container
            .list_blobs()
            .prefix(list_prefix)
            .into_stream();

        while let Some(page) = pages.next().await {
            let page = page.map_err(backend_error)?;
            for blob in page.blobs.blobs() {
                self.container
                    .blob_client(blob.name.clone())
                    .delete()
                    .await
                    .map_err(backend_error)?;
            }
        }

        Ok(())
    }

    async fn list_revisions(&self, file_name: &str) -> Result<Vec<RevisionInfo>> {
        validate_path(file_name)?;
        revisions::list_revisions(self.revisions_client()?, &self.workspace_id, file_name).await
    }

    async fn get_revision(&self, file_name: &str, revision_id: &str) -> Result<WorkspaceFile> {
        validate_path(file_name)?;
        revisions::get_revision(self.revisions_client()?, file_name, revision_id).await
    }

    async fn delete_revision(&self, file_name: &str, revision_id: &str) -> Result<()> {
        validate_path(file_name)?;
        revisions::delete_revision(self.revisions_client()?, file_name, revision_id).await
    }

    fn revision_client(&self) -> Option<Arc<dyn WorkspaceClient>> {
        self.revisions
            .clone()
            .map(|rev| rev as Arc<dyn WorkspaceClient>)
    }
}

/// Structural path validation, run before any SDK call.
fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(WorkspaceError::invalid_path(path, "path cannot be empty"));
    }
    validate_path_allow_empty(path)
}

fn validate_path_allow_empty(path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    if path.len() > MAX_PATH_LEN {
        return Err(WorkspaceError::invalid_path(
            path,
            format!("path exceeds {MAX_PATH_LEN} characters"),
        ));
    }
    if path.starts_with('/') {
        return Err(WorkspaceError::invalid_path(
            path,
            "absolute paths are not allowed",
        ));
    }
    if path.ends_with('/') {
        return Err(WorkspaceError::invalid_path(
            path,
            "trailing slashes are not allowed",
        ));
    }
    if path.contains("//") {
        return Err(WorkspaceError::invalid_path(
            path,
            "consecutive slashes are not allowed",
        ));
    }

    for segment in path.split('/') {
        if segment == ".." {
            return Err(WorkspaceError::invalid_path(
                path,
                "parent directory components are not allowed",
            ));
        }
        if let Some(c) = segment.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            return Err(WorkspaceError::invalid_path(
                path,
                format!("character {c:?} is not allowed"),
            ));
        }
    }

    Ok(())
}

fn is_not_found(err: &azure_core::Error) -> bool {
    err.as_http_error()
        .is_some_and(|http| http.status() == azure_core::StatusCode::NotFound)
}

fn backend_error(err: azure_core::Error) -> WorkspaceError {
    WorkspaceError::Backend(err.to_string())
}
