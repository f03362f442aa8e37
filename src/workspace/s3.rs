//! S3 backend.
//!
//! A workspace maps to a key prefix `<dir>/` inside one bucket; the shadow
//! revisions tree for that workspace lives under `revisions/<dir>/`. Creating
//! a workspace mints an ID only, no object exists until a file is written.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::{Result, WorkspaceError};
use super::file::{FileInfo, RevisionInfo, WorkspaceFile};
use super::mime;
use super::options::{OpenOptions, StatOptions, WriteOptions};
use super::revisions::{self, REVISIONS_DIR};
use super::traits::{WorkspaceClient, WorkspaceFactory};
use super::S3_PROVIDER;

pub(crate) struct S3Factory {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3Factory {
    pub(crate) async fn new(
        bucket: String,
        base_endpoint: Option<String>,
        use_path_style: bool,
    ) -> Result<Self> {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = base_endpoint.filter(|e| !e.is_empty()) {
            builder = builder.endpoint_url(endpoint);
        }
        if use_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            bucket,
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        })
    }

    fn workspace_for(&self, id: &str) -> Result<S3Workspace> {
        let locator = id
            .strip_prefix(&format!("{S3_PROVIDER}://"))
            .unwrap_or(id);
        let (bucket, dir) = locator.split_once('/').unwrap_or((locator, ""));

        if dir == REVISIONS_DIR {
            return Err(WorkspaceError::InvalidWorkspaceId(format!(
                "{id}: cannot create a workspace client for the revisions directory"
            )));
        }

        let revisions = S3Workspace {
            workspace_id: format!("{S3_PROVIDER}://{bucket}/{REVISIONS_DIR}/{dir}"),
            bucket: bucket.to_string(),
            dir: format!("{REVISIONS_DIR}/{dir}"),
            client: self.client.clone(),
            revisions: None,
        };

        Ok(S3Workspace {
            workspace_id: format!("{S3_PROVIDER}://{bucket}/{dir}"),
            bucket: bucket.to_string(),
            dir: dir.to_string(),
            client: self.client.clone(),
            revisions: Some(Arc::new(revisions)),
        })
    }
}

#[async_trait]
impl WorkspaceFactory for S3Factory {
    async fn new_client(&self, id: &str) -> Result<Arc<dyn WorkspaceClient>> {
        Ok(Arc::new(self.workspace_for(id)?))
    }

    async fn create(&self) -> Result<String> {
        // Lazy: no object exists until the first write.
        Ok(format!("{S3_PROVIDER}://{}/{}", self.bucket, Uuid::new_v4()))
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

struct S3Workspace {
    workspace_id: String,
    bucket: String,
    dir: String,
    client: aws_sdk_s3::Client,
    revisions: Option<Arc<S3Workspace>>,
}

impl S3Workspace {
    fn key(&self, file_name: &str) -> String {
        format!("{}/{}", self.dir, file_name)
    }

    fn list_prefix(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            format!("{}/", self.dir)
        } else {
            format!("{}/{}/", self.dir, prefix.trim_end_matches('/'))
        }
    }

    fn revisions_client(&self) -> Result<&S3Workspace> {
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

    /// First bytes of the object for MIME detection; errors are advisory.
    async fn sniff_head(&self, file_name: &str) -> Option<Vec<u8>> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(file_name))
            .range(format!("bytes=0-{}", mime::SNIFF_LEN - 1))
            .send()
            .await
            .ok()?;

        out.body.collect().await.ok().map(|data| data.into_bytes().to_vec())
    }
}

#[async_trait]
impl WorkspaceClient for S3Workspace {
    fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    async fn ls(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = self.list_prefix(prefix);
        let strip = format!("{}/", self.dir);

        let mut files = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let out = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(backend_error)?;

            for object in out.contents() {
                if let Some(key) = object.key() {
                    files.push(key.strip_prefix(&strip).unwrap_or(key).to_string());
                }
            }

            if !out.is_truncated().unwrap_or(false) {
                return Ok(files);
            }
            continuation = out.next_continuation_token().map(str::to_string);
        }
    }

    async fn open_file(&self, file_name: &str, opts: OpenOptions) -> Result<WorkspaceFile> {
        let out = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(file_name))
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) if is_get_not_found(&err) => {
                return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
            }
            Err(err) => return Err(backend_error(err)),
        };

        let data = out
            .body
            .collect()
            .await
            .map_err(|err| WorkspaceError::Backend(err.to_string()))?
            .into_bytes();

        let revision_id = if opts.with_latest_revision_id {
            Some(self.latest_revision_id(file_name).await?)
        } else {
            None
        };

        Ok(WorkspaceFile::from_bytes(data.to_vec()).with_revision_id(revision_id))
    }

    async fn write_file(&self, file_name: &str, data: Bytes, opts: WriteOptions) -> Result<()> {
        if let Some(rev) = &self.revisions {
            if opts.revision_enabled() {
                revisions::record_revision(rev.as_ref(), self, file_name, &opts).await?;
            }
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(file_name))
            .content_length(data.len() as i64)
            .body(ByteStream::from(data.clone()))
            .send()
            .await
            .map_err(backend_error)?;

        debug!(
            "wrote {} bytes to s3://{}/{}",
            data.len(),
            self.bucket,
            self.key(file_name)
        );
        Ok(())
    }

    async fn delete_file(&self, file_name: &str) -> Result<()> {
        // S3 deletes are idempotent; a missing key is a success.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(file_name))
            .send()
            .await
            .map_err(backend_error)?;

        if let Some(rev) = &self.revisions {
            revisions::remove_file_revisions(rev.as_ref(), file_name).await?;
        }

        Ok(())
    }

    async fn stat_file(&self, file_name: &str, opts: StatOptions) -> Result<FileInfo> {
        let out = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.key(file_name))
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) if is_head_not_found(&err) => {
                return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
            }
            Err(err) => return Err(backend_error(err)),
        };

        // The stored Content-Type is only trustworthy if the uploader set it;
        // sniff the first bytes and prefer what they say.
        let server_mime = out
            .content_type()
            .map(mime::strip_params)
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
            size: out.content_length().unwrap_or_default().max(0) as u64,
            mod_time: out
                .last_modified()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                .unwrap_or_default(),
            mime_type,
            revision_id,
        })
    }

    async fn remove_all_with_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = self.list_prefix(prefix);

        let mut continuation: Option<String> = None;
        loop {
            let out = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(backend_error)?;

            let objects = out.contents();
            if objects.is_empty() {
                return Ok(());
            }

            let mut identifiers = Vec::with_capacity(objects.len());
            for object in objects {
                if let Some(key) = object.key() {
                    identifiers.push(
                        ObjectIdentifier::builder()
                            .key(key)
                            .build()
                            .map_err(|err| WorkspaceError::Backend(err.to_string()))?,
                    );
                }
            }

            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(|err| WorkspaceError::Backend(err.to_string()))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(backend_error)?;

            if !out.is_truncated().unwrap_or(false) {
                return Ok(());
            }
            continuation = out.next_continuation_token().map(str::to_string);
        }
    }

    async fn list_revisions(&self, file_name: &str) -> Result<Vec<RevisionInfo>> {
        revisions::list_revisions(self.revisions_client()?, &self.workspace_id, file_name).await
    }

    async fn get_revision(&self, file_name: &str, revision_id: &str) -> Result<WorkspaceFile> {
        revisions::get_revision(self.revisions_client()?, file_name, revision_id).await
    }

    async fn delete_revision(&self, file_name: &str, revision_id: &str) -> Result<()> {
        revisions::delete_revision(self.revisions_client()?, file_name, revision_id).await
    }

    fn revision_client(&self) -> Option<Arc<dyn WorkspaceClient>> {
        self.revisions
            .clone()
            .map(|rev| rev as Arc<dyn WorkspaceClient>)
    }
}

fn backend_error<E, R>(err: SdkError<E, R>) -> WorkspaceError
where
    SdkError<E, R>: std::error::Error + Send + Sync + 'static,
{
    WorkspaceError::Backend(DisplayErrorContext(err).to_string())
}

fn is_get_not_found(
    err: &SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
) -> bool {
    err.as_service_error()
        .is_some_and(|service| service.is_no_such_key())
}

fn is_head_not_found(
    err: &SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>,
) -> bool {
    err.as_service_error()
        .is_some_and(|service| service.is_not_found())
}
