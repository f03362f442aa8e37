//! Local filesystem backend.
//!
//! Workspaces live under a data home directory, one subdirectory per
//! workspace. Every path-taking operation resolves the caller-supplied
//! relative path through a confinement check that rejects traversal outside
//! the workspace root via `..`, absolute paths, or symlinks.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{Result, WorkspaceError};
use super::file::{FileInfo, RevisionInfo, WorkspaceFile};
use super::mime;
use super::options::{OpenOptions, StatOptions, WriteOptions};
use super::revisions::{self, REVISIONS_DIR};
use super::traits::{WorkspaceClient, WorkspaceFactory};
use super::DIRECTORY_PROVIDER;

pub(crate) struct DirectoryFactory {
    data_home: PathBuf,
}

impl DirectoryFactory {
    pub(crate) fn new(data_home: PathBuf) -> Self {
        Self { data_home }
    }

    fn root_for(&self, id: &str) -> Result<PathBuf> {
        let locator = id
            .strip_prefix(&format!("{DIRECTORY_PROVIDER}://"))
            .unwrap_or(id);

        if Path::new(locator).is_absolute() {
            Ok(PathBuf::from(locator))
        } else {
            safe_join(&self.data_home, locator)
        }
    }
}

#[async_trait]
impl WorkspaceFactory for DirectoryFactory {
    async fn new_client(&self, id: &str) -> Result<Arc<dyn WorkspaceClient>> {
        let root = self.root_for(id)?;

        if root.file_name().is_some_and(|name| name == REVISIONS_DIR) {
            return Err(WorkspaceError::InvalidWorkspaceId(format!(
                "{id}: cannot create a workspace client for the revisions directory"
            )));
        }

        // The shadow tree mirrors the workspace's location under the data
        // home; for roots outside it, fall back to the last path component.
        let relative = root
            .strip_prefix(&self.data_home)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(root.file_name().unwrap_or_default()));
        let shadow_root = self.data_home.join(REVISIONS_DIR).join(&relative);

        let revisions = DirectoryWorkspace {
            workspace_id: format!("{DIRECTORY_PROVIDER}://{}", shadow_root.display()),
            root: shadow_root,
            revisions: None,
        };

        Ok(Arc::new(DirectoryWorkspace {
            workspace_id: format!("{DIRECTORY_PROVIDER}://{}", root.display()),
            root,
            revisions: Some(Arc::new(revisions)),
        }))
    }

    async fn create(&self) -> Result<String> {
        let root = self.data_home.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&root).await?;
        debug!("created workspace directory {}", root.display());
        Ok(format!("{DIRECTORY_PROVIDER}://{}", root.display()))
    }

    async fn rm(&self, id: &str) -> Result<()> {
        let Ok(root) = self.root_for(id) else {
            return Ok(());
        };
        if !root.exists() {
            return Ok(());
        }

        if let Ok(relative) = root.strip_prefix(&self.data_home) {
            // Best effort: the live tree is what must go.
            let shadow_root = self.data_home.join(REVISIONS_DIR).join(relative);
            let _ = fs::remove_dir_all(&shadow_root).await;
        }

        match fs::remove_dir_all(&root).await {
            Ok(()) => {
                debug!("removed workspace directory {}", root.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

struct DirectoryWorkspace {
    workspace_id: String,
    root: PathBuf,
    revisions: Option<Arc<DirectoryWorkspace>>,
}

impl DirectoryWorkspace {
    fn safe_path(&self, relative: &str) -> Result<PathBuf> {
        safe_join(&self.root, relative)
    }

    fn revisions_client(&self) -> Result<&DirectoryWorkspace> {
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
}

#[async_trait]
impl WorkspaceClient for DirectoryWorkspace {
    fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    async fn ls(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.safe_path(prefix.trim_end_matches('/'))?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        walk(&self.root, &dir, &mut files).await?;
        Ok(files)
    }

    async fn open_file(&self, file_name: &str, opts: OpenOptions) -> Result<WorkspaceFile> {
        let path = self.safe_path(file_name)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
            }
            Err(err) => return Err(err.into()),
        };
        if file.metadata().await?.is_dir() {
            return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
        }

        let revision_id = if opts.with_latest_revision_id {
            Some(self.latest_revision_id(file_name).await?)
        } else {
            None
        };

        Ok(WorkspaceFile::new(Box::new(file)).with_revision_id(revision_id))
    }

    async fn write_file(&self, file_name: &str, data: Bytes, opts: WriteOptions) -> Result<()> {
        let path = self.safe_path(file_name)?;

        if let Some(rev) = &self.revisions {
            if opts.revision_enabled() {
                revisions::record_revision(rev.as_ref(), self, file_name, &opts).await?;
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;
        debug!("wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    async fn delete_file(&self, file_name: &str) -> Result<()> {
        let path = self.safe_path(file_name)?;

        match fs::remove_file(&path).await {
            Ok(()) => debug!("deleted {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        if let Some(rev) = &self.revisions {
            revisions::remove_file_revisions(rev.as_ref(), file_name).await?;
        }

        Ok(())
    }

    async fn stat_file(&self, file_name: &str, opts: StatOptions) -> Result<FileInfo> {
        let path = self.safe_path(file_name)?;

        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
            }
            Err(err) => return Err(err.into()),
        };
        if meta.is_dir() {
            return Err(WorkspaceError::not_found(&self.workspace_id, file_name));
        }

        let mut head = Vec::new();
        let file = fs::File::open(&path).await?;
        file.take(mime::SNIFF_LEN).read_to_end(&mut head).await?;

        let revision_id = if opts.with_latest_revision_id {
            Some(self.latest_revision_id(file_name).await?)
        } else {
            None
        };

        Ok(FileInfo {
            workspace_id: self.workspace_id.clone(),
            name: file_name.to_string(),
            size: meta.len(),
            mod_time: meta
                .modified()
                .ok()
                .and_then(system_time_to_chrono)
                .unwrap_or_default(),
            mime_type: mime::detect_or_guess(&head, file_name),
            revision_id,
        })
    }

    async fn remove_all_with_prefix(&self, prefix: &str) -> Result<()> {
        let path = self.safe_path(prefix.trim_end_matches('/'))?;

        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        if meta.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        debug!("removed {}", path.display());
        Ok(())
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

/// Resolve `relative` beneath `root`, rejecting any traversal outside it.
///
/// The path is built component-by-component so the check does not depend on
/// filesystem state, then re-verified against symlink escapes by
/// canonicalizing whatever part of it already exists.
fn safe_join(root: &Path, relative: &str) -> Result<PathBuf> {
    if relative.is_empty() || relative == "." {
        return Ok(root.to_path_buf());
    }

    let mut result = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => {
                if name.to_string_lossy().contains('\0') {
                    return Err(WorkspaceError::invalid_path(
                        relative,
                        "path contains a null byte",
                    ));
                }
                result.push(name);
            }
            Component::ParentDir => {
                warn!("rejected parent directory component in path {relative:?}");
                return Err(WorkspaceError::invalid_path(
                    relative,
                    "parent directory components are not allowed",
                ));
            }
            Component::CurDir => continue,
            Component::RootDir | Component::Prefix(_) => {
                warn!("rejected absolute path {relative:?}");
                return Err(WorkspaceError::invalid_path(
                    relative,
                    "absolute paths are not allowed",
                ));
            }
        }
    }

    confine(root, &result, relative)?;
    Ok(result)
}

/// Symlink re-verification: the canonical form of the deepest ancestor of
/// the built path that already exists must still start with the canonical
/// root. Components below it are not materialized yet, so once that anchor
/// is confined, later directory creation cannot be redirected outside the
/// root. Checked with `symlink_metadata` so a dangling link counts as
/// existing and is rejected rather than silently skipped.
fn confine(root: &Path, built: &Path, relative: &str) -> Result<()> {
    let Ok(canonical_root) = root.canonicalize() else {
        // Root does not exist yet; there is nothing to escape through.
        return Ok(());
    };

    for ancestor in built.ancestors() {
        if ancestor == root {
            break;
        }
        if std::fs::symlink_metadata(ancestor).is_err() {
            continue;
        }

        let target = ancestor.canonicalize().map_err(|_| {
            warn!("path {relative:?} resolves through an unresolvable link");
            WorkspaceError::invalid_path(relative, "path cannot be safely resolved")
        })?;
        if !target.starts_with(&canonical_root) {
            warn!(
                "path {relative:?} resolved to {} outside the workspace root",
                target.display()
            );
            return Err(WorkspaceError::invalid_path(
                relative,
                "path escapes the workspace root",
            ));
        }
        break;
    }

    Ok(())
}

/// Recursively collect files under `dir` as `/`-separated paths relative to
/// the workspace root.
async fn walk(root: &Path, dir: &Path, files: &mut Vec<String>) -> Result<()> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            Box::pin(walk(root, &path, files)).await?;
        } else {
            files.push(relative_key(root, &path));
        }
    }

    Ok(())
}

/// Relative path from `root`, always `/`-separated.
fn relative_key(root: &Path, full_path: &Path) -> String {
    let Ok(relative) = full_path.strip_prefix(root) else {
        return String::new();
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().to_string());
        }
    }
    parts.join("/")
}

fn system_time_to_chrono(time: std::time::SystemTime) -> Option<DateTime<Utc>> {
    time.duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|d| DateTime::from_timestamp(d.as_secs() as i64, d.subsec_nanos()))
}
