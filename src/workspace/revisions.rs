//! Backend-independent revision engine.
//!
//! For a live file at path `p`, the shadow area holds a counter record at
//! `<p>.json` and one snapshot blob at `<p>.<N>` for every archived revision
//! `N`. All functions here operate through two capability handles: an
//! `r_client` confined to the shadow area and a `w_client` for the live tree.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::{Result, WorkspaceError};
use super::file::{RevisionInfo, WorkspaceFile};
use super::options::{OpenOptions, StatOptions, WriteOptions};
use super::traits::WorkspaceClient;

/// Reserved locator of the shadow area. Factories refuse to construct
/// user-facing clients for it.
pub(crate) const REVISIONS_DIR: &str = "revisions";

/// Per-file counter record. A missing record reads as `current_id == -1`:
/// no prior revisions, and the file may not exist at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct RevisionCounter {
    #[serde(rename = "CurrentID")]
    pub current_id: i64,
}

impl Default for RevisionCounter {
    fn default() -> Self {
        RevisionCounter { current_id: -1 }
    }
}

fn counter_path(file_name: &str) -> String {
    format!("{file_name}.json")
}

fn snapshot_path(file_name: &str, revision_id: &str) -> String {
    format!("{file_name}.{revision_id}")
}

/// Read a file's counter record. Absence is not an error.
pub(crate) async fn get_revision_info(
    r_client: &dyn WorkspaceClient,
    file_name: &str,
) -> Result<RevisionCounter> {
    let file = match r_client
        .open_file(&counter_path(file_name), OpenOptions::default())
        .await
    {
        Ok(file) => file,
        Err(err) if err.is_not_found() => return Ok(RevisionCounter::default()),
        Err(err) => return Err(err),
    };

    let data = file.read_to_bytes().await?;
    serde_json::from_slice(&data).map_err(|err| {
        WorkspaceError::Backend(format!(
            "failed to parse revision counter for {file_name}: {err}"
        ))
    })
}

async fn write_revision_info(
    r_client: &dyn WorkspaceClient,
    file_name: &str,
    info: RevisionCounter,
) -> Result<()> {
    let data = serde_json::to_vec(&info)
        .map_err(|err| WorkspaceError::Backend(format!("failed to marshal revision info: {err}")))?;

    r_client
        .write_file(
            &counter_path(file_name),
            Bytes::from(data),
            WriteOptions::default(),
        )
        .await
        .map_err(|err| WorkspaceError::Backend(format!("failed to write revision info: {err}")))
}

/// The write protocol: runs before a backend overwrites live content.
///
/// Reads the counter, enforces the latest-revision guard, snapshots the
/// current live content under the incremented counter value, then persists
/// the counter. Any failure aborts before the caller touches the live file,
/// so the revisions list always reflects the content just replaced.
pub(crate) async fn record_revision(
    r_client: &dyn WorkspaceClient,
    w_client: &dyn WorkspaceClient,
    file_name: &str,
    opts: &WriteOptions,
) -> Result<()> {
    let mut info = get_revision_info(r_client, file_name).await?;

    if let Some(required) = opts
        .latest_revision_id
        .as_deref()
        .filter(|id| !id.is_empty())
    {
        let required_id: i64 = required.parse().map_err(|err| {
            WorkspaceError::Backend(format!(
                "failed to parse latest revision id {required:?} for write: {err}"
            ))
        })?;

        if required_id != info.current_id {
            return Err(WorkspaceError::Conflict {
                workspace_id: w_client.workspace_id().to_string(),
                path: file_name.to_string(),
                latest_revision_id: required.to_string(),
                current_revision_id: info.current_id.to_string(),
            });
        }
    }

    info.current_id += 1;

    match w_client.open_file(file_name, OpenOptions::default()).await {
        Ok(current) => {
            let data = current.read_to_bytes().await?;
            r_client
                .write_file(
                    &snapshot_path(file_name, &info.current_id.to_string()),
                    Bytes::from(data),
                    WriteOptions::default(),
                )
                .await
                .map_err(|err| {
                    WorkspaceError::Backend(format!("failed to write revision: {err}"))
                })?;
        }
        // First-ever write: no prior content to snapshot.
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }

    write_revision_info(r_client, file_name, info).await
}

/// The current counter value as the revision ID string reported to readers.
pub(crate) async fn latest_revision_id(
    r_client: &dyn WorkspaceClient,
    file_name: &str,
) -> Result<String> {
    let info = get_revision_info(r_client, file_name).await?;
    Ok(info.current_id.to_string())
}

/// List surviving revisions, tolerating gaps left by prior deletions.
pub(crate) async fn list_revisions(
    r_client: &dyn WorkspaceClient,
    workspace_id: &str,
    file_name: &str,
) -> Result<Vec<RevisionInfo>> {
    let info = get_revision_info(r_client, file_name).await?;
    if info.current_id < 1 {
        return Ok(Vec::new());
    }

    let mut revisions = Vec::with_capacity(info.current_id as usize);
    for i in 1..=info.current_id {
        let id = i.to_string();
        let mut stat = match r_client
            .stat_file(&snapshot_path(file_name, &id), StatOptions::default())
            .await
        {
            Ok(stat) => stat,
            Err(err) if err.is_not_found() => continue,
            Err(err) => return Err(err),
        };

        stat.workspace_id = workspace_id.to_string();
        stat.name = file_name.to_string();
        revisions.push(RevisionInfo {
            revision_id: id,
            info: stat,
        });
    }

    Ok(revisions)
}

pub(crate) async fn get_revision(
    r_client: &dyn WorkspaceClient,
    file_name: &str,
    revision_id: &str,
) -> Result<WorkspaceFile> {
    let file = r_client
        .open_file(&snapshot_path(file_name, revision_id), OpenOptions::default())
        .await?;
    Ok(file.with_revision_id(Some(revision_id.to_string())))
}

/// Delete one revision. Deleting the highest-numbered revision decrements the
/// counter by one; deleting any other leaves a gap.
pub(crate) async fn delete_revision(
    r_client: &dyn WorkspaceClient,
    file_name: &str,
    revision_id: &str,
) -> Result<()> {
    r_client
        .delete_file(&snapshot_path(file_name, revision_id))
        .await?;

    let mut info = get_revision_info(r_client, file_name).await?;
    if info.current_id.to_string() != revision_id {
        return Ok(());
    }

    info.current_id -= 1;
    write_revision_info(r_client, file_name, info).await
}

/// Cascade cleanup after the live file was deleted. Snapshot and counter
/// removal is best effort; only a counter read failure propagates.
pub(crate) async fn remove_file_revisions(
    r_client: &dyn WorkspaceClient,
    file_name: &str,
) -> Result<()> {
    let info = get_revision_info(r_client, file_name).await?;

    for i in (1..=info.current_id).rev() {
        let _ = delete_revision(r_client, file_name, &i.to_string()).await;
    }

    let _ = r_client.delete_file(&counter_path(file_name)).await;

    Ok(())
}
