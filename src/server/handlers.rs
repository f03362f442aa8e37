use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::workspace::{FileInfo, OpenOptions, RevisionInfo, StatOptions, WriteOptions};

use super::error::ApiError;
use super::AppState;

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, rename = "fromWorkspaceIDs")]
    pub from_workspace_ids: Vec<String>,
    /// Comma-delimited alternative for callers that cannot send arrays;
    /// merged into `fromWorkspaceIDs`.
    #[serde(default)]
    pub workspace_ids: Option<String>,
}

/// POST /create
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<String, ApiError> {
    let mut from = req.from_workspace_ids;
    if let Some(ids) = req.workspace_ids.filter(|ids| !ids.is_empty()) {
        from.extend(ids.split(',').map(str::to_string));
    }

    let id = state
        .client
        .create(req.provider.as_deref().unwrap_or_default(), &from)
        .await?;
    Ok(id)
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

fn success(message: String) -> Json<SuccessResponse> {
    Json(SuccessResponse {
        success: true,
        message,
    })
}

/// POST /rm/{id}
pub async fn rm(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.client.rm(&id).await?;
    Ok(success(format!("workspace {id} deleted")))
}

/// GET /ls/{id} and /ls/{id}/{prefix}
pub async fn ls(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let files = state.client.ls(&id, "").await?;
    Ok(Json(files))
}

pub async fn ls_prefix(
    State(state): State<AppState>,
    Path((id, prefix)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, ApiError> {
    let files = state.client.ls(&id, &prefix).await?;
    Ok(Json(files))
}

#[derive(Debug, Deserialize)]
pub struct ReadFileQuery {
    #[serde(default, rename = "withLatestRevision")]
    pub with_latest_revision: bool,
}

/// GET /read-file/{id}/{file}; body is base64-encoded content.
pub async fn read_file(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
    Query(query): Query<ReadFileQuery>,
) -> Result<String, ApiError> {
    let file = state
        .client
        .open_file(
            &id,
            &file_name,
            &[OpenOptions {
                with_latest_revision_id: query.with_latest_revision,
            }],
        )
        .await?;

    let data = file.read_to_bytes().await?;
    Ok(BASE64.encode(data))
}

#[derive(Debug, Serialize)]
pub struct ReadFileWithRevisionResponse {
    #[serde(rename = "revisionID")]
    pub revision_id: String,
    /// Base64-encoded file content.
    pub content: String,
}

/// GET /read-file-with-revision/{id}/{file}
pub async fn read_file_with_revision(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
) -> Result<Json<ReadFileWithRevisionResponse>, ApiError> {
    let file = state
        .client
        .open_file(
            &id,
            &file_name,
            &[OpenOptions {
                with_latest_revision_id: true,
            }],
        )
        .await?;

    let revision_id = file.revision_id()?.to_string();
    let data = file.read_to_bytes().await?;

    Ok(Json(ReadFileWithRevisionResponse {
        revision_id,
        content: BASE64.encode(data),
    }))
}

#[derive(Debug, Deserialize)]
pub struct WriteFileQuery {
    #[serde(default, rename = "createRevision")]
    pub create_revision: Option<bool>,
    #[serde(default, rename = "latestRevisionID")]
    pub latest_revision_id: Option<String>,
    #[serde(default, rename = "ifNotExists")]
    pub if_not_exists: bool,
}

/// POST /write-file/{id}/{file}; body is base64-encoded content.
pub async fn write_file(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
    Query(query): Query<WriteFileQuery>,
    body: String,
) -> Result<Json<SuccessResponse>, ApiError> {
    let data = BASE64
        .decode(body.trim())
        .map_err(|err| ApiError::BadRequest(format!("invalid base64 body: {err}")))?;

    state
        .client
        .write_file(
            &id,
            &file_name,
            Bytes::from(data),
            &[WriteOptions {
                create_revision: query.create_revision,
                latest_revision_id: query.latest_revision_id,
                if_not_exists: query.if_not_exists,
            }],
        )
        .await?;

    Ok(success(format!(
        "file {file_name} has been written to workspace {id}"
    )))
}

/// DELETE /rm-file/{id}/{file}
pub async fn delete_file(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.client.delete_file(&id, &file_name).await?;
    Ok(success(format!(
        "file {file_name} deleted from workspace {id}"
    )))
}

#[derive(Debug, Deserialize)]
pub struct StatFileQuery {
    #[serde(default, rename = "withLatestRevision")]
    pub with_latest_revision: bool,
}

/// GET /stat-file/{id}/{file}
pub async fn stat_file(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
    Query(query): Query<StatFileQuery>,
) -> Result<Json<FileInfo>, ApiError> {
    let info = state
        .client
        .stat_file(
            &id,
            &file_name,
            &[StatOptions {
                with_latest_revision_id: query.with_latest_revision,
            }],
        )
        .await?;
    Ok(Json(info))
}

/// POST /rm-with-prefix/{id} and /rm-with-prefix/{id}/{prefix}
pub async fn remove_all(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.client.remove_all_with_prefix(&id, "").await?;
    Ok(success(format!("all files deleted from workspace {id}")))
}

pub async fn remove_all_with_prefix(
    State(state): State<AppState>,
    Path((id, prefix)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.client.remove_all_with_prefix(&id, &prefix).await?;
    Ok(success(format!(
        "files with prefix {prefix} deleted from workspace {id}"
    )))
}

/// GET /list-revisions/{id}/{file}
pub async fn list_revisions(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
) -> Result<Json<Vec<RevisionInfo>>, ApiError> {
    let revisions = state.client.list_revisions(&id, &file_name).await?;
    Ok(Json(revisions))
}

/// GET /get-revision/{id}/{file}/{revisionID}; body is base64-encoded.
pub async fn get_revision(
    State(state): State<AppState>,
    Path((id, file_name, revision_id)): Path<(String, String, String)>,
) -> Result<String, ApiError> {
    let file = state
        .client
        .get_revision(&id, &file_name, &revision_id)
        .await?;
    let data = file.read_to_bytes().await?;
    Ok(BASE64.encode(data))
}

/// DELETE /delete-revision/{id}/{file}/{revisionID}
pub async fn delete_revision(
    State(state): State<AppState>,
    Path((id, file_name, revision_id)): Path<(String, String, String)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .client
        .delete_revision(&id, &file_name, &revision_id)
        .await?;
    Ok(success(format!(
        "revision {revision_id} of {file_name} deleted from workspace {id}"
    )))
}
