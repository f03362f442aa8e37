use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::workspace::WorkspaceError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Workspace(err) => match err {
                WorkspaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                WorkspaceError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
                WorkspaceError::FileExists { .. } => (StatusCode::CONFLICT, "FILE_EXISTS"),
                WorkspaceError::RevisionNotRequested => {
                    (StatusCode::BAD_REQUEST, "REVISION_NOT_REQUESTED")
                }
                WorkspaceError::InvalidPath { .. } => (StatusCode::BAD_REQUEST, "INVALID_PATH"),
                WorkspaceError::InvalidWorkspaceId(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_WORKSPACE_ID")
                }
                WorkspaceError::InvalidProvider(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_PROVIDER")
                }
                WorkspaceError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
                WorkspaceError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_ERROR"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ApiError::Workspace(WorkspaceError::NotFound {
            workspace_id: "directory:///tmp/ws".to_string(),
            path: "a.txt".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = ApiError::Workspace(WorkspaceError::Conflict {
            workspace_id: "s3://b/ws".to_string(),
            path: "a.txt".to_string(),
            latest_revision_id: "1".to_string(),
            current_revision_id: "2".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
