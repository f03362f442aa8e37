use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers;
use super::AppState;

/// Routes 1:1 with the core workspace operations. Workspace IDs and file
/// names travel as percent-encoded path segments.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/create", post(handlers::create))
        .route("/rm/{id}", post(handlers::rm))
        .route("/ls/{id}", get(handlers::ls))
        .route("/ls/{id}/{prefix}", get(handlers::ls_prefix))
        .route("/read-file/{id}/{file}", get(handlers::read_file))
        .route(
            "/read-file-with-revision/{id}/{file}",
            get(handlers::read_file_with_revision),
        )
        .route("/write-file/{id}/{file}", post(handlers::write_file))
        .route("/rm-file/{id}/{file}", delete(handlers::delete_file))
        .route("/stat-file/{id}/{file}", get(handlers::stat_file))
        .route("/rm-with-prefix/{id}", post(handlers::remove_all))
        .route(
            "/rm-with-prefix/{id}/{prefix}",
            post(handlers::remove_all_with_prefix),
        )
        .route("/list-revisions/{id}/{file}", get(handlers::list_revisions))
        .route(
            "/get-revision/{id}/{file}/{revision}",
            get(handlers::get_revision),
        )
        .route(
            "/delete-revision/{id}/{file}/{revision}",
            delete(handlers::delete_revision),
        )
}
