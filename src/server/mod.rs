//! HTTP façade re-exporting the core operations as REST endpoints.

pub mod error;
pub mod handlers;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::workspace::Client;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<Client>,
}

/// Serve the façade on localhost until ctrl-c.
pub async fn run(client: Arc<Client>, port: u16) -> std::io::Result<()> {
    let state = AppState { client };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("workspace provider listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
