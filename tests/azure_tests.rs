//! Azure Blob Storage integration tests.
//!
//! These run only when a container and connection string are provided
//! (a real account or Azurite):
//!
//! ```sh
//! export WORKSPACE_PROVIDER_AZURE_CONTAINER=...
//! export WORKSPACE_PROVIDER_AZURE_CONNECTION_STRING=...
//! ```

use bytes::Bytes;
use workspace_provider::{Client, ClientOptions, WorkspaceError};

fn azure_options() -> Option<ClientOptions> {
    let container = std::env::var("WORKSPACE_PROVIDER_AZURE_CONTAINER").ok()?;
    let connection_string = std::env::var("WORKSPACE_PROVIDER_AZURE_CONNECTION_STRING").ok()?;
    Some(ClientOptions {
        azure_container_name: Some(container),
        azure_connection_string: Some(connection_string),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_azure_round_trip() {
    let Some(opts) = azure_options() else { return };
    let client = Client::new(&[opts]).await.unwrap();

    let id = client.create("azure", &[]).await.unwrap();
    assert!(id.starts_with("azure://"));

    client
        .write_file(&id, "test.txt", Bytes::from_static(b"test"), &[])
        .await
        .unwrap();

    let file = client.open_file(&id, "test.txt", &[]).await.unwrap();
    assert_eq!(file.read_to_bytes().await.unwrap(), b"test");

    let info = client.stat_file(&id, "test.txt", &[]).await.unwrap();
    assert_eq!(info.size, 4);

    client.rm(&id).await.unwrap();
    assert!(client.ls(&id, "").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_azure_revisions() {
    let Some(opts) = azure_options() else { return };
    let client = Client::new(&[opts]).await.unwrap();

    let id = client.create("azure", &[]).await.unwrap();

    for content in ["a", "b"] {
        client
            .write_file(&id, "f.txt", Bytes::from(content.to_string()), &[])
            .await
            .unwrap();
    }

    let revisions = client.list_revisions(&id, "f.txt").await.unwrap();
    assert_eq!(revisions.len(), 1);

    let rev1 = client.get_revision(&id, "f.txt", "1").await.unwrap();
    assert_eq!(rev1.read_to_bytes().await.unwrap(), b"a");

    client.rm(&id).await.unwrap();
}

#[tokio::test]
async fn test_azure_path_validation_runs_before_sdk_calls() {
    // Validation is structural and needs no round trip to the service.
    let Some(opts) = azure_options() else { return };
    let client = Client::new(&[opts]).await.unwrap();

    let id = client.create("azure", &[]).await.unwrap();

    for path in [
        "../escape.txt",
        "/abs.txt",
        "dir//double.txt",
        "trailing/",
        "bad:colon.txt",
        "bad*star.txt",
    ] {
        let err = client
            .write_file(&id, path, Bytes::from_static(b"x"), &[])
            .await
            .unwrap_err();
        assert!(
            matches!(err, WorkspaceError::InvalidPath { .. }),
            "expected invalid path for {path:?}, got {err}"
        );
    }
}
