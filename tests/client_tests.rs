//! Dispatcher-level behavior: URI routing, provider registry, option merging.

use bytes::Bytes;
use tempfile::TempDir;
use workspace_provider::{Client, ClientOptions, WorkspaceError, WriteOptions};

async fn test_client() -> (Client, TempDir) {
    let dir = TempDir::new().unwrap();
    let client = Client::new(&[ClientOptions {
        directory_data_home: Some(dir.path().to_path_buf()),
        ..Default::default()
    }])
    .await
    .unwrap();
    (client, dir)
}

#[tokio::test]
async fn test_directory_provider_always_registered() {
    let (client, _dir) = test_client().await;
    assert_eq!(client.providers(), ["directory"]);
}

#[tokio::test]
async fn test_client_options_merge_right_biased() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    let client = Client::new(&[
        ClientOptions {
            directory_data_home: Some(first.path().to_path_buf()),
            ..Default::default()
        },
        ClientOptions {
            directory_data_home: Some(second.path().to_path_buf()),
            ..Default::default()
        },
    ])
    .await
    .unwrap();

    let id = client.create("directory", &[]).await.unwrap();
    assert!(
        id.contains(&second.path().display().to_string()),
        "workspace {id} should live under the last data home"
    );
}

#[tokio::test]
async fn test_default_provider_is_directory() {
    let (client, _dir) = test_client().await;
    let id = client.create("", &[]).await.unwrap();
    assert!(id.starts_with("directory://"));
    client.rm(&id).await.unwrap();
}

#[tokio::test]
async fn test_invalid_workspace_id() {
    let (client, _dir) = test_client().await;

    let err = client.ls("not-a-uri", "").await.unwrap_err();
    assert!(
        matches!(err, WorkspaceError::InvalidWorkspaceId(_)),
        "{err}"
    );

    let err = client.rm("also-not-a-uri").await.unwrap_err();
    assert!(
        matches!(err, WorkspaceError::InvalidWorkspaceId(_)),
        "{err}"
    );
}

#[tokio::test]
async fn test_unknown_provider() {
    let (client, _dir) = test_client().await;

    let err = client.ls("gcs://bucket/ws", "").await.unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidProvider(_)), "{err}");

    let err = client.create("gcs", &[]).await.unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidProvider(_)), "{err}");
}

#[tokio::test]
async fn test_write_options_merge_through_dispatcher() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    // Last-wins for the revision toggle: the trailing record re-enables it.
    client
        .write_file(
            &id,
            "f.txt",
            Bytes::from_static(b"v1"),
            &[
                WriteOptions {
                    create_revision: Some(false),
                    ..Default::default()
                },
                WriteOptions {
                    create_revision: Some(true),
                    ..Default::default()
                },
            ],
        )
        .await
        .unwrap();
    client
        .write_file(&id, "f.txt", Bytes::from_static(b"v2"), &[])
        .await
        .unwrap();

    assert_eq!(client.list_revisions(&id, "f.txt").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_if_not_exists_or_combination() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    client
        .write_file(&id, "f.txt", Bytes::from_static(b"v1"), &[])
        .await
        .unwrap();

    // if_not_exists OR-combines across records and wins over a matching
    // latest_revision_id.
    let err = client
        .write_file(
            &id,
            "f.txt",
            Bytes::from_static(b"v2"),
            &[
                WriteOptions {
                    if_not_exists: true,
                    ..Default::default()
                },
                WriteOptions::default(),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::FileExists { .. }), "{err}");
}

#[tokio::test]
async fn test_copy_from_multiple_sources() {
    let (client, _dir) = test_client().await;

    let a = client.create("directory", &[]).await.unwrap();
    let b = client.create("directory", &[]).await.unwrap();
    client
        .write_file(&a, "from-a.txt", Bytes::from_static(b"a"), &[])
        .await
        .unwrap();
    client
        .write_file(&b, "from-b.txt", Bytes::from_static(b"b"), &[])
        .await
        .unwrap();

    let dest = client
        .create("directory", &[a.clone(), b.clone()])
        .await
        .unwrap();

    let mut files = client.ls(&dest, "").await.unwrap();
    files.sort();
    assert_eq!(files, ["from-a.txt", "from-b.txt"]);
}

#[tokio::test]
async fn test_create_from_unknown_source_fails() {
    let (client, _dir) = test_client().await;

    let err = client
        .create("directory", &["bogus".to_string()])
        .await
        .unwrap_err();
    assert!(
        matches!(err, WorkspaceError::InvalidWorkspaceId(_)),
        "{err}"
    );
}
