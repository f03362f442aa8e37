//! End-to-end tests for the directory backend.

use bytes::Bytes;
use tempfile::TempDir;
use workspace_provider::{
    Client, ClientOptions, OpenOptions, StatOptions, WorkspaceError, WriteOptions,
};

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

async fn write(client: &Client, id: &str, name: &str, data: &str) {
    client
        .write_file(id, name, Bytes::from(data.to_string()), &[])
        .await
        .unwrap();
}

async fn read(client: &Client, id: &str, name: &str) -> String {
    let file = client.open_file(id, name, &[]).await.unwrap();
    String::from_utf8(file.read_to_bytes().await.unwrap()).unwrap()
}

#[tokio::test]
async fn test_create_write_stat_delete() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();
    assert!(id.starts_with("directory://"));

    write(&client, &id, "test.txt", "test").await;

    let info = client.stat_file(&id, "test.txt", &[]).await.unwrap();
    assert_eq!(info.size, 4);
    assert_eq!(info.name, "test.txt");
    assert!(info.mime_type.starts_with("text/plain"), "{}", info.mime_type);
    assert_eq!(info.workspace_id, id);

    client.delete_file(&id, "test.txt").await.unwrap();

    let err = client.stat_file(&id, "test.txt", &[]).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn test_round_trip_binary() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    client
        .write_file(&id, "blob.bin", Bytes::from(payload.clone()), &[])
        .await
        .unwrap();

    let file = client.open_file(&id, "blob.bin", &[]).await.unwrap();
    assert_eq!(file.read_to_bytes().await.unwrap(), payload);
}

#[tokio::test]
async fn test_revision_sequence() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "test.txt", "a").await;
    write(&client, &id, "test.txt", "b").await;
    write(&client, &id, "test.txt", "c").await;

    let revisions = client.list_revisions(&id, "test.txt").await.unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].revision_id, "1");
    assert_eq!(revisions[1].revision_id, "2");
    assert_eq!(revisions[0].info.name, "test.txt");
    assert_eq!(revisions[0].info.workspace_id, id);

    let rev1 = client.get_revision(&id, "test.txt", "1").await.unwrap();
    assert_eq!(rev1.revision_id().unwrap(), "1");
    assert_eq!(rev1.read_to_bytes().await.unwrap(), b"a");

    let rev2 = client.get_revision(&id, "test.txt", "2").await.unwrap();
    assert_eq!(rev2.read_to_bytes().await.unwrap(), b"b");

    assert_eq!(read(&client, &id, "test.txt").await, "c");

    // Deleting the highest revision decrements the counter.
    client.delete_revision(&id, "test.txt", "2").await.unwrap();
    let revisions = client.list_revisions(&id, "test.txt").await.unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].revision_id, "1");

    // A guarded write against the decremented counter succeeds and recreates
    // revision 2.
    client
        .write_file(
            &id,
            "test.txt",
            Bytes::from_static(b"d"),
            &[WriteOptions {
                latest_revision_id: Some("1".to_string()),
                ..Default::default()
            }],
        )
        .await
        .unwrap();

    let revisions = client.list_revisions(&id, "test.txt").await.unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[1].revision_id, "2");

    let rev2 = client.get_revision(&id, "test.txt", "2").await.unwrap();
    assert_eq!(rev2.read_to_bytes().await.unwrap(), b"c");
}

#[tokio::test]
async fn test_delete_non_highest_revision_leaves_gap() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "f.txt", "v1").await;
    write(&client, &id, "f.txt", "v2").await;
    write(&client, &id, "f.txt", "v3").await;
    write(&client, &id, "f.txt", "v4").await;

    client.delete_revision(&id, "f.txt", "2").await.unwrap();

    let revisions = client.list_revisions(&id, "f.txt").await.unwrap();
    let ids: Vec<&str> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
    assert_eq!(ids, ["1", "3"]);

    // The counter is unchanged, so the next revision is 4.
    write(&client, &id, "f.txt", "v5").await;
    let revisions = client.list_revisions(&id, "f.txt").await.unwrap();
    let ids: Vec<&str> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
    assert_eq!(ids, ["1", "3", "4"]);
}

#[tokio::test]
async fn test_if_not_exists() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    let opts = WriteOptions {
        if_not_exists: true,
        ..Default::default()
    };

    client
        .write_file(&id, "x.txt", Bytes::from_static(b"x"), &[opts.clone()])
        .await
        .unwrap();

    let err = client
        .write_file(&id, "x.txt", Bytes::from_static(b"y"), &[opts])
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::FileExists { .. }), "{err}");

    // The failed write did not clobber the content.
    assert_eq!(read(&client, &id, "x.txt").await, "x");
}

#[tokio::test]
async fn test_latest_revision_guard_conflict() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    for content in ["a", "b", "c", "d"] {
        write(&client, &id, "f.txt", content).await;
    }

    // Counter is now 3.
    let guarded = WriteOptions {
        latest_revision_id: Some("3".to_string()),
        ..Default::default()
    };

    client
        .write_file(&id, "f.txt", Bytes::from_static(b"X"), &[guarded.clone()])
        .await
        .unwrap();

    let err = client
        .write_file(&id, "f.txt", Bytes::from_static(b"Y"), &[guarded])
        .await
        .unwrap_err();
    match err {
        WorkspaceError::Conflict {
            latest_revision_id,
            current_revision_id,
            ..
        } => {
            assert_eq!(latest_revision_id, "3");
            assert_eq!(current_revision_id, "4");
        }
        other => panic!("expected conflict, got {other}"),
    }

    // The losing write mutated nothing.
    assert_eq!(read(&client, &id, "f.txt").await, "X");
    let revisions = client.list_revisions(&id, "f.txt").await.unwrap();
    assert_eq!(revisions.len(), 4);
}

#[tokio::test]
async fn test_copy_workspace_with_revisions() {
    let (client, _dir) = test_client().await;
    let a = client.create("directory", &[]).await.unwrap();

    write(&client, &a, "test.txt", "one").await;
    write(&client, &a, "test.txt", "two").await;
    write(&client, &a, "nested/deep.txt", "deep").await;

    let b = client.create("directory", &[a.clone()]).await.unwrap();
    assert_ne!(a, b);

    let mut a_files = client.ls(&a, "").await.unwrap();
    let mut b_files = client.ls(&b, "").await.unwrap();
    a_files.sort();
    b_files.sort();
    assert_eq!(a_files, b_files);

    assert_eq!(read(&client, &b, "test.txt").await, "two");
    assert_eq!(read(&client, &b, "nested/deep.txt").await, "deep");

    let rev1 = client.get_revision(&b, "test.txt", "1").await.unwrap();
    assert_eq!(rev1.read_to_bytes().await.unwrap(), b"one");

    let revisions = client.list_revisions(&b, "test.txt").await.unwrap();
    assert_eq!(revisions.len(), 1);
}

#[tokio::test]
async fn test_path_confinement() {
    let (client, dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    // Plant a file above the workspace root that must stay untouched.
    std::fs::write(dir.path().join("etc"), "outside").unwrap();

    let err = client
        .write_file(&id, "../etc", Bytes::from_static(b"clobbered"), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidPath { .. }), "{err}");
    assert_eq!(std::fs::read(dir.path().join("etc")).unwrap(), b"outside");

    for path in ["../etc", "/etc/passwd", "a/../../etc"] {
        assert!(client.open_file(&id, path, &[]).await.is_err());
        assert!(client.stat_file(&id, path, &[]).await.is_err());
        assert!(client.delete_file(&id, path).await.is_err());
        assert!(client.ls(&id, path).await.is_err());
        assert!(client.remove_all_with_prefix(&id, path).await.is_err());
        assert!(client.list_revisions(&id, path).await.is_err());
        assert!(client.get_revision(&id, path, "1").await.is_err());
        assert!(client.delete_revision(&id, path, "1").await.is_err());
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_is_rejected() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    let root = std::path::PathBuf::from(id.strip_prefix("directory://").unwrap());
    let outside = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

    // Deep target whose intermediate directory does not exist yet; the write
    // must fail before creating anything through the link.
    let err = client
        .write_file(&id, "link/sub/c.txt", Bytes::from_static(b"escape"), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidPath { .. }), "{err}");
    assert!(!outside.path().join("sub").exists());

    let err = client
        .open_file(&id, "link/c.txt", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidPath { .. }), "{err}");
}

#[tokio::test]
async fn test_open_with_latest_revision_id() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "f.txt", "v1").await;

    // Never overwritten: latest revision reads as "0".
    let file = client
        .open_file(
            &id,
            "f.txt",
            &[OpenOptions {
                with_latest_revision_id: true,
            }],
        )
        .await
        .unwrap();
    assert_eq!(file.revision_id().unwrap(), "0");

    // Without the flag the revision ID is a sentinel error.
    let file = client.open_file(&id, "f.txt", &[]).await.unwrap();
    assert!(matches!(
        file.revision_id(),
        Err(WorkspaceError::RevisionNotRequested)
    ));

    write(&client, &id, "f.txt", "v2").await;
    let info = client
        .stat_file(
            &id,
            "f.txt",
            &[StatOptions {
                with_latest_revision_id: true,
            }],
        )
        .await
        .unwrap();
    assert_eq!(info.latest_revision_id().unwrap(), "1");
}

#[tokio::test]
async fn test_delete_file_is_idempotent() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "f.txt", "data").await;
    client.delete_file(&id, "f.txt").await.unwrap();
    client.delete_file(&id, "f.txt").await.unwrap();
    client.delete_file(&id, "never-existed.txt").await.unwrap();
}

#[tokio::test]
async fn test_delete_revision_is_idempotent() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "f.txt", "v1").await;
    write(&client, &id, "f.txt", "v2").await;

    client.delete_revision(&id, "f.txt", "1").await.unwrap();
    client.delete_revision(&id, "f.txt", "1").await.unwrap();
}

#[tokio::test]
async fn test_delete_file_removes_revisions() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "f.txt", "v1").await;
    write(&client, &id, "f.txt", "v2").await;
    write(&client, &id, "f.txt", "v3").await;

    client.delete_file(&id, "f.txt").await.unwrap();
    assert!(client
        .list_revisions(&id, "f.txt")
        .await
        .unwrap()
        .is_empty());

    // The counter record is gone too, so history restarts from scratch.
    write(&client, &id, "f.txt", "fresh").await;
    assert!(client
        .list_revisions(&id, "f.txt")
        .await
        .unwrap()
        .is_empty());

    let file = client
        .open_file(
            &id,
            "f.txt",
            &[OpenOptions {
                with_latest_revision_id: true,
            }],
        )
        .await
        .unwrap();
    assert_eq!(file.revision_id().unwrap(), "0");
}

#[tokio::test]
async fn test_create_revision_disabled() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    let no_revision = WriteOptions {
        create_revision: Some(false),
        ..Default::default()
    };

    client
        .write_file(&id, "f.txt", Bytes::from_static(b"v1"), &[no_revision.clone()])
        .await
        .unwrap();
    client
        .write_file(&id, "f.txt", Bytes::from_static(b"v2"), &[no_revision])
        .await
        .unwrap();

    assert!(client
        .list_revisions(&id, "f.txt")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(read(&client, &id, "f.txt").await, "v2");

    // Re-enabling revisions picks up from the live content.
    write(&client, &id, "f.txt", "v3").await;
    let revisions = client.list_revisions(&id, "f.txt").await.unwrap();
    assert_eq!(revisions.len(), 1);
    let rev = client.get_revision(&id, "f.txt", "1").await.unwrap();
    assert_eq!(rev.read_to_bytes().await.unwrap(), b"v2");
}

#[tokio::test]
async fn test_ls_with_prefix() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "a/1.txt", "1").await;
    write(&client, &id, "a/b/2.txt", "2").await;
    write(&client, &id, "c/3.txt", "3").await;

    let mut all = client.ls(&id, "").await.unwrap();
    all.sort();
    assert_eq!(all, ["a/1.txt", "a/b/2.txt", "c/3.txt"]);

    let mut under_a = client.ls(&id, "a").await.unwrap();
    under_a.sort();
    assert_eq!(under_a, ["a/1.txt", "a/b/2.txt"]);

    assert!(client.ls(&id, "missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_all_with_prefix() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "keep/1.txt", "1").await;
    write(&client, &id, "drop/2.txt", "2").await;
    write(&client, &id, "drop/sub/3.txt", "3").await;

    client.remove_all_with_prefix(&id, "drop").await.unwrap();

    let mut remaining = client.ls(&id, "").await.unwrap();
    remaining.sort();
    assert_eq!(remaining, ["keep/1.txt"]);

    // Missing prefixes are not an error.
    client.remove_all_with_prefix(&id, "drop").await.unwrap();
}

#[tokio::test]
async fn test_rm_removes_live_and_shadow_trees() {
    let (client, dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "f.txt", "v1").await;
    write(&client, &id, "f.txt", "v2").await;

    let uuid = id.rsplit('/').next().unwrap().to_string();
    assert!(dir.path().join(&uuid).exists());
    assert!(dir.path().join("revisions").join(&uuid).exists());

    client.rm(&id).await.unwrap();

    assert!(!dir.path().join(&uuid).exists());
    assert!(!dir.path().join("revisions").join(&uuid).exists());

    assert!(client.ls(&id, "").await.unwrap().is_empty());
    assert!(client.open_file(&id, "f.txt", &[]).await.unwrap_err().is_not_found());

    // Removing an already-removed workspace succeeds.
    client.rm(&id).await.unwrap();
}

#[tokio::test]
async fn test_revisions_locator_is_reserved() {
    let (client, dir) = test_client().await;

    let reserved = format!("directory://{}/revisions", dir.path().display());
    let err = client.ls(&reserved, "").await.unwrap_err();
    assert!(
        matches!(err, WorkspaceError::InvalidWorkspaceId(_)),
        "{err}"
    );
}

#[tokio::test]
async fn test_parent_directories_created_on_write() {
    let (client, _dir) = test_client().await;
    let id = client.create("directory", &[]).await.unwrap();

    write(&client, &id, "a/b/c/deep.txt", "deep").await;
    assert_eq!(read(&client, &id, "a/b/c/deep.txt").await, "deep");
}
