//! Option records and their merge rules.
//!
//! Options arrive as a variadic list. The merge is right-biased: for strings
//! and optionals the last set value wins, for booleans the values are OR-ed.

use std::path::PathBuf;

/// Backend wiring for [`Client`](super::Client) construction.
///
/// The directory backend is always registered; S3 and Azure are registered
/// only when their required fields are set.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Data home for the directory backend. Defaults to the XDG data
    /// directory plus `workspace-provider`.
    pub directory_data_home: Option<PathBuf>,
    pub s3_bucket_name: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub s3_base_endpoint: Option<String>,
    /// Use path-style addressing with S3-compatible services.
    pub s3_use_path_style: bool,
    pub azure_container_name: Option<String>,
    pub azure_connection_string: Option<String>,
}

impl ClientOptions {
    pub(crate) fn merged(opts: &[ClientOptions]) -> ClientOptions {
        let mut out = ClientOptions::default();
        for o in opts {
            if o.directory_data_home.is_some() {
                out.directory_data_home = o.directory_data_home.clone();
            }
            if set(&o.s3_bucket_name) {
                out.s3_bucket_name = o.s3_bucket_name.clone();
            }
            if set(&o.s3_base_endpoint) {
                out.s3_base_endpoint = o.s3_base_endpoint.clone();
            }
            out.s3_use_path_style = out.s3_use_path_style || o.s3_use_path_style;
            if set(&o.azure_container_name) {
                out.azure_container_name = o.azure_container_name.clone();
            }
            if set(&o.azure_connection_string) {
                out.azure_connection_string = o.azure_connection_string.clone();
            }
        }
        out
    }
}

fn set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Options for opening a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Also report the file's latest revision ID on the returned handle.
    pub with_latest_revision_id: bool,
}

impl OpenOptions {
    pub(crate) fn merged(opts: &[OpenOptions]) -> OpenOptions {
        OpenOptions {
            with_latest_revision_id: opts.iter().any(|o| o.with_latest_revision_id),
        }
    }
}

/// Options for stat.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatOptions {
    /// Also report the file's latest revision ID.
    pub with_latest_revision_id: bool,
}

impl StatOptions {
    pub(crate) fn merged(opts: &[StatOptions]) -> StatOptions {
        StatOptions {
            with_latest_revision_id: opts.iter().any(|o| o.with_latest_revision_id),
        }
    }
}

/// Options for writing a file.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Tri-state revision toggle: `None` and `Some(true)` record a revision,
    /// `Some(false)` skips the revision engine entirely for this write.
    pub create_revision: Option<bool>,
    /// If set, the write fails with a conflict unless this is the file's
    /// current revision ID.
    pub latest_revision_id: Option<String>,
    /// Only write if the file does not exist. Forces `latest_revision_id`
    /// to the `"-1"` sentinel, and conflicts are reported as file-exists.
    pub if_not_exists: bool,
}

impl WriteOptions {
    pub(crate) fn merged(opts: &[WriteOptions]) -> WriteOptions {
        let mut out = WriteOptions::default();
        for o in opts {
            if o.create_revision.is_some() {
                out.create_revision = o.create_revision;
            }
            if set(&o.latest_revision_id) {
                out.latest_revision_id = o.latest_revision_id.clone();
            }
            out.if_not_exists = out.if_not_exists || o.if_not_exists;
        }
        out
    }

    pub(crate) fn revision_enabled(&self) -> bool {
        self.create_revision.unwrap_or(true)
    }
}
