//! Workspace provider library.
//!
//! A workspace is a logically isolated, named container of files addressed by
//! an opaque URI of the form `provider://locator`. This crate provides a
//! backend-independent client over three storage backends (local directory,
//! S3, Azure Blob Storage) plus optimistic-concurrency-controlled revision
//! history layered on top of any of them.

pub mod config;
pub mod server;
pub mod workspace;

pub use workspace::{
    Client, ClientOptions, FileInfo, OpenOptions, RevisionInfo, StatOptions, WorkspaceError,
    WorkspaceFile, WriteOptions,
};
