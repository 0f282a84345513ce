//! Remote store contract and its implementations.

mod http;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workspace::{Directory, EntryKind};

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Rejected by store: {0}")]
    Rejected(String),
}

/// Workspace metadata returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub name: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Request/response boundary to the store holding the workspaces.
///
/// Paths are workspace-relative and slash-separated.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn workspace_info(&self, workspace: &str, token: Option<&str>) -> Result<WorkspaceInfo, RemoteError>;

    async fn fetch_tree(&self, workspace: &str) -> Result<Directory, RemoteError>;

    async fn read_file(&self, workspace: &str, path: &str) -> Result<String, RemoteError>;

    async fn write_file(&self, workspace: &str, path: &str, content: &str) -> Result<(), RemoteError>;

    /// Create a file or directory. A directory payload is a ZIP archive of its contents.
    async fn create_entry(
        &self,
        workspace: &str,
        path: &str,
        kind: EntryKind,
        payload: Option<Bytes>,
    ) -> Result<(), RemoteError>;

    /// Upload a flat archive whose entries become files in `dir`.
    async fn upload_archive(&self, workspace: &str, dir: &str, archive: Bytes) -> Result<(), RemoteError>;

    async fn delete_entry(&self, workspace: &str, path: &str, kind: EntryKind) -> Result<(), RemoteError>;

    async fn rename_entry(
        &self,
        workspace: &str,
        path: &str,
        kind: EntryKind,
        new_name: &str,
    ) -> Result<(), RemoteError>;
}
