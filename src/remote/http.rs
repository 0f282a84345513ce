use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;

use super::{RemoteError, RemoteStore, WorkspaceInfo};
use crate::workspace::{path, Directory, EntryKind};

/// HTTP client for the workspace backend
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create a new client for `base_url`
    pub fn new(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self, RemoteError> {
        // Normalize URL - ensure no trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::InvalidUrl("URL must start with http:// or https://".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Build a URL from a route and a workspace-relative path, encoding each segment
    fn url(&self, route: &str, workspace: &str, entry_path: &str) -> String {
        let mut url = format!(
            "{}/{}/{}",
            self.base_url,
            route,
            urlencoding::encode(workspace)
        );
        for segment in path::segments(entry_path) {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, RemoteError> {
        let response = request.send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::AuthFailed),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(what.to_string())),
            status if !status.is_success() => Err(RemoteError::Server {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn workspace_info(&self, workspace: &str, token: Option<&str>) -> Result<WorkspaceInfo, RemoteError> {
        let mut request = self.client.get(self.url("workspace", workspace, ""));
        if let Some(token) = token {
            request = request.query(&[("token", token)]);
        }
        let response = self.send(request, workspace).await?;
        Ok(response.json().await?)
    }

    async fn fetch_tree(&self, workspace: &str) -> Result<Directory, RemoteError> {
        let request = self.client.get(self.url("index-workspace", workspace, ""));
        let response = self.send(request, workspace).await?;
        Ok(response.json().await?)
    }

    async fn read_file(&self, workspace: &str, entry_path: &str) -> Result<String, RemoteError> {
        log::debug!("GET {}/{}", workspace, entry_path);
        let request = self.client.get(self.url("workspace", workspace, entry_path));
        let response = self.send(request, entry_path).await?;
        Ok(response.text().await?)
    }

    async fn write_file(&self, workspace: &str, entry_path: &str, content: &str) -> Result<(), RemoteError> {
        log::debug!("PATCH {}/{}", workspace, entry_path);
        let (_, file_name) = path::split_parent(entry_path);
        let form = Form::new().part(
            "file",
            Part::bytes(content.as_bytes().to_vec()).file_name(file_name.to_string()),
        );
        let request = self
            .client
            .patch(self.url("workspace", workspace, entry_path))
            .multipart(form);
        self.send(request, entry_path).await?;
        Ok(())
    }

    async fn create_entry(
        &self,
        workspace: &str,
        entry_path: &str,
        kind: EntryKind,
        payload: Option<Bytes>,
    ) -> Result<(), RemoteError> {
        log::debug!("POST {}/{} ({})", workspace, entry_path, kind);
        let url = self.url("workspace", workspace, entry_path);
        let request = match payload {
            Some(data) => {
                let (_, name) = path::split_parent(entry_path);
                let file_name = match kind {
                    EntryKind::File => name.to_string(),
                    EntryKind::Directory => format!("{}.zip", name),
                };
                let form = Form::new()
                    .text("type", kind.to_string())
                    .part("file", Part::bytes(data.to_vec()).file_name(file_name));
                self.client.post(url).multipart(form)
            }
            None => self.client.post(url).json(&json!({ "type": kind })),
        };
        self.send(request, entry_path).await?;
        Ok(())
    }

    async fn upload_archive(&self, workspace: &str, dir: &str, archive: Bytes) -> Result<(), RemoteError> {
        log::debug!("POST upload-files {}/{} ({} bytes)", workspace, dir, archive.len());
        let form = Form::new().part(
            "files",
            Part::bytes(archive.to_vec()).file_name("files.zip"),
        );
        let request = self
            .client
            .post(self.url("upload-files", workspace, dir))
            .multipart(form);
        self.send(request, dir).await?;
        Ok(())
    }

    async fn delete_entry(&self, workspace: &str, entry_path: &str, kind: EntryKind) -> Result<(), RemoteError> {
        log::debug!("DELETE {}/{} ({})", workspace, entry_path, kind);
        let request = self
            .client
            .delete(self.url("workspace", workspace, entry_path))
            .query(&[("type", kind.to_string())]);
        self.send(request, entry_path).await?;
        Ok(())
    }

    async fn rename_entry(
        &self,
        workspace: &str,
        entry_path: &str,
        kind: EntryKind,
        new_name: &str,
    ) -> Result<(), RemoteError> {
        log::debug!("PUT {}/{} -> {} ({})", workspace, entry_path, new_name, kind);
        let request = self
            .client
            .put(self.url("workspace", workspace, entry_path))
            .json(&json!({ "type": kind, "name": new_name }));
        self.send(request, entry_path).await?;
        Ok(())
    }
}
