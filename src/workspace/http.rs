use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::FileEntry;
use crate::workspace::{FileStore, WorkspaceError};

/// File store served by a local helper process over HTTP (`/api/fs/*`).
pub struct HttpFileStore {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ReadResponse {
    content: String,
}

impl HttpFileStore {
    pub fn new(base_url: &str) -> Result<Self, WorkspaceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| WorkspaceError::Http(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn post(&self, op: &str, body: Value, failure: &str) -> Result<Response, WorkspaceError> {
        let url = format!("{}/api/fs/{}", self.base_url, op);
        let response = self.http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkspaceError::Http(format!("{}: {}", failure, e)))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            Err(WorkspaceError::Http(format!("{} ({}): {}", failure, status, detail)))
        }
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>, WorkspaceError> {
        let response = self.post("list", json!({ "dir": dir }), "Failed to list files").await?;
        response.json().await.map_err(|e| WorkspaceError::Http(e.to_string()))
    }

    async fn read(&self, path: &str) -> Result<String, WorkspaceError> {
        let response = self.post("read", json!({ "path": path }), "Failed to read file").await?;
        let data: ReadResponse = response.json().await.map_err(|e| WorkspaceError::Http(e.to_string()))?;
        Ok(data.content)
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        self.post("write", json!({ "path": path, "content": content }), "Failed to write file").await?;
        Ok(())
    }

    async fn create(&self, path: &str, is_directory: bool) -> Result<(), WorkspaceError> {
        self.post("create", json!({ "path": path, "isDirectory": is_directory }), "Failed to create entry").await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), WorkspaceError> {
        self.post("delete", json!({ "path": path }), "Failed to delete entry").await?;
        Ok(())
    }
}
