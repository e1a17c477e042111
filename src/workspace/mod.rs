//! Contracts for the collaborators the assistant acts on, plus the adapters
//! shipped with the crate.

pub mod command;
pub mod files;
pub mod http;
pub mod kv;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::db::DbError;
use crate::models::FileEntry;
use crate::repo_tools::safety::SafetyError;

pub use command::{CommandRunner, CommandStream, LocalCommandRunner};
pub use files::{DiskFileStore, MemoryFileStore};
pub use http::HttpFileStore;
pub use kv::{MemoryKvStore, SqliteKvStore};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Safety(#[from] SafetyError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Http(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No file store registered for backend {0:?}")]
    NoBackend(Backend),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>, WorkspaceError>;
    async fn read(&self, path: &str) -> Result<String, WorkspaceError>;
    async fn write(&self, path: &str, content: &str) -> Result<(), WorkspaceError>;
    async fn create(&self, path: &str, is_directory: bool) -> Result<(), WorkspaceError>;
    /// Removes a file, or a directory and everything below it.
    async fn delete(&self, path: &str) -> Result<(), WorkspaceError>;
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, WorkspaceError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), WorkspaceError>;
}

/// Which file store the workspace is currently served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Disk,
    LocalServer,
}

impl Backend {
    pub fn from_setting(s: &str) -> Option<Self> {
        match s {
            "disk" => Some(Backend::Disk),
            "local_server" | "local" => Some(Backend::LocalServer),
            _ => None,
        }
    }
}

/// Interchangeable file stores keyed by backend; resolved on every tool call.
#[derive(Clone, Default)]
pub struct FileStores {
    stores: HashMap<Backend, Arc<dyn FileStore>>,
}

impl FileStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: Backend, store: Arc<dyn FileStore>) -> Self {
        self.stores.insert(backend, store);
        self
    }

    /// Disk store rooted at `root`, plus the local server store when a URL is given.
    pub fn standard(root: &Path, server_url: Option<&str>) -> Result<Self, WorkspaceError> {
        let mut stores = Self::new().with(Backend::Disk, Arc::new(DiskFileStore::new(root)));
        if let Some(url) = server_url {
            stores = stores.with(Backend::LocalServer, Arc::new(HttpFileStore::new(url)?));
        }
        Ok(stores)
    }

    pub fn get(&self, backend: Backend) -> Result<Arc<dyn FileStore>, WorkspaceError> {
        self.stores
            .get(&backend)
            .cloned()
            .ok_or(WorkspaceError::NoBackend(backend))
    }
}
