use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::models::FileEntry;
use crate::repo_tools::safety::{sanitize_entry_path, sanitize_path};
use crate::workspace::{FileStore, WorkspaceError};

/// Files on the local disk, confined to a project root.
pub struct DiskFileStore {
    root: PathBuf,
}

impl DiskFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        Ok(sanitize_path(&self.root, path)?)
    }

    // Targets of write, create and delete, which must not be the root.
    fn resolve_entry(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        Ok(sanitize_entry_path(&self.root, path)?)
    }

    fn relative(&self, full: &Path) -> String {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        full.strip_prefix(&root)
            .unwrap_or(full)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>, WorkspaceError> {
        let full = self.resolve(dir)?;
        let mut entries = vec![];
        for entry in WalkDir::new(&full).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                WorkspaceError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
                }))
            })?;
            entries.push(FileEntry {
                path: self.relative(entry.path()),
                is_directory: entry.file_type().is_dir(),
            });
        }
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<String, WorkspaceError> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(&full).await?)
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }

    async fn create(&self, path: &str, is_directory: bool) -> Result<(), WorkspaceError> {
        if is_directory {
            let full = self.resolve_entry(path)?;
            tokio::fs::create_dir_all(&full).await?;
            Ok(())
        } else {
            self.write(path, "").await
        }
    }

    async fn delete(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        let meta = tokio::fs::symlink_metadata(&full).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&full).await?;
        } else {
            tokio::fs::remove_file(&full).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(String),
}

/// In-memory file tree keyed by normalized relative path.
#[derive(Default)]
pub struct MemoryFileStore {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let store = Self::new();
        {
            let mut nodes = store.nodes.lock().await;
            for (path, content) in files {
                insert_file(&mut nodes, &normalize(path.as_ref()), content.into());
            }
        }
        store
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn insert_file(nodes: &mut BTreeMap<String, Node>, path: &str, content: String) {
    let mut dir = parent_of(path);
    while !dir.is_empty() {
        nodes.entry(dir.to_string()).or_insert(Node::Dir);
        dir = parent_of(dir);
    }
    nodes.insert(path.to_string(), Node::File(content));
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>, WorkspaceError> {
        let dir = normalize(dir);
        let nodes = self.nodes.lock().await;
        if !dir.is_empty() && nodes.get(&dir) != Some(&Node::Dir) {
            return Err(WorkspaceError::NotFound(dir));
        }
        Ok(nodes
            .iter()
            .filter(|(path, _)| parent_of(path) == dir)
            .map(|(path, node)| FileEntry {
                path: path.clone(),
                is_directory: *node == Node::Dir,
            })
            .collect())
    }

    async fn read(&self, path: &str) -> Result<String, WorkspaceError> {
        let path = normalize(path);
        match self.nodes.lock().await.get(&path) {
            Some(Node::File(content)) => Ok(content.clone()),
            _ => Err(WorkspaceError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let path = normalize(path);
        let mut nodes = self.nodes.lock().await;
        if nodes.get(&path) == Some(&Node::Dir) {
            return Err(WorkspaceError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} is a directory", path),
            )));
        }
        insert_file(&mut nodes, &path, content.to_string());
        Ok(())
    }

    async fn create(&self, path: &str, is_directory: bool) -> Result<(), WorkspaceError> {
        if !is_directory {
            return self.write(path, "").await;
        }
        let path = normalize(path);
        let mut nodes = self.nodes.lock().await;
        let mut dir = path.as_str();
        while !dir.is_empty() {
            nodes.entry(dir.to_string()).or_insert(Node::Dir);
            dir = parent_of(dir);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), WorkspaceError> {
        let path = normalize(path);
        let mut nodes = self.nodes.lock().await;
        if nodes.remove(&path).is_none() {
            return Err(WorkspaceError::NotFound(path));
        }
        let prefix = format!("{}/", path);
        nodes.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }
}
