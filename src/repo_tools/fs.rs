use crate::models::FileEntry;
use crate::patch::{apply_patch_text, PatchMode};
use crate::repo_tools::ToolError;
use crate::workspace::FileStore;

pub async fn list_files(store: &dyn FileStore, dir: &str) -> Result<Vec<FileEntry>, ToolError> {
    store.list(dir).await
        .map_err(|e| ToolError::Execution(format!("Cannot list {}: {}", dir, e)))
}

pub async fn read_file(store: &dyn FileStore, path: &str) -> Result<String, ToolError> {
    store.read(path).await
        .map_err(|e| ToolError::Execution(format!("Cannot read file {}: {}", path, e)))
}

pub async fn write_file(store: &dyn FileStore, path: &str, content: &str) -> Result<(), ToolError> {
    store.write(path, content).await
        .map_err(|e| ToolError::Execution(format!("Cannot write file {}: {}", path, e)))
}

pub async fn create_file(store: &dyn FileStore, path: &str) -> Result<(), ToolError> {
    store.create(path, false).await
        .map_err(|e| ToolError::Execution(format!("Cannot create {}: {}", path, e)))
}

pub async fn delete_entry(store: &dyn FileStore, path: &str) -> Result<(), ToolError> {
    store.delete(path).await
        .map_err(|e| ToolError::Execution(format!("Cannot delete {}: {}", path, e)))
}

/// Read, patch in memory, write back. The file is untouched if patching fails.
pub async fn apply_patch(
    store: &dyn FileStore,
    path: &str,
    diff: &str,
    mode: PatchMode,
) -> Result<(), ToolError> {
    let current = read_file(store, path).await?;
    let patched = apply_patch_text(&current, diff, mode)
        .map_err(|e| ToolError::Execution(format!("Patch failed for {}: {}", path, e)))?;
    write_file(store, path, &patched).await
}
