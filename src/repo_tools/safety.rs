use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("Path traversal attempt blocked")]
    PathTraversal,
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Refusing to modify the workspace root")]
    WorkspaceRoot,
}

/// Sanitize path to ensure it's within the workspace root
pub fn sanitize_path(root: &Path, rel_path: &str) -> Result<PathBuf, SafetyError> {
    let canonical_root = root.canonicalize()
        .map_err(|_| SafetyError::InvalidPath("Cannot canonicalize workspace root".to_string()))?;

    // Absolute paths are accepted only when they already point inside the root
    let requested = Path::new(rel_path);
    let relative: PathBuf = if requested.is_absolute() {
        requested.strip_prefix(&canonical_root)
            .or_else(|_| requested.strip_prefix(root))
            .map(Path::to_path_buf)
            .map_err(|_| SafetyError::PathTraversal)?
    } else {
        PathBuf::from(rel_path.replace('\\', "/"))
    };

    // Build clean path manually (handles .. correctly)
    let mut clean_path = PathBuf::new();
    for comp in relative.components() {
        match comp {
            Component::CurDir => continue,
            Component::ParentDir => {
                // Trying to go above root - block it
                if !clean_path.pop() {
                    return Err(SafetyError::PathTraversal);
                }
            }
            Component::Normal(part) => clean_path.push(part),
            Component::RootDir | Component::Prefix(_) => return Err(SafetyError::PathTraversal),
        }
    }

    let full_path = canonical_root.join(&clean_path);

    // The target may not exist yet; resolve the deepest existing ancestor so a
    // symlink inside the root cannot lead outside it.
    let mut ancestor = full_path.as_path();
    loop {
        if let Ok(real) = ancestor.canonicalize() {
            if !real.starts_with(&canonical_root) {
                return Err(SafetyError::PathTraversal);
            }
            break;
        }
        match ancestor.parent() {
            Some(parent) => ancestor = parent,
            None => break,
        }
    }

    Ok(full_path)
}

/// Like [`sanitize_path`], but the root itself is not a valid target
pub fn sanitize_entry_path(root: &Path, rel_path: &str) -> Result<PathBuf, SafetyError> {
    let full_path = sanitize_path(root, rel_path)?;
    let canonical_root = root.canonicalize()
        .map_err(|_| SafetyError::InvalidPath("Cannot canonicalize workspace root".to_string()))?;
    if full_path == canonical_root {
        return Err(SafetyError::WorkspaceRoot);
    }
    Ok(full_path)
}

/// Truncate string with metadata
pub fn truncate_string(s: &str, max_chars: usize) -> (String, bool) {
    if s.chars().count() <= max_chars {
        (s.to_string(), false)
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        (truncated, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_string() {
        let (result, truncated) = truncate_string("hello", 10);
        assert_eq!(result, "hello");
        assert!(!truncated);

        let (result, truncated) = truncate_string("hello world", 5);
        assert_eq!(result, "hello");
        assert!(truncated);

        let (result, truncated) = truncate_string("héllo", 5);
        assert_eq!(result, "héllo");
        assert!(!truncated);
    }

    #[test]
    fn test_sanitize_path_valid() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let file_path = root.join("test.txt");
        fs::write(&file_path, "test").unwrap();

        let result = sanitize_path(root, "test.txt").unwrap();
        assert_eq!(result, file_path.canonicalize().unwrap());

        let result = sanitize_path(root, "./src/../test.txt").unwrap();
        assert_eq!(result, file_path.canonicalize().unwrap());
    }

    #[test]
    fn test_sanitize_path_not_yet_created() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let result = sanitize_path(root, "new/dir/file.rs").unwrap();
        assert_eq!(result, root.canonicalize().unwrap().join("new/dir/file.rs"));
    }

    #[test]
    fn test_sanitize_path_traversal() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let result = sanitize_path(root, "../../../etc/passwd");
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_path_rejects_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        for path in ["", ".", "./", "src/..", root.to_str().unwrap()] {
            assert!(matches!(sanitize_entry_path(root, path), Err(SafetyError::WorkspaceRoot)), "{}", path);
        }
        assert!(sanitize_entry_path(root, "src").is_ok());
        assert!(sanitize_path(root, ".").is_ok());
    }

    #[test]
    fn test_sanitize_path_absolute() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        // Absolute path outside the root should be rejected
        assert!(sanitize_path(root, "/etc/passwd").is_err());

        // ...but one inside it is fine
        let inside = root.canonicalize().unwrap().join("a.txt");
        let result = sanitize_path(root, inside.to_str().unwrap()).unwrap();
        assert_eq!(result, inside);
    }
}
