//! Path validation to ensure tools operate within the workspace.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Resolve a tool-supplied path against the workspace.
///
/// The path need not exist: the deepest existing ancestor is canonicalized
/// and the remainder appended, so `..` and symlinks cannot escape through a
/// file that is about to be created. With `restrict` set, anything outside
/// the workspace is rejected.
pub fn resolve_path(raw: &str, workspace: &Path, restrict: bool) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        bail!("path cannot be empty");
    }

    let path = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        workspace.join(raw)
    };

    let resolved = if path.exists() {
        path.canonicalize()?
    } else {
        let mut ancestor = path.clone();
        while !ancestor.exists() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent.to_path_buf(),
                None => break,
            }
        }
        if ancestor.exists() {
            let canon_ancestor = ancestor.canonicalize()?;
            let suffix = path.strip_prefix(&ancestor).unwrap_or(path.as_path());
            normalize(&canon_ancestor.join(suffix))
        } else {
            normalize(&path)
        }
    };

    if restrict {
        let workspace_canon = workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf());
        if !resolved.starts_with(&workspace_canon) {
            bail!(
                "Path '{}' is outside the workspace '{}'",
                resolved.display(),
                workspace_canon.display()
            );
        }
    }

    Ok(resolved)
}

/// Lexically fold `.` and `..` in a path that does not exist yet.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Render `path` relative to `base` with forward slashes.
pub fn relative_display(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        std::fs::write(workspace.join("test.txt"), "hello").unwrap();

        let result = resolve_path("test.txt", workspace, true).unwrap();
        assert!(result.starts_with(workspace.canonicalize().unwrap()));
    }

    #[test]
    fn test_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        std::fs::create_dir_all(workspace.join("sub")).unwrap();

        assert!(resolve_path("../../etc/passwd", workspace, true).is_err());
    }

    #[test]
    fn test_missing_file_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();

        assert!(resolve_path("new/../../outside.txt", workspace, true).is_err());
    }

    #[test]
    fn test_missing_file_inside_workspace_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();

        let result = resolve_path("a/b/new.go", workspace, true).unwrap();
        assert!(result.ends_with("a/b/new.go"));
    }

    #[test]
    fn test_unrestricted_allows_escape() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_path("/tmp", dir.path(), false).is_ok());
    }

    #[test]
    fn test_empty_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_path("  ", dir.path(), false).is_err());
    }

    #[test]
    fn test_relative_display() {
        let base = Path::new("/ws");
        assert_eq!(relative_display(Path::new("/ws/src/main.go"), base), "src/main.go");
    }
}
