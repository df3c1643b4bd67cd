//! Path validation utilities.
//!
//! Ensures paths stay within an allowed root to prevent path traversal attacks.

use anyhow::Result;
use std::path::{Component, Path, PathBuf};

/// Lexically resolve `candidate` against `root` and require the result to stay
/// inside `root`. Declared files do not exist yet, so nothing is canonicalized;
/// `..` is folded component by component and any step above the root fails.
pub fn resolve_under_root(root: &Path, candidate: &str) -> Result<PathBuf> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty path");
    }
    let root = normalize(root);
    let input = Path::new(trimmed);
    let joined = if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(&root) {
                    anyhow::bail!("path escapes writable root: {}", candidate);
                }
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    if !resolved.starts_with(&root) || resolved == root {
        anyhow::bail!("path escapes writable root: {}", candidate);
    }
    Ok(resolved)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Validate an existing directory and return its canonical form.
/// Used at startup for storage roots; a failure here is fatal to the caller.
pub fn validate_existing_dir(path: &Path, path_type: &str) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("{} is not accessible: {} ({})", path_type, path.display(), e))?;
    if !canonical.is_dir() {
        anyhow::bail!("{} is not a directory: {}", path_type, path.display());
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_inside_root() {
        let p = resolve_under_root(Path::new("/srv/features"), "api/handler.rhai").unwrap();
        assert_eq!(p, PathBuf::from("/srv/features/api/handler.rhai"));
    }

    #[test]
    fn test_inner_parent_dir_is_folded() {
        let p = resolve_under_root(Path::new("/srv/features"), "a/../b.rhai").unwrap();
        assert_eq!(p, PathBuf::from("/srv/features/b.rhai"));
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(resolve_under_root(Path::new("/srv/features"), "../etc/passwd").is_err());
        assert!(resolve_under_root(Path::new("/srv/features"), "a/../../x").is_err());
    }

    #[test]
    fn test_absolute_outside_rejected() {
        assert!(resolve_under_root(Path::new("/srv/features"), "/etc/passwd").is_err());
        assert!(resolve_under_root(Path::new("/srv/features"), "/srv/features-evil/x").is_err());
    }

    #[test]
    fn test_absolute_inside_accepted() {
        let p = resolve_under_root(Path::new("/srv/features"), "/srv/features/x.rhai").unwrap();
        assert_eq!(p, PathBuf::from("/srv/features/x.rhai"));
    }

    #[test]
    fn test_root_itself_rejected() {
        assert!(resolve_under_root(Path::new("/srv/features"), ".").is_err());
        assert!(resolve_under_root(Path::new("/srv/features"), "  ").is_err());
    }

    #[test]
    fn test_validate_existing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(validate_existing_dir(tmp.path(), "Storage root").is_ok());
        assert!(validate_existing_dir(&tmp.path().join("missing"), "Storage root").is_err());
    }
}
