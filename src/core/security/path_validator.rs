use std::io;
use std::path::{Path, PathBuf};

use crate::core::config::SecurityConfig;

/// Why a local file may not be read by an adapter.
#[derive(Debug, thiserror::Error)]
pub enum PathSecurityError {
    #[error("Path '{path}' is outside allowed root directory '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Symlinks are not allowed: '{path}'")]
    SymlinkNotAllowed { path: PathBuf },

    #[error("Path does not exist: '{path}'")]
    NotFound { path: PathBuf },

    #[error("Cannot resolve path '{path}': {source}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolve a caller-supplied path for reading or listing.
///
/// The path must exist. When `MCP_ROOT_PATH` is configured the resolved path
/// (after `..` and symlinks) must stay below it, and symlinks are refused
/// outright unless `MCP_ALLOW_SYMLINKS` permits them.
pub fn confine_path(path: &Path, security: &SecurityConfig) -> Result<PathBuf, PathSecurityError> {
    let canonical = resolve(path)?;

    let Some(root) = security.root_path.as_deref() else {
        return Ok(canonical);
    };

    if !security.allow_symlinks && path.is_symlink() {
        return Err(PathSecurityError::SymlinkNotAllowed {
            path: path.to_path_buf(),
        });
    }

    let root = resolve(root)?;
    if !canonical.starts_with(&root) {
        return Err(PathSecurityError::OutsideRoot {
            path: canonical,
            root,
        });
    }

    Ok(canonical)
}

fn resolve(path: &Path) -> Result<PathBuf, PathSecurityError> {
    path.canonicalize().map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            PathSecurityError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            PathSecurityError::Unresolvable {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn security(root: Option<&Path>, allow_symlinks: bool) -> SecurityConfig {
        SecurityConfig {
            root_path: root.map(Path::to_path_buf),
            allow_symlinks,
        }
    }

    #[test]
    fn test_unrestricted_allows_existing_file() {
        let dir = TempDir::new().unwrap();
        let shot = dir.path().join("https-example.com.jpeg");
        fs::write(&shot, b"\xff\xd8").unwrap();

        let resolved = confine_path(&shot, &security(None, true)).unwrap();
        assert!(resolved.ends_with("https-example.com.jpeg"));
    }

    #[test]
    fn test_traversal_out_of_root_is_rejected() {
        let dir = TempDir::new().unwrap();
        let screenshots = dir.path().join("screenshots");
        fs::create_dir(&screenshots).unwrap();
        fs::write(dir.path().join("secrets.txt"), "x").unwrap();

        let result = confine_path(
            &screenshots.join("../secrets.txt"),
            &security(Some(&screenshots), true),
        );
        assert!(matches!(result, Err(PathSecurityError::OutsideRoot { .. })));
    }

    #[test]
    fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let result = confine_path(&dir.path().join("nope.png"), &security(Some(dir.path()), true));
        assert!(matches!(result, Err(PathSecurityError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_rejected() {
        use std::os::unix::fs::symlink;

        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("target.txt");
        fs::write(&target, "x").unwrap();
        let link = root.path().join("link.txt");
        symlink(&target, &link).unwrap();

        let result = confine_path(&link, &security(Some(root.path()), true));
        assert!(matches!(result, Err(PathSecurityError::OutsideRoot { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_refused_when_disabled() {
        use std::os::unix::fs::symlink;

        let root = TempDir::new().unwrap();
        let target = root.path().join("target.txt");
        fs::write(&target, "x").unwrap();
        let link = root.path().join("link.txt");
        symlink(&target, &link).unwrap();

        assert!(confine_path(&link, &security(Some(root.path()), true)).is_ok());
        let result = confine_path(&link, &security(Some(root.path()), false));
        assert!(matches!(result, Err(PathSecurityError::SymlinkNotAllowed { .. })));
    }
}
