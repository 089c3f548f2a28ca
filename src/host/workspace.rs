//! Project directories on disk.
//!
//! Every project owns `<projects_dir>/<name>`. Names are validated to a
//! single safe path segment so the mapping from name to directory can never
//! leave the workspace root. Relative paths coming from requests go through
//! [`sanitize_relative`] and, once resolved, [`contain`] so that neither
//! `..` segments nor symlinks can escape a project directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::models::FileEntry;
use crate::errors::{HostError, HostResult};

const MAX_NAME_LEN: usize = 64;

pub const INDEX_FILE: &str = "index.html";

/// Validate a project name for use as a directory name.
pub fn validate_name(name: &str) -> HostResult<()> {
    let reject = |reason: &str| {
        Err(HostError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return reject("name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("name must be at most 64 bytes");
    }
    if name.starts_with('.') {
        return reject("name must not start with '.'");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return reject("only ASCII letters, digits, '-', '_' and '.' are allowed");
    }
    Ok(())
}

/// Normalize a request-relative path. Returns `None` for anything that could
/// address a location outside the base directory.
pub fn sanitize_relative(path: &str) -> Option<PathBuf> {
    if path.contains('\0') || path.contains('\\') {
        return None;
    }
    let mut clean = PathBuf::new();
    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

/// Canonicalize `candidate` and confirm it still lives under `root`.
///
/// `root` must already be canonical. Returns `Ok(None)` when the resolved
/// path escapes the root (for example through a symlink).
pub async fn contain(root: &Path, candidate: &Path) -> std::io::Result<Option<PathBuf>> {
    let resolved = tokio::fs::canonicalize(candidate).await?;
    if resolved.starts_with(root) {
        Ok(Some(resolved))
    } else {
        Ok(None)
    }
}

/// Default document seeded into every new project.
pub fn index_html(project_name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Hello World</title>
    <style>
        body {{
            font-family: Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #f0f0f0;
        }}
        h1 {{
            color: #333;
        }}
    </style>
</head>
<body>
    <h1>Hello World from {}!</h1>
</body>
</html>
"#,
        project_name
    )
}

/// Root directory holding every project directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure_root(&self) -> HostResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| HostError::io(&self.root, e))
    }

    pub fn project_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::metadata(self.project_dir(name))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the project directory and write the default `index.html`.
    pub async fn seed(&self, name: &str) -> HostResult<PathBuf> {
        let dir = self.project_dir(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HostError::io(&dir, e))?;
        let index = dir.join(INDEX_FILE);
        tokio::fs::write(&index, index_html(name))
            .await
            .map_err(|e| HostError::io(&index, e))?;
        Ok(dir)
    }

    /// Remove the whole project tree. A directory that is already gone is
    /// not an error.
    pub async fn remove(&self, name: &str) -> HostResult<()> {
        let dir = self.project_dir(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HostError::io(&dir, e)),
        }
    }

    async fn canonical_project_dir(&self, name: &str) -> HostResult<PathBuf> {
        let dir = self.project_dir(name);
        tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| HostError::io(&dir, e))
    }

    /// Resolve an existing path inside the project directory.
    async fn resolve_existing(&self, name: &str, rel: &str) -> HostResult<PathBuf> {
        let clean = sanitize_relative(rel).ok_or_else(|| HostError::InvalidPath {
            path: rel.to_string(),
        })?;
        let root = self.canonical_project_dir(name).await?;
        match contain(&root, &root.join(&clean)).await {
            Ok(Some(path)) => Ok(path),
            Ok(None) => Err(HostError::InvalidPath {
                path: rel.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(HostError::FileNotFound {
                path: rel.to_string(),
            }),
            Err(e) => Err(HostError::io(root.join(clean), e)),
        }
    }

    pub async fn list_files(&self, name: &str, subdir: &str) -> HostResult<Vec<FileEntry>> {
        let dir = self.resolve_existing(name, subdir).await?;
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(|e| match e.kind() {
            ErrorKind::NotADirectory => HostError::InvalidPath {
                path: subdir.to_string(),
            },
            _ => HostError::io(&dir, e),
        })?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| HostError::io(&dir, e))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| HostError::io(entry.path(), e))?;
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    pub async fn read_file(&self, name: &str, rel: &str) -> HostResult<Vec<u8>> {
        let path = self.resolve_existing(name, rel).await?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::IsADirectory => HostError::InvalidPath {
                path: rel.to_string(),
            },
            _ => HostError::io(&path, e),
        })
    }

    /// Resolve the parent directory of `clean` segment by segment, creating
    /// missing directories only after the existing prefix is confirmed to be
    /// inside `root`.
    async fn contained_parent(
        &self,
        root: &Path,
        clean: &Path,
        rel: &str,
        create: bool,
    ) -> HostResult<PathBuf> {
        let invalid = || HostError::InvalidPath {
            path: rel.to_string(),
        };
        let mut parent = root.to_path_buf();
        let Some(dirs) = clean.parent() else {
            return Ok(parent);
        };
        for segment in dirs.components() {
            let next = parent.join(segment);
            match tokio::fs::symlink_metadata(&next).await {
                Ok(_) => {
                    parent = match contain(root, &next).await {
                        Ok(Some(p)) => p,
                        Ok(None) => return Err(invalid()),
                        Err(e) => return Err(HostError::io(&next, e)),
                    };
                    let is_dir = tokio::fs::metadata(&parent)
                        .await
                        .map(|m| m.is_dir())
                        .unwrap_or(false);
                    if !is_dir {
                        return Err(invalid());
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound && create => {
                    tokio::fs::create_dir(&next)
                        .await
                        .map_err(|e| HostError::io(&next, e))?;
                    parent = next;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(HostError::FileNotFound {
                        path: rel.to_string(),
                    });
                }
                Err(e) => return Err(HostError::io(&next, e)),
            }
        }
        Ok(parent)
    }

    /// Write a file, creating parent directories inside the project as needed.
    pub async fn write_file(&self, name: &str, rel: &str, contents: &[u8]) -> HostResult<()> {
        let clean = sanitize_relative(rel).ok_or_else(|| HostError::InvalidPath {
            path: rel.to_string(),
        })?;
        let file_name = clean.file_name().ok_or_else(|| HostError::InvalidPath {
            path: rel.to_string(),
        })?;
        let root = self.canonical_project_dir(name).await?;
        let parent = self.contained_parent(&root, &clean, rel, true).await?;
        let target = parent.join(file_name);
        if let Ok(meta) = tokio::fs::symlink_metadata(&target).await {
            if meta.file_type().is_symlink() || meta.is_dir() {
                return Err(HostError::InvalidPath {
                    path: rel.to_string(),
                });
            }
        }
        tokio::fs::write(&target, contents)
            .await
            .map_err(|e| HostError::io(&target, e))
    }

    /// Delete a file or directory tree. A symlink is removed itself, never
    /// the entry it points at.
    pub async fn delete_file(&self, name: &str, rel: &str) -> HostResult<()> {
        let clean = sanitize_relative(rel).ok_or_else(|| HostError::InvalidPath {
            path: rel.to_string(),
        })?;
        let file_name = clean.file_name().ok_or_else(|| HostError::InvalidPath {
            path: rel.to_string(),
        })?;
        let root = self.canonical_project_dir(name).await?;
        let parent = self.contained_parent(&root, &clean, rel, false).await?;
        let path = parent.join(file_name);
        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(HostError::FileNotFound {
                    path: rel.to_string(),
                });
            }
            Err(e) => return Err(HostError::io(&path, e)),
        };
        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| HostError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path().join("projects"));
        ws.ensure_root().unwrap();
        (dir, ws)
    }

    #[test]
    fn test_validate_name_accepts_simple_names() {
        for name in ["site", "my-site", "blog_2024", "v1.2"] {
            assert!(validate_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_validate_name_rejects_unsafe_names() {
        for name in ["", "..", ".hidden", "a/b", "a\\b", "white space", "ünï"] {
            assert!(
                matches!(validate_name(name), Err(HostError::InvalidName { .. })),
                "{:?} should be rejected",
                name
            );
        }
        let long = "x".repeat(65);
        assert!(validate_name(&long).is_err());
    }

    #[test]
    fn test_sanitize_relative() {
        assert_eq!(sanitize_relative("/"), Some(PathBuf::new()));
        assert_eq!(
            sanitize_relative("/css/site.css"),
            Some(PathBuf::from("css/site.css"))
        );
        assert_eq!(
            sanitize_relative("./a/./b.txt"),
            Some(PathBuf::from("a/b.txt"))
        );
        assert_eq!(sanitize_relative("../etc/passwd"), None);
        assert_eq!(sanitize_relative("/a/../../b"), None);
        assert_eq!(sanitize_relative("a\0b"), None);
        assert_eq!(sanitize_relative("..\\secret"), None);
    }

    #[test]
    fn test_index_html_mentions_project() {
        let html = index_html("landing");
        assert!(html.contains("Hello World from landing!"));
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_seed_and_remove() {
        let (_tmp, ws) = workspace();
        let dir = ws.seed("site").await.unwrap();
        assert!(dir.join(INDEX_FILE).exists());
        assert!(ws.exists("site").await);

        ws.remove("site").await.unwrap();
        assert!(!ws.exists("site").await);
        ws.remove("site").await.unwrap();
    }

    #[tokio::test]
    async fn test_write_read_list_delete() {
        let (_tmp, ws) = workspace();
        ws.seed("site").await.unwrap();

        ws.write_file("site", "css/app.css", b"body{}").await.unwrap();
        assert_eq!(ws.read_file("site", "/css/app.css").await.unwrap(), b"body{}");

        let root = ws.list_files("site", "").await.unwrap();
        assert_eq!(root[0].name, "css");
        assert!(root[0].is_dir);
        assert_eq!(root[1].name, INDEX_FILE);

        let css = ws.list_files("site", "css").await.unwrap();
        assert_eq!(
            css,
            vec![FileEntry {
                name: "app.css".to_string(),
                is_dir: false,
                size: 6
            }]
        );

        ws.delete_file("site", "css/app.css").await.unwrap();
        assert!(matches!(
            ws.read_file("site", "css/app.css").await,
            Err(HostError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_ops_reject_traversal() {
        let (tmp, ws) = workspace();
        ws.seed("site").await.unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "nope").unwrap();

        assert!(matches!(
            ws.read_file("site", "../../secret.txt").await,
            Err(HostError::InvalidPath { .. })
        ));
        assert!(matches!(
            ws.write_file("site", "../escape.txt", b"x").await,
            Err(HostError::InvalidPath { .. })
        ));
        assert!(matches!(
            ws.delete_file("site", "").await,
            Err(HostError::InvalidPath { .. })
        ));
        assert!(!tmp.path().join("projects/escape.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_is_rejected() {
        let (tmp, ws) = workspace();
        let dir = ws.seed("site").await.unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "nope").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("secret.txt"), dir.join("link.txt")).unwrap();

        assert!(matches!(
            ws.read_file("site", "link.txt").await,
            Err(HostError::InvalidPath { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_through_symlinked_dir_creates_nothing_outside() {
        let (tmp, ws) = workspace();
        let dir = ws.seed("site").await.unwrap();
        let outside = tmp.path().join("outside");
        std::fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, dir.join("link")).unwrap();

        assert!(matches!(
            ws.write_file("site", "link/made/deep/x.txt", b"hi").await,
            Err(HostError::InvalidPath { .. })
        ));
        assert!(!outside.join("made").exists());
        assert_eq!(std::fs::read_dir(&outside).unwrap().count(), 0);

        ws.write_file("site", "nested/a/b.txt", b"ok").await.unwrap();
        assert_eq!(std::fs::read(dir.join("nested/a/b.txt")).unwrap(), b"ok");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_symlink_removes_link_only() {
        let (_tmp, ws) = workspace();
        let dir = ws.seed("site").await.unwrap();
        ws.write_file("site", "docs/guide.html", b"guide").await.unwrap();
        std::os::unix::fs::symlink(dir.join("docs"), dir.join("alias")).unwrap();

        ws.delete_file("site", "alias").await.unwrap();
        assert!(std::fs::symlink_metadata(dir.join("alias")).is_err());
        assert_eq!(std::fs::read(dir.join("docs/guide.html")).unwrap(), b"guide");

        assert!(matches!(
            ws.delete_file("site", "alias").await,
            Err(HostError::FileNotFound { .. })
        ));
    }
}
