//! [`RecordStore`] over a vault directory on disk.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use carnet_core::{Error, RecordStore, Result};
use tokio::fs;
use tracing::debug;

/// Files and directories whose name starts with this are not listed.
const HIDDEN_PREFIX: char = '.';

/// Stores records as files under `root`; locators are `/`-separated paths
/// relative to it.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turn a command-line path into a locator.
    ///
    /// Relative paths are taken as relative to the vault. Absolute paths must
    /// lie inside it.
    pub fn locator_for(&self, path: &Path) -> Result<String> {
        let relative = if path.is_absolute() {
            let root = std::path::absolute(&self.root)?;
            path.strip_prefix(&root)
                .map_err(|_| {
                    Error::InvalidInput(format!(
                        "{} is outside the vault {}",
                        path.display(),
                        root.display()
                    ))
                })?
                .to_path_buf()
        } else {
            path.to_path_buf()
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "{} does not name a record inside the vault",
                        path.display()
                    )))
                }
            }
        }
        if parts.is_empty() {
            return Err(Error::InvalidInput("empty record path".to_string()));
        }
        Ok(parts.join("/"))
    }

    fn path_of(&self, locator: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in locator.split('/').filter(|p| !p.is_empty()) {
            if part == "." || part == ".." {
                return Err(Error::InvalidInput(format!("invalid locator {locator}")));
            }
            path.push(part);
        }
        Ok(path)
    }
}

fn storage_error(locator: &str, e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::NotFound(locator.to_string()),
        _ => Error::Storage(format!("{locator}: {e}")),
    }
}

#[async_trait]
impl RecordStore for FsStore {
    async fn exists(&self, locator: &str) -> Result<bool> {
        let path = self.path_of(locator)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| storage_error(locator, e))
    }

    async fn read(&self, locator: &str) -> Result<String> {
        let path = self.path_of(locator)?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| storage_error(locator, e))
    }

    async fn write(&self, locator: &str, text: &str) -> Result<()> {
        let path = self.path_of(locator)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(locator, e))?;
        }
        fs::write(&path, text)
            .await
            .map_err(|e| storage_error(locator, e))?;
        debug!(locator, bytes = text.len(), "Record written");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut locators = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| storage_error(&prefix, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage_error(&prefix, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(HIDDEN_PREFIX) {
                    continue;
                }
                let locator = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| storage_error(&locator, e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), locator));
                } else if file_type.is_file() {
                    locators.push(locator);
                }
            }
        }

        locators.sort();
        Ok(locators)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.path_of(from)?;
        let target = self.path_of(to)?;
        if fs::try_exists(&target)
            .await
            .map_err(|e| storage_error(to, e))?
        {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(to, e))?;
        }
        fs::rename(&source, &target)
            .await
            .map_err(|e| storage_error(from, e))?;
        debug!(from, to, "Record renamed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsStore) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = FsStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_write_read_creates_parents() {
        let (_dir, store) = store();
        store.write("NEW/ERRORS/a.md", "A").await.unwrap();

        assert!(store.exists("NEW/ERRORS/a.md").await.unwrap());
        assert_eq!(store.read("NEW/ERRORS/a.md").await.unwrap(), "A");
        assert!(!store.exists("NEW/b.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read("nope.md").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_skips_hidden() {
        let (dir, store) = store();
        store.write("b.md", "").await.unwrap();
        store.write("a/z.md", "").await.unwrap();
        store.write("a/c.csv", "").await.unwrap();
        std::fs::create_dir_all(dir.path().join(".obsidian")).unwrap();
        std::fs::write(dir.path().join(".obsidian/app.json"), "{}").unwrap();

        assert_eq!(
            store.list().await.unwrap(),
            vec!["a/c.csv", "a/z.md", "b.md"]
        );
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_target() {
        let (_dir, store) = store();
        store.write("a.md", "A").await.unwrap();
        store.write("b.md", "B").await.unwrap();

        assert!(matches!(
            store.rename("a.md", "b.md").await.unwrap_err(),
            Error::AlreadyExists(_)
        ));

        store.rename("a.md", "Archives/c.md").await.unwrap();
        assert!(!store.exists("a.md").await.unwrap());
        assert_eq!(store.read("Archives/c.md").await.unwrap(), "A");
    }

    #[test]
    fn test_locator_for_paths() {
        let (dir, store) = store();
        assert_eq!(
            store.locator_for(Path::new("./Journal/Walk.md")).unwrap(),
            "Journal/Walk.md"
        );
        let absolute = std::path::absolute(dir.path().join("NEW/x.md")).unwrap();
        assert_eq!(store.locator_for(&absolute).unwrap(), "NEW/x.md");
        assert!(store.locator_for(Path::new("../x.md")).is_err());
        assert!(store.locator_for(Path::new("/elsewhere/x.md")).is_err());
    }

    #[tokio::test]
    async fn test_locator_cannot_escape_root() {
        let (_dir, store) = store();
        assert!(matches!(
            store.write("../escape.md", "x").await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }
}
