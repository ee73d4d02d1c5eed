//! Directory-backed object store

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use super::{ObjectEntry, ObjectStore};
use crate::{Error, Result};

/// Mirrors the bucket layout under `<root>/<bucket>/`
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Store rooted at `root/bucket`
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            dir: root.as_ref().join(bucket),
        }
    }

    /// Resolve a bucket path, refusing anything that escapes the bucket dir
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Storage(format!("invalid object path: {path}")));
        }
        Ok(self.dir.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn download(&self, path: &str) -> Result<Bytes> {
        let file = self.resolve(path)?;
        match fs::read(&file).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, folder: &str, limit: usize) -> Result<Vec<ObjectEntry>> {
        let dir = if folder.trim_matches('/').is_empty() {
            self.dir.clone()
        } else {
            self.resolve(folder.trim_matches('/'))?
        };

        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                entries.push(ObjectEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                });
            }
        }
        entries.sort_by(|a, b| b.name.cmp(&a.name));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn upload(&self, path: &str, data: Bytes, _content_type: &str, upsert: bool) -> Result<()> {
        let file = self.resolve(path)?;
        if !upsert && fs::try_exists(&file).await? {
            return Err(Error::Storage(format!("object already exists: {path}")));
        }
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&file, &data).await?;
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            let file = self.resolve(path)?;
            match fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
