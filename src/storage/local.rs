use super::{ContentStore, FileInfo};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

pub struct LocalContentStore {
    data_dir: PathBuf,
}

impl LocalContentStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Resolve a relative content path inside the data directory.
    fn make_file_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(Error::InvalidParameter(format!("Invalid path '{}'", path)));
        }
        Ok(self.data_dir.join(relative))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        let path = self.make_file_path(path)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn read_bytes(&self, path: &str) -> Result<Bytes> {
        let file_path = self.make_file_path(path)?;
        fs::read(&file_path)
            .await
            .map(Bytes::from)
            .map_err(|_| Error::NotFound(format!("Content '{}' not found", path)))
    }

    async fn write(&self, path: &str, content: Bytes) -> Result<FileInfo> {
        let file_path = self.make_file_path(path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&file_path, &content).await?;
        tracing::debug!("stored {} bytes at {:?}", content.len(), file_path);

        Ok(FileInfo {
            path: path.to_string(),
            uri: self.uri(path),
            size: content.len() as u64,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file_path = self.make_file_path(path)?;
        match fs::remove_file(&file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn uri(&self, path: &str) -> String {
        format!(
            "file://{}",
            self.data_dir.join(path.trim_start_matches('/')).display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path().to_path_buf());

        let info = store
            .write("study1/data/a.txt", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();
        assert_eq!(info.size, 10);
        assert!(store.exists("study1/data/a.txt").await.unwrap());

        let bytes = store.read_bytes("study1/data/a.txt").await.unwrap();
        assert_eq!(&bytes[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path().to_path_buf());
        assert!(store.read_bytes("../etc/passwd").await.is_err());
        assert!(store.write("a/../../b", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path().to_path_buf());
        assert!(!store.exists("nope.txt").await.unwrap());
        assert!(matches!(
            store.read_bytes("nope.txt").await,
            Err(Error::NotFound(_))
        ));
        store.delete("nope.txt").await.unwrap();
    }
}
