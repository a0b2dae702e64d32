use super::state::{Caller, str_field};
use super::{MemoryCatalog, elapsed, filter, now};
use crate::catalog::{FileDownload, FileManager, FileUpload};
use crate::storage::text;
use crate::types::{DataResult, Permission, QueryOptions, ResourceKind, TextWindow};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use regex::RegexBuilder;
use serde_json::{Value, json};
use std::time::Instant;

/// Hidden field pointing at the stored content of a file.
pub(super) const CONTENT_PATH: &str = "_contentPath";

/// A file entry resolved for content access.
struct ContentRef {
    id: String,
    name: String,
    path: String,
}

impl MemoryCatalog {
    /// Locate a file, check `permission` and return where its bytes live.
    fn content_ref(
        &self,
        caller: &Caller,
        study: Option<&str>,
        file: &str,
        permission: Permission,
    ) -> Result<ContentRef> {
        let state = self.inner.state.read();
        let study = state.resolve_study(caller, study, Permission::View)?;
        let (_, doc) = state.find(ResourceKind::File, Some(&study), file)?;
        state.require(caller, ResourceKind::File, doc, permission)?;

        let path = doc
            .get(CONTENT_PATH)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::NotFound(format!("File '{}' has no content", file)))?;
        Ok(ContentRef {
            id: str_field(doc, "id").to_string(),
            name: str_field(doc, "name").to_string(),
            path: path.to_string(),
        })
    }

    async fn read_content(
        &self,
        study: Option<&str>,
        file: &str,
        permission: Permission,
        token: &str,
    ) -> Result<(ContentRef, Bytes)> {
        let caller = self.inner.authenticate(token)?;
        let content = self.content_ref(&caller, study, file, permission)?;
        let bytes = self.inner.content.read_bytes(&content.path).await?;
        Ok((content, bytes))
    }
}

fn normalize_dir(path: &str) -> Result<String> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    if parts.iter().any(|p| *p == ".." || p.contains(',')) {
        return Err(Error::InvalidParameter(format!("Invalid path '{}'", path)));
    }
    Ok(parts.join("/"))
}

#[async_trait]
impl FileManager for MemoryCatalog {
    async fn upload(
        &self,
        study: Option<&str>,
        upload: FileUpload,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let file_name = upload.file_name.trim();
        if file_name.is_empty() {
            return Err(Error::missing("fileName"));
        }
        if file_name.contains('/') || file_name.contains(',') || file_name == ".." {
            return Err(Error::InvalidParameter(format!(
                "Invalid file name '{}'",
                file_name
            )));
        }
        let dir = normalize_dir(&upload.path)?;
        let relative = if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", dir, file_name)
        };
        let id = relative.replace('/', ":");

        let (study, content_path) = {
            let state = self.inner.state.read();
            let study = state.resolve_study(&caller, study, Permission::Write)?;
            if state.find_in_study(ResourceKind::File, &study.id, &id).is_some() {
                return Err(Error::AlreadyExists(format!("File '{}' already exists", id)));
            }
            let content_path = format!("{}/{}", study.id, relative);
            (study, content_path)
        };

        let info = self.inner.content.write(&content_path, upload.content).await?;

        let mut state = self.inner.state.write();
        if state.find_in_study(ResourceKind::File, &study.id, &id).is_some() {
            return Err(Error::AlreadyExists(format!("File '{}' already exists", id)));
        }
        let uid = state.next_uid();
        let timestamp = now();
        let doc = json!({
            "id": id,
            "uid": uid,
            "uuid": uuid::Uuid::new_v4().to_string(),
            "name": file_name,
            "path": relative,
            "uri": info.uri,
            "size": info.size,
            "type": "FILE",
            "format": upload.format.unwrap_or_else(|| "UNKNOWN".to_string()),
            "bioformat": upload.bioformat.unwrap_or_else(|| "NONE".to_string()),
            "description": upload.description.unwrap_or_default(),
            "study": study.id,
            "creationDate": timestamp,
            "modificationDate": timestamp,
            "internal": {"status": {"id": "READY", "date": timestamp}},
        });
        let Value::Object(mut doc) = doc else {
            return Err(Error::Internal("failed to build file entry".to_string()));
        };
        doc.insert(CONTENT_PATH.to_string(), Value::from(content_path));
        let created = filter::project(&doc, &QueryOptions::new());
        state.collection_mut(ResourceKind::File).insert(uid, doc);

        tracing::info!(
            "file '{}' ({} bytes) uploaded to study '{}' by '{}'",
            id,
            info.size,
            study.fqn,
            caller.user
        );
        let mut result = DataResult::new("File", vec![created])
            .with_matches(1)
            .with_time(elapsed(started));
        result.num_inserted = 1;
        Ok(result)
    }

    async fn download(
        &self,
        study: Option<&str>,
        file: &str,
        token: &str,
    ) -> Result<FileDownload> {
        let (content, bytes) = self
            .read_content(study, file, Permission::Download, token)
            .await?;
        tracing::debug!("downloading file '{}' ({} bytes)", content.id, bytes.len());
        Ok(FileDownload {
            name: content.name,
            content: bytes,
        })
    }

    async fn content(
        &self,
        study: Option<&str>,
        file: &str,
        window: TextWindow,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let (content, bytes) = self
            .read_content(study, file, Permission::ViewContent, token)
            .await?;
        let lines = match window {
            TextWindow::Head { offset, lines } => text::head(&content.id, &bytes, offset, lines),
            TextWindow::Tail { lines } => text::tail(&content.id, &bytes, lines),
        };
        let value = serde_json::to_value(lines)
            .map_err(|e| Error::Internal(format!("failed to serialize content: {}", e)))?;
        Ok(DataResult::new("FileContent", vec![value])
            .with_matches(1)
            .with_time(elapsed(started)))
    }

    async fn grep(
        &self,
        study: Option<&str>,
        file: &str,
        pattern: &str,
        ignore_case: bool,
        max_count: usize,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        if pattern.is_empty() {
            return Err(Error::missing("pattern"));
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| Error::InvalidParameter(format!("Invalid pattern '{}': {}", pattern, e)))?;

        let (content, bytes) = self
            .read_content(study, file, Permission::ViewContent, token)
            .await?;
        let matched = text::grep(&content.id, &bytes, &regex, max_count);
        let value = serde_json::to_value(matched)
            .map_err(|e| Error::Internal(format!("failed to serialize content: {}", e)))?;
        Ok(DataResult::new("FileContent", vec![value])
            .with_matches(1)
            .with_time(elapsed(started)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dir() {
        assert_eq!(normalize_dir("/data//raw/").unwrap(), "data/raw");
        assert_eq!(normalize_dir("").unwrap(), "");
        assert_eq!(normalize_dir("./a").unwrap(), "a");
        assert!(normalize_dir("a/../b").is_err());
    }
}
