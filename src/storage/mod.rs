//! Content storage for uploaded files and job logs.
//!
//! Catalog metadata lives in the managers; the bytes behind a file entry
//! live in a [`ContentStore`], addressed by a relative path such as
//! `study1/data/reads.sam`.
//!
//! # Example
//!
//! ```no_run
//! use catalogr::storage::{ContentStore, LocalContentStore};
//! use std::path::PathBuf;
//!
//! let store = LocalContentStore::new(PathBuf::from("./data"));
//! ```

mod local;
pub mod text;

pub use local::LocalContentStore;
pub use text::FileContent;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Metadata about stored content
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub uri: String,
    pub size: u64,
}

/// Storage backend trait for file contents
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Check if content exists at a path
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Read the whole content at a path
    async fn read_bytes(&self, path: &str) -> Result<Bytes>;

    /// Store content, replacing anything already at the path
    async fn write(&self, path: &str, content: Bytes) -> Result<FileInfo>;

    /// Remove content
    async fn delete(&self, path: &str) -> Result<()>;

    /// Location reported to clients
    fn uri(&self, path: &str) -> String;
}
