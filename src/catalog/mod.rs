//! Manager abstraction behind the web services.
//!
//! Handlers never touch catalog data directly: each request resolves to
//! exactly one call on one of the managers below. Any backend can be
//! plugged in by implementing [`Catalog`]; [`MemoryCatalog`] is the
//! in-process implementation used by the server binary and the tests.

pub mod memory;

pub use memory::MemoryCatalog;

use crate::Result;
use crate::types::{
    AclUpdate, AnnotationAction, DataResult, LogType, Query, QueryOptions, ResourceKind,
    TextWindow, VariableSetAction,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

/// Operations shared by every catalog entity.
///
/// `study` is the study positional parameter (ID or FQN). It is ignored by
/// resources that do not live inside a study (projects, studies and
/// notifications).
#[async_trait]
pub trait EntityManager: Send + Sync {
    async fn create(
        &self,
        study: Option<&str>,
        params: Value,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult>;

    async fn info(
        &self,
        study: Option<&str>,
        ids: &[String],
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult>;

    async fn search(
        &self,
        study: Option<&str>,
        query: &Query,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult>;

    async fn distinct(
        &self,
        study: Option<&str>,
        field: &str,
        query: &Query,
        token: &str,
    ) -> Result<DataResult>;

    /// Aggregate matching entities over the comma-separated fields in `facet`.
    async fn facet(
        &self,
        study: Option<&str>,
        query: &Query,
        facet: &str,
        token: &str,
    ) -> Result<DataResult>;

    async fn update(
        &self,
        study: Option<&str>,
        ids: &[String],
        params: Value,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult>;

    async fn delete(
        &self,
        study: Option<&str>,
        ids: &[String],
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult>;

    async fn acl(
        &self,
        study: Option<&str>,
        ids: &[String],
        member: Option<&str>,
        token: &str,
    ) -> Result<DataResult>;

    async fn update_acl(
        &self,
        study: Option<&str>,
        ids: &[String],
        members: &[String],
        update: &AclUpdate,
        token: &str,
    ) -> Result<DataResult>;

    /// Modify the annotations of one annotation set of one entity.
    async fn update_annotations(
        &self,
        study: Option<&str>,
        id: &str,
        change: AnnotationChange,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult>;
}

/// Annotation set modification requested on an annotable entity.
#[derive(Debug, Clone)]
pub struct AnnotationChange {
    pub annotation_set: String,
    /// Variable set used when the annotation set does not exist yet.
    pub variable_set: Option<String>,
    pub action: AnnotationAction,
    pub annotations: Map<String, Value>,
}

#[async_trait]
pub trait UserManager: Send + Sync {
    /// Returns a result holding the session `token`.
    async fn login(&self, user: &str, password: &str) -> Result<DataResult>;

    async fn create(&self, params: Value, token: &str) -> Result<DataResult>;

    async fn info(&self, ids: &[String], options: &QueryOptions, token: &str)
    -> Result<DataResult>;

    async fn change_password(
        &self,
        user: &str,
        password: &str,
        new_password: &str,
    ) -> Result<DataResult>;
}

#[async_trait]
pub trait StudyManager: Send + Sync {
    async fn variable_sets(
        &self,
        study: &str,
        variable_set: Option<&str>,
        token: &str,
    ) -> Result<DataResult>;

    async fn update_variable_sets(
        &self,
        study: &str,
        action: VariableSetAction,
        params: Value,
        token: &str,
    ) -> Result<DataResult>;
}

/// A file received through the upload endpoint.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    /// Directory inside the study, e.g. `data/raw`.
    pub path: String,
    pub content: Bytes,
    pub format: Option<String>,
    pub bioformat: Option<String>,
    pub description: Option<String>,
}

/// Raw file content returned by the download endpoint.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub name: String,
    pub content: Bytes,
}

#[async_trait]
pub trait FileManager: Send + Sync {
    async fn upload(
        &self,
        study: Option<&str>,
        upload: FileUpload,
        token: &str,
    ) -> Result<DataResult>;

    async fn download(&self, study: Option<&str>, file: &str, token: &str)
    -> Result<FileDownload>;

    async fn content(
        &self,
        study: Option<&str>,
        file: &str,
        window: TextWindow,
        token: &str,
    ) -> Result<DataResult>;

    async fn grep(
        &self,
        study: Option<&str>,
        file: &str,
        pattern: &str,
        ignore_case: bool,
        max_count: usize,
        token: &str,
    ) -> Result<DataResult>;
}

#[async_trait]
pub trait JobManager: Send + Sync {
    async fn log(
        &self,
        study: Option<&str>,
        job: &str,
        log_type: LogType,
        window: TextWindow,
        token: &str,
    ) -> Result<DataResult>;

    /// Status counts and the most recent jobs.
    async fn top(
        &self,
        study: Option<&str>,
        query: &Query,
        limit: usize,
        token: &str,
    ) -> Result<DataResult>;
}

/// Entry point to every manager.
pub trait Catalog: Send + Sync {
    fn entities(&self, kind: ResourceKind) -> &dyn EntityManager;

    fn users(&self) -> &dyn UserManager;

    fn studies(&self) -> &dyn StudyManager;

    fn files(&self) -> &dyn FileManager;

    fn jobs(&self) -> &dyn JobManager;
}
