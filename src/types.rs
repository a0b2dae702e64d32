use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use crate::Error;

/// Filter criteria supplied by the caller, passed verbatim to a manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query(pub Map<String, Value>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl Deref for Query {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Query {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Response-shaping directives: projection, pagination, sorting, facets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions(pub Map<String, Value>);

impl QueryOptions {
    pub const INCLUDE: &'static str = "include";
    pub const EXCLUDE: &'static str = "exclude";
    pub const LIMIT: &'static str = "limit";
    pub const SKIP: &'static str = "skip";
    pub const COUNT: &'static str = "count";
    pub const SORT: &'static str = "sort";
    pub const ORDER: &'static str = "order";
    pub const FACET: &'static str = "facet";
    pub const INCLUDE_RESULT: &'static str = "includeResult";
    pub const FLATTEN_ANNOTATIONS: &'static str = "flattenAnnotations";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.0
            .get(Self::LIMIT)
            .and_then(Value::as_u64)
            .map(|l| l as usize)
    }

    pub fn skip(&self) -> usize {
        self.0.get(Self::SKIP).and_then(Value::as_u64).unwrap_or(0) as usize
    }

    pub fn count(&self) -> bool {
        self.get_bool(Self::COUNT)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn include(&self) -> Vec<String> {
        self.get_list(Self::INCLUDE)
    }

    pub fn exclude(&self) -> Vec<String> {
        self.get_list(Self::EXCLUDE)
    }

    pub fn sort(&self) -> Option<&str> {
        self.0.get(Self::SORT).and_then(Value::as_str)
    }

    pub fn descending(&self) -> bool {
        self.0
            .get(Self::ORDER)
            .and_then(Value::as_str)
            .is_some_and(|o| o.eq_ignore_ascii_case("desc"))
    }
}

impl Deref for QueryOptions {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for QueryOptions {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub r#type: EventType,
    pub name: String,
    pub message: String,
}

impl Event {
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            r#type: EventType::Error,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            r#type: EventType::Warning,
            name: name.into(),
            message: message.into(),
        }
    }
}

/// One page of results returned by a manager call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResult {
    pub time: u64,
    pub events: Vec<Event>,
    pub num_results: usize,
    pub results: Vec<Value>,
    pub result_type: String,
    pub num_matches: i64,
    pub num_inserted: u64,
    pub num_updated: u64,
    pub num_deleted: u64,
    pub num_errors: u64,
    pub attributes: Map<String, Value>,
}

impl DataResult {
    pub fn new(result_type: impl Into<String>, results: Vec<Value>) -> Self {
        Self {
            num_results: results.len(),
            num_matches: -1,
            results,
            result_type: result_type.into(),
            ..Default::default()
        }
    }

    pub fn empty(result_type: impl Into<String>) -> Self {
        Self::new(result_type, Vec::new())
    }

    pub fn with_matches(mut self, num_matches: usize) -> Self {
        self.num_matches = num_matches as i64;
        self
    }

    pub fn with_time(mut self, millis: u64) -> Self {
        self.time = millis;
        self
    }
}

/// Envelope returned by every web service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestResponse {
    pub api_version: String,
    pub time: u64,
    pub params: BTreeMap<String, String>,
    pub events: Vec<Event>,
    pub responses: Vec<DataResult>,
}

/// Catalog resources served by the generic handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Project,
    Study,
    Sample,
    Individual,
    Family,
    Cohort,
    File,
    Job,
    Panel,
    Workflow,
    ExternalTool,
    Notification,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 12] = [
        ResourceKind::Project,
        ResourceKind::Study,
        ResourceKind::Sample,
        ResourceKind::Individual,
        ResourceKind::Family,
        ResourceKind::Cohort,
        ResourceKind::File,
        ResourceKind::Job,
        ResourceKind::Panel,
        ResourceKind::Workflow,
        ResourceKind::ExternalTool,
        ResourceKind::Notification,
    ];

    /// URL path segment, e.g. `samples`.
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Project => "projects",
            ResourceKind::Study => "studies",
            ResourceKind::Sample => "samples",
            ResourceKind::Individual => "individuals",
            ResourceKind::Family => "families",
            ResourceKind::Cohort => "cohorts",
            ResourceKind::File => "files",
            ResourceKind::Job => "jobs",
            ResourceKind::Panel => "panels",
            ResourceKind::Workflow => "workflows",
            ResourceKind::ExternalTool => "externalTools",
            ResourceKind::Notification => "notifications",
        }
    }

    /// Parameter name carrying IDs in ACL update bodies, e.g. `sample`.
    pub fn param(&self) -> &'static str {
        match self {
            ResourceKind::Project => "project",
            ResourceKind::Study => "study",
            ResourceKind::Sample => "sample",
            ResourceKind::Individual => "individual",
            ResourceKind::Family => "family",
            ResourceKind::Cohort => "cohort",
            ResourceKind::File => "file",
            ResourceKind::Job => "job",
            ResourceKind::Panel => "panel",
            ResourceKind::Workflow => "workflow",
            ResourceKind::ExternalTool => "externalTool",
            ResourceKind::Notification => "notification",
        }
    }

    pub fn result_type(&self) -> &'static str {
        match self {
            ResourceKind::Project => "Project",
            ResourceKind::Study => "Study",
            ResourceKind::Sample => "Sample",
            ResourceKind::Individual => "Individual",
            ResourceKind::Family => "Family",
            ResourceKind::Cohort => "Cohort",
            ResourceKind::File => "File",
            ResourceKind::Job => "Job",
            ResourceKind::Panel => "Panel",
            ResourceKind::Workflow => "Workflow",
            ResourceKind::ExternalTool => "ExternalTool",
            ResourceKind::Notification => "Notification",
        }
    }

    pub fn is_study_scoped(&self) -> bool {
        !matches!(
            self,
            ResourceKind::Project | ResourceKind::Study | ResourceKind::Notification
        )
    }

    pub fn is_annotable(&self) -> bool {
        matches!(
            self,
            ResourceKind::Sample
                | ResourceKind::Individual
                | ResourceKind::Family
                | ResourceKind::Cohort
        )
    }

    pub fn has_acl(&self) -> bool {
        !matches!(self, ResourceKind::Project | ResourceKind::Notification)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    View,
    Write,
    Delete,
    WriteAnnotations,
    ViewContent,
    Download,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "VIEW",
            Permission::Write => "WRITE",
            Permission::Delete => "DELETE",
            Permission::WriteAnnotations => "WRITE_ANNOTATIONS",
            Permission::ViewContent => "VIEW_CONTENT",
            Permission::Download => "DOWNLOAD",
        }
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VIEW" => Ok(Permission::View),
            "WRITE" => Ok(Permission::Write),
            "DELETE" => Ok(Permission::Delete),
            "WRITE_ANNOTATIONS" => Ok(Permission::WriteAnnotations),
            "VIEW_CONTENT" => Ok(Permission::ViewContent),
            "DOWNLOAD" => Ok(Permission::Download),
            other => Err(Error::InvalidParameter(format!(
                "Unknown permission '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AclAction {
    #[default]
    Set,
    Add,
    Remove,
    Reset,
}

/// Permission change applied to a set of members.
#[derive(Debug, Clone, PartialEq)]
pub struct AclUpdate {
    pub permissions: Vec<Permission>,
    pub action: AclAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnnotationAction {
    #[default]
    Add,
    Set,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum VariableSetAction {
    #[default]
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    #[default]
    Stdout,
    Stderr,
}

/// Which end of a text file to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextWindow {
    Head { offset: usize, lines: usize },
    Tail { lines: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_options_accessors() {
        let mut options = QueryOptions::new();
        options
            .put(QueryOptions::LIMIT, 25)
            .put(QueryOptions::SKIP, 5)
            .put(QueryOptions::INCLUDE, json!(["id", "name"]))
            .put(QueryOptions::EXCLUDE, "attributes, ,status")
            .put(QueryOptions::ORDER, "desc");

        assert_eq!(options.limit(), Some(25));
        assert_eq!(options.skip(), 5);
        assert_eq!(options.include(), vec!["id", "name"]);
        assert_eq!(options.exclude(), vec!["attributes", "status"]);
        assert!(options.descending());
        assert!(!options.count());
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!("view".parse::<Permission>().unwrap(), Permission::View);
        assert_eq!(
            " WRITE_ANNOTATIONS".parse::<Permission>().unwrap(),
            Permission::WriteAnnotations
        );
        assert!("ADMIN".parse::<Permission>().is_err());
    }

    #[test]
    fn test_data_result_serializes_camel_case() {
        let result = DataResult::new("Sample", vec![json!({"id": "s1"})]).with_matches(1);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["numResults"], 1);
        assert_eq!(value["numMatches"], 1);
        assert_eq!(value["resultType"], "Sample");
    }

    #[test]
    fn test_resource_scoping() {
        assert!(ResourceKind::Sample.is_study_scoped());
        assert!(!ResourceKind::Project.is_study_scoped());
        assert!(ResourceKind::Cohort.is_annotable());
        assert!(!ResourceKind::File.is_annotable());
        assert!(!ResourceKind::Notification.has_acl());
    }
}
