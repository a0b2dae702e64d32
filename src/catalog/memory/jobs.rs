use super::state::str_field;
use super::{MemoryCatalog, elapsed, filter};
use crate::catalog::JobManager;
use crate::storage::text;
use crate::types::{DataResult, LogType, Permission, Query, QueryOptions, ResourceKind, TextWindow};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Instant;

/// Statuses always reported by `top`, even when no job is in them.
const JOB_STATUSES: &[&str] = &["PENDING", "QUEUED", "RUNNING", "DONE", "ERROR", "ABORTED"];

/// Default location of a job log inside the content store.
fn default_log_path(study: &str, job: &str, log_type: LogType) -> String {
    let extension = match log_type {
        LogType::Stdout => "log",
        LogType::Stderr => "err",
    };
    format!("jobs/{}/{}/{}.{}", study, job, job, extension)
}

/// Fields naming where a job writes its logs.
const LOG_FIELDS: &[&str] = &["stdout", "stderr"];

/// A log path must stay inside the log directory of the job's study.
fn check_log_path(study: &str, field: &str, path: &str) -> Result<()> {
    let dir = format!("jobs/{}/", study);
    let inside = path.starts_with(&dir)
        && path
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."));
    if inside {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "'{}' must be a path under '{}', found '{}'",
            field, dir, path
        )))
    }
}

/// Validate the log locations set on a job document or update.
pub(super) fn check_log_paths(study: &str, doc: &Map<String, Value>) -> Result<()> {
    for field in LOG_FIELDS {
        match doc.get(*field) {
            None | Some(Value::Null) => {}
            Some(Value::String(path)) => check_log_path(study, field, path)?,
            Some(_) => {
                return Err(Error::InvalidParameter(format!(
                    "'{}' must be a string",
                    field
                )));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl JobManager for MemoryCatalog {
    async fn log(
        &self,
        study: Option<&str>,
        job: &str,
        log_type: LogType,
        window: TextWindow,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let (job_id, path) = {
            let state = self.inner.state.read();
            let study = state.resolve_study(&caller, study, Permission::View)?;
            let (_, doc) = state.find(ResourceKind::Job, Some(&study), job)?;
            state.require(&caller, ResourceKind::Job, doc, Permission::View)?;

            let field = match log_type {
                LogType::Stdout => "stdout",
                LogType::Stderr => "stderr",
            };
            let job_id = str_field(doc, "id").to_string();
            let path = match str_field(doc, field) {
                "" => default_log_path(&study.id, &job_id, log_type),
                path => {
                    check_log_path(&study.id, field, path)?;
                    path.to_string()
                }
            };
            (job_id, path)
        };

        if !self.inner.content.exists(&path).await? {
            return Err(Error::NotFound(format!(
                "Log file of job '{}' not found",
                job_id
            )));
        }
        let bytes = self.inner.content.read_bytes(&path).await?;
        let content = match window {
            TextWindow::Head { offset, lines } => text::head(&job_id, &bytes, offset, lines),
            TextWindow::Tail { lines } => text::tail(&job_id, &bytes, lines),
        };
        let value = serde_json::to_value(content)
            .map_err(|e| Error::Internal(format!("failed to serialize log: {}", e)))?;
        Ok(DataResult::new("FileContent", vec![value])
            .with_matches(1)
            .with_time(elapsed(started)))
    }

    async fn top(
        &self,
        study: Option<&str>,
        query: &Query,
        limit: usize,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();
        let study = state.resolve_study(&caller, study, Permission::View)?;

        let mut jobs: Vec<_> = state
            .collection(ResourceKind::Job)
            .filter(|(_, doc)| str_field(doc, "study") == study.id)
            .filter(|(_, doc)| state.allows(&caller, ResourceKind::Job, doc, Permission::View))
            .filter(|(_, doc)| filter::matches(doc, query))
            .collect();

        let mut stats: Map<String, Value> = JOB_STATUSES
            .iter()
            .map(|s| (s.to_string(), Value::from(0)))
            .collect();
        for (_, doc) in &jobs {
            let status = filter::get_path(doc, "internal.status.id")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN");
            let count = stats.get(status).and_then(Value::as_u64).unwrap_or(0);
            stats.insert(status.to_string(), Value::from(count + 1));
        }

        jobs.sort_by(|(a_uid, a), (b_uid, b)| {
            str_field(b, "creationDate")
                .cmp(str_field(a, "creationDate"))
                .then_with(|| b_uid.cmp(a_uid))
        });
        let recent: Vec<Value> = jobs
            .into_iter()
            .take(limit)
            .map(|(_, doc)| filter::project(doc, &QueryOptions::new()))
            .collect();

        Ok(DataResult::new("JobTop", vec![json!({"stats": stats, "jobs": recent})])
            .with_matches(1)
            .with_time(elapsed(started)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_paths_stay_in_study() {
        let ok = json!({"stdout": "jobs/s1/job1/out.txt", "stderr": null});
        assert!(check_log_paths("s1", ok.as_object().unwrap()).is_ok());

        for path in ["s2/secret.txt", "jobs/s2/job1.log", "jobs/s1/../../s2/a.txt", "jobs/s1/"] {
            let doc = json!({"stdout": path});
            assert!(
                check_log_paths("s1", doc.as_object().unwrap()).is_err(),
                "{} accepted",
                path
            );
        }
        let doc = json!({"stderr": 3});
        assert!(check_log_paths("s1", doc.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_default_log_path() {
        assert_eq!(
            default_log_path("s1", "job1", LogType::Stdout),
            "jobs/s1/job1/job1.log"
        );
        assert_eq!(
            default_log_path("s1", "job1", LogType::Stderr),
            "jobs/s1/job1/job1.err"
        );
    }
}
