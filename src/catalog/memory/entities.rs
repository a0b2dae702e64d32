use super::filter::{self, HIDDEN_PREFIX};
use super::state::{
    ACL_FIELD, ANY_MEMBER, Caller, Document, State, StudyRef, acl_entries, member_permissions,
    str_field,
};
use super::{Inner, annotations, elapsed, jobs, now};
use crate::catalog::{AnnotationChange, EntityManager};
use crate::params::split_list;
use crate::types::{
    AclAction, AclUpdate, DataResult, Permission, Query, QueryOptions, ResourceKind,
};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;

/// Fields owned by the catalog that callers can never set.
const IMMUTABLE_FIELDS: &[&str] = &[
    "uid",
    "uuid",
    "study",
    "creationDate",
    "modificationDate",
    "fqn",
    "owner",
];

/// Generic manager for one resource kind.
pub struct MemoryEntityManager {
    kind: ResourceKind,
    inner: Arc<Inner>,
}

impl MemoryEntityManager {
    pub(crate) fn new(kind: ResourceKind, inner: Arc<Inner>) -> Self {
        Self { kind, inner }
    }

    /// Resolve the study when the resource lives inside one.
    fn scope(
        &self,
        state: &State,
        caller: &Caller,
        study: Option<&str>,
        permission: Permission,
    ) -> Result<Option<StudyRef>> {
        if self.kind.is_study_scoped() {
            state
                .resolve_study(caller, study, permission)
                .map(Some)
        } else {
            Ok(None)
        }
    }

    fn in_scope(&self, doc: &Document, study: Option<&StudyRef>) -> bool {
        study.is_none_or(|s| str_field(doc, "study") == s.id)
    }

    /// Documents visible to the caller that match `query`.
    fn visible<'a>(
        &self,
        state: &'a State,
        caller: &Caller,
        study: Option<&StudyRef>,
        query: &Query,
    ) -> Vec<&'a Document> {
        state
            .collection(self.kind)
            .map(|(_, doc)| doc)
            .filter(|doc| self.in_scope(doc, study))
            .filter(|doc| state.allows(caller, self.kind, doc, Permission::View))
            .filter(|doc| filter::matches(doc, query))
            .collect()
    }

    /// Whether the caller may read and change permissions of `doc`.
    fn can_manage(&self, caller: &Caller, study: Option<&StudyRef>, doc: &Document) -> bool {
        caller.admin
            || match self.kind {
                ResourceKind::Study => str_field(doc, "owner") == caller.user,
                _ => study.is_some_and(|s| s.owner == caller.user),
            }
    }

    fn result(&self, results: Vec<Value>, started: Instant) -> DataResult {
        let matches = results.len();
        DataResult::new(self.kind.result_type(), results)
            .with_matches(matches)
            .with_time(elapsed(started))
    }

    /// Drop the modified documents when the caller asked not to get them back.
    fn write_result(&self, mut result: DataResult, options: &QueryOptions) -> DataResult {
        if options.0.get(QueryOptions::INCLUDE_RESULT) == Some(&Value::Bool(false)) {
            result.results.clear();
            result.num_results = 0;
        }
        result
    }

    /// Fill in the kind-specific fields of a new document.
    fn prepare_new(
        &self,
        state: &State,
        caller: &Caller,
        study: Option<&StudyRef>,
        id: &str,
        doc: &mut Document,
    ) -> Result<()> {
        match self.kind {
            ResourceKind::Project => {
                doc.insert("owner".into(), Value::from(caller.user.as_str()));
                doc.insert("fqn".into(), Value::from(format!("{}@{}", caller.user, id)));
            }
            ResourceKind::Study => {
                let reference = str_field(doc, "project");
                if reference.is_empty() {
                    return Err(Error::missing("project"));
                }
                let (_, project) = state
                    .find_global(ResourceKind::Project, reference)
                    .ok_or_else(|| Error::NotFound(format!("Project '{}' not found", reference)))?;
                state.require(caller, ResourceKind::Project, project, Permission::Write)?;

                let owner = str_field(project, "owner").to_string();
                let project_id = str_field(project, "id").to_string();
                doc.insert(
                    "fqn".into(),
                    Value::from(format!("{}@{}:{}", owner, project_id, id)),
                );
                doc.insert("owner".into(), Value::from(owner));
                doc.insert("project".into(), Value::from(project_id));
                doc.entry("variableSets")
                    .or_insert_with(|| Value::Array(Vec::new()));
            }
            ResourceKind::Notification => {
                let receiver = str_field(doc, "receiver");
                if receiver.is_empty() {
                    return Err(Error::missing("receiver"));
                }
                if !state.users.contains_key(receiver) {
                    return Err(Error::NotFound(format!("User '{}' not found", receiver)));
                }
                doc.insert("sender".into(), Value::from(caller.user.as_str()));
                doc.insert("visited".into(), Value::Bool(false));
            }
            ResourceKind::File => {
                let name = id.rsplit(':').next().unwrap_or(id).to_string();
                doc.entry("name").or_insert_with(|| Value::from(name));
                doc.entry("path")
                    .or_insert_with(|| Value::from(id.replace(':', "/")));
                doc.entry("type").or_insert_with(|| Value::from("FILE"));
            }
            ResourceKind::Job => {
                if let Some(study) = study {
                    jobs::check_log_paths(&study.id, doc)?;
                }
            }
            kind if kind.is_annotable() => {
                if let Some(study) = study {
                    annotations::validate_all(doc, &state.variable_sets(&study.id))?;
                }
            }
            _ => {}
        }

        let status = if self.kind == ResourceKind::Job {
            "PENDING"
        } else {
            "READY"
        };
        let internal = doc
            .entry("internal")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(internal) = internal {
            internal
                .entry("status")
                .or_insert_with(|| json!({"id": status, "date": now()}));
        }
        Ok(())
    }
}

/// Reject parameters that would overwrite catalog-owned fields.
fn check_mutable(params: &Map<String, Value>, kind: ResourceKind) -> Result<()> {
    for key in params.keys() {
        let forbidden = IMMUTABLE_FIELDS.contains(&key.as_str())
            || key.starts_with(HIDDEN_PREFIX)
            || key == "id"
            || (kind == ResourceKind::Study && matches!(key.as_str(), "project" | "variableSets"))
            || (kind == ResourceKind::Notification && matches!(key.as_str(), "receiver" | "sender"));
        if forbidden {
            return Err(Error::InvalidParameter(format!(
                "Parameter '{}' cannot be updated",
                key
            )));
        }
    }
    Ok(())
}

fn into_object(params: Value) -> Result<Map<String, Value>> {
    match params {
        Value::Object(map) => Ok(map),
        _ => Err(Error::InvalidParameter(
            "Expected a JSON object as body".to_string(),
        )),
    }
}

#[async_trait]
impl EntityManager for MemoryEntityManager {
    async fn create(
        &self,
        study: Option<&str>,
        params: Value,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let mut params = into_object(params)?;
        params.retain(|key, _| {
            !key.starts_with(HIDDEN_PREFIX) && !IMMUTABLE_FIELDS.contains(&key.as_str())
        });

        if self.kind == ResourceKind::File && !params.contains_key("id") {
            if let Some(path) = params.get("path").and_then(Value::as_str) {
                let id = path.trim_matches('/').replace('/', ":");
                params.insert("id".into(), Value::from(id));
            }
        }
        let id = match params.get("id").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ if self.kind == ResourceKind::Notification => uuid::Uuid::new_v4().to_string(),
            _ => return Err(Error::missing("id")),
        };
        if id.contains(',') {
            return Err(Error::InvalidParameter(format!(
                "Invalid id '{}': commas are not allowed",
                id
            )));
        }

        let mut state = self.inner.state.write();
        let study = self.scope(&state, &caller, study, Permission::Write)?;
        if state.find(self.kind, study.as_ref(), &id).is_ok() {
            return Err(Error::AlreadyExists(format!(
                "{} '{}' already exists",
                self.kind.result_type(),
                id
            )));
        }

        self.prepare_new(&state, &caller, study.as_ref(), &id, &mut params)?;

        let uid = state.next_uid();
        let timestamp = now();
        params.insert("id".into(), Value::from(id.as_str()));
        params.insert("uid".into(), Value::from(uid));
        params.insert("uuid".into(), Value::from(uuid::Uuid::new_v4().to_string()));
        params.insert("creationDate".into(), Value::from(timestamp.as_str()));
        params.insert("modificationDate".into(), Value::from(timestamp));
        if let Some(study) = &study {
            params.insert("study".into(), Value::from(study.id.as_str()));
        }

        let created = filter::project(&params, options);
        state.collection_mut(self.kind).insert(uid, params);
        tracing::info!("{} '{}' created by '{}'", self.kind, id, caller.user);

        let mut result = self.result(vec![created], started);
        result.num_inserted = 1;
        Ok(result)
    }

    async fn info(
        &self,
        study: Option<&str>,
        ids: &[String],
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();
        let study = self.scope(&state, &caller, study, Permission::View)?;

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let (_, doc) = state.find(self.kind, study.as_ref(), id)?;
            state.require(&caller, self.kind, doc, Permission::View)?;
            results.push(filter::project(doc, options));
        }
        Ok(self.result(results, started))
    }

    async fn search(
        &self,
        study: Option<&str>,
        query: &Query,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();
        let study = self.scope(&state, &caller, study, Permission::View)?;

        let mut docs = self.visible(&state, &caller, study.as_ref(), query);
        if let Some(field) = options.sort() {
            filter::sort_docs(&mut docs, field, options.descending());
        }
        let total = docs.len();
        let results: Vec<Value> = docs
            .into_iter()
            .skip(options.skip())
            .take(options.limit().unwrap_or(usize::MAX))
            .map(|doc| filter::project(doc, options))
            .collect();

        let mut result = DataResult::new(self.kind.result_type(), results).with_time(elapsed(started));
        if options.count() {
            result.num_matches = total as i64;
        }
        Ok(result)
    }

    async fn distinct(
        &self,
        study: Option<&str>,
        field: &str,
        query: &Query,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        if field.trim().is_empty() {
            return Err(Error::missing("field"));
        }
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();
        let study = self.scope(&state, &caller, study, Permission::View)?;

        let docs = self.visible(&state, &caller, study.as_ref(), query);
        let values = filter::distinct(docs, field.trim());
        let matches = values.len();
        Ok(DataResult::new("String", values)
            .with_matches(matches)
            .with_time(elapsed(started)))
    }

    async fn facet(
        &self,
        study: Option<&str>,
        query: &Query,
        facet: &str,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let fields = split_list(facet);
        if fields.is_empty() {
            return Err(Error::missing("field"));
        }
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();
        let study = self.scope(&state, &caller, study, Permission::View)?;

        let docs = self.visible(&state, &caller, study.as_ref(), query);
        let facets = filter::facet(&docs, &fields);
        let mut result = DataResult::new("FacetField", facets).with_time(elapsed(started));
        result.num_matches = docs.len() as i64;
        Ok(result)
    }

    async fn update(
        &self,
        study: Option<&str>,
        ids: &[String],
        params: Value,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let params = into_object(params)?;
        if params.is_empty() {
            return Err(Error::InvalidParameter("Nothing to update".to_string()));
        }
        check_mutable(&params, self.kind)?;

        let mut state = self.inner.state.write();
        let study = self.scope(&state, &caller, study, Permission::View)?;
        if let Some(study) = &study {
            if self.kind.is_annotable() {
                annotations::validate_all(&params, &state.variable_sets(&study.id))?;
            }
            if self.kind == ResourceKind::Job {
                jobs::check_log_paths(&study.id, &params)?;
            }
        }

        let mut uids = Vec::with_capacity(ids.len());
        for id in ids {
            let (uid, doc) = state.find(self.kind, study.as_ref(), id)?;
            state.require(&caller, self.kind, doc, Permission::Write)?;
            uids.push(uid);
        }

        let timestamp = now();
        let collection = state.collection_mut(self.kind);
        let mut results = Vec::with_capacity(uids.len());
        for uid in uids {
            if let Some(doc) = collection.get_mut(&uid) {
                for (key, value) in &params {
                    if value.is_null() {
                        doc.remove(key);
                    } else {
                        doc.insert(key.clone(), value.clone());
                    }
                }
                doc.insert("modificationDate".into(), Value::from(timestamp.as_str()));
                results.push(filter::project(doc, options));
            }
        }

        tracing::info!("{} {} entries updated by '{}'", results.len(), self.kind, caller.user);
        let mut result = self.result(results, started);
        result.num_updated = result.num_results as u64;
        Ok(self.write_result(result, options))
    }

    async fn delete(
        &self,
        study: Option<&str>,
        ids: &[String],
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        if self.kind == ResourceKind::Study {
            return Err(Error::not_implemented("Deleting studies"));
        }
        let caller = self.inner.authenticate(token)?;

        let (results, content_paths) = {
            let mut state = self.inner.state.write();
            let study = self.scope(&state, &caller, study, Permission::View)?;

            let mut uids = Vec::with_capacity(ids.len());
            for id in ids {
                let (uid, doc) = state.find(self.kind, study.as_ref(), id)?;
                state.require(&caller, self.kind, doc, Permission::Delete)?;
                if self.kind == ResourceKind::Project {
                    let has_studies = state
                        .collection(ResourceKind::Study)
                        .any(|(_, s)| str_field(s, "project") == str_field(doc, "id"));
                    if has_studies {
                        return Err(Error::InvalidParameter(format!(
                            "Project '{}' cannot be deleted: it contains studies",
                            id
                        )));
                    }
                }
                uids.push(uid);
            }

            let collection = state.collection_mut(self.kind);
            let mut results = Vec::with_capacity(uids.len());
            let mut content_paths = Vec::new();
            for uid in uids {
                if let Some(doc) = collection.remove(&uid) {
                    if let Some(path) = doc.get("_contentPath").and_then(Value::as_str) {
                        content_paths.push(path.to_string());
                    }
                    results.push(filter::project(&doc, options));
                }
            }
            (results, content_paths)
        };

        for path in content_paths {
            if let Err(e) = self.inner.content.delete(&path).await {
                tracing::warn!("failed to remove content '{}': {}", path, e);
            }
        }

        tracing::info!("{} {} entries deleted by '{}'", results.len(), self.kind, caller.user);
        let mut result = self.result(results, started);
        result.num_deleted = result.num_results as u64;
        Ok(self.write_result(result, options))
    }

    async fn acl(
        &self,
        study: Option<&str>,
        ids: &[String],
        member: Option<&str>,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        if !self.kind.has_acl() {
            return Err(Error::InvalidParameter(format!(
                "{} entries have no permissions",
                self.kind.result_type()
            )));
        }
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();
        let study = self.scope(&state, &caller, study, Permission::View)?;

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let (_, doc) = state.find(self.kind, study.as_ref(), id)?;
            state.require(&caller, self.kind, doc, Permission::View)?;

            let member = if self.can_manage(&caller, study.as_ref(), doc) {
                member
            } else {
                match member {
                    Some(m) if m != caller.user => {
                        return Err(Error::permission_denied(
                            &caller.user,
                            "view permissions of",
                            &format!("member '{}'", m),
                        ));
                    }
                    _ => Some(caller.user.as_str()),
                }
            };
            results.push(json!({"id": str_field(doc, "id"), "acl": acl_entries(doc, member)}));
        }

        let matches = results.len();
        Ok(DataResult::new("AclEntryList", results)
            .with_matches(matches)
            .with_time(elapsed(started)))
    }

    async fn update_acl(
        &self,
        study: Option<&str>,
        ids: &[String],
        members: &[String],
        update: &AclUpdate,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        if !self.kind.has_acl() {
            return Err(Error::InvalidParameter(format!(
                "{} entries have no permissions",
                self.kind.result_type()
            )));
        }
        if update.action != AclAction::Reset && update.permissions.is_empty() {
            return Err(Error::missing("permissions"));
        }
        let caller = self.inner.authenticate(token)?;

        let mut state = self.inner.state.write();
        let study = self.scope(&state, &caller, study, Permission::View)?;
        for member in members {
            if member != ANY_MEMBER && !state.users.contains_key(member) {
                return Err(Error::NotFound(format!("Member '{}' not found", member)));
            }
        }

        let mut uids = Vec::with_capacity(ids.len());
        for id in ids {
            let (uid, doc) = state.find(self.kind, study.as_ref(), id)?;
            if !self.can_manage(&caller, study.as_ref(), doc) {
                return Err(Error::permission_denied(
                    &caller.user,
                    "update permissions of",
                    &format!("{} '{}'", self.kind, id),
                ));
            }
            uids.push(uid);
        }

        let collection = state.collection_mut(self.kind);
        let mut results = Vec::with_capacity(uids.len());
        for uid in uids {
            let Some(doc) = collection.get_mut(&uid) else {
                continue;
            };
            for member in members {
                let mut permissions = member_permissions(doc, member);
                match update.action {
                    AclAction::Set => permissions = update.permissions.clone(),
                    AclAction::Add => permissions.extend(update.permissions.iter().copied()),
                    AclAction::Remove => permissions.retain(|p| !update.permissions.contains(p)),
                    AclAction::Reset => permissions.clear(),
                }
                permissions.sort();
                permissions.dedup();

                let acl = doc
                    .entry(ACL_FIELD)
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(acl) = acl {
                    if permissions.is_empty() {
                        acl.remove(member);
                    } else {
                        let values = permissions.iter().map(|p| Value::from(p.as_str())).collect();
                        acl.insert(member.clone(), Value::Array(values));
                    }
                }
            }

            let entries: Vec<Value> = members
                .iter()
                .flat_map(|m| acl_entries(doc, Some(m.as_str())))
                .collect();
            results.push(json!({"id": str_field(doc, "id"), "acl": entries}));
        }

        tracing::info!(
            "permissions {:?} {:?} for {:?} on {} {} entries",
            update.action,
            update.permissions,
            members,
            results.len(),
            self.kind
        );
        let mut result = DataResult::new("AclEntryList", results).with_time(elapsed(started));
        result.num_updated = result.num_results as u64;
        Ok(result)
    }

    async fn update_annotations(
        &self,
        study: Option<&str>,
        id: &str,
        change: AnnotationChange,
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        if !self.kind.is_annotable() {
            return Err(Error::InvalidParameter(format!(
                "{} entries cannot be annotated",
                self.kind.result_type()
            )));
        }
        let caller = self.inner.authenticate(token)?;

        let mut state = self.inner.state.write();
        let study = self.scope(&state, &caller, study, Permission::View)?;
        let (uid, doc) = state.find(self.kind, study.as_ref(), id)?;
        state.require(&caller, self.kind, doc, Permission::WriteAnnotations)?;
        let variable_sets = study
            .as_ref()
            .map(|s| state.variable_sets(&s.id))
            .unwrap_or_default();

        let doc = state
            .collection_mut(self.kind)
            .get_mut(&uid)
            .ok_or_else(|| Error::NotFound(format!("{} '{}' not found", self.kind.result_type(), id)))?;
        annotations::apply(doc, &change, &variable_sets)?;
        doc.insert("modificationDate".into(), Value::from(now()));
        let updated = filter::project(doc, options);

        tracing::info!(
            "annotation set '{}' of {} '{}' updated ({:?})",
            change.annotation_set,
            self.kind,
            id,
            change.action
        );
        let mut result = self.result(vec![updated], started);
        result.num_updated = 1;
        Ok(self.write_result(result, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_check_mutable() {
        let allowed = params(json!({"name": "Study 1", "description": "d"}));
        assert!(check_mutable(&allowed, ResourceKind::Study).is_ok());

        for key in ["id", "uid", "owner", "_acl", "project", "variableSets"] {
            let mut forbidden = Map::new();
            forbidden.insert(key.to_string(), Value::from("x"));
            assert!(
                check_mutable(&forbidden, ResourceKind::Study).is_err(),
                "{} accepted",
                key
            );
        }
        let sample = params(json!({"variableSets": []}));
        assert!(check_mutable(&sample, ResourceKind::Sample).is_ok());
    }
}
