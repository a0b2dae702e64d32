//! Catalog records and the authorization rules applied to them.

use crate::auth::PasswordHash;
use crate::types::{Permission, ResourceKind};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

pub type Document = Map<String, Value>;

/// Hidden field holding `member -> [permission]`.
pub const ACL_FIELD: &str = "_acl";

/// Any authenticated user.
pub const ANY_MEMBER: &str = "*";

pub struct UserRecord {
    pub doc: Document,
    pub password: PasswordHash,
}

/// Authenticated user on whose behalf a manager call runs.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: String,
    pub admin: bool,
}

/// Owned view of a study, detached from the state borrow.
#[derive(Debug, Clone)]
pub struct StudyRef {
    pub id: String,
    pub fqn: String,
    pub owner: String,
}

#[derive(Default)]
pub struct State {
    pub users: BTreeMap<String, UserRecord>,
    docs: HashMap<ResourceKind, BTreeMap<u64, Document>>,
    next_uid: u64,
}

pub fn str_field<'a>(doc: &'a Document, field: &str) -> &'a str {
    doc.get(field).and_then(Value::as_str).unwrap_or_default()
}

impl State {
    pub fn next_uid(&mut self) -> u64 {
        self.next_uid += 1;
        self.next_uid
    }

    pub fn collection(&self, kind: ResourceKind) -> impl Iterator<Item = (&u64, &Document)> {
        self.docs.get(&kind).into_iter().flat_map(|c| c.iter())
    }

    pub fn collection_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<u64, Document> {
        self.docs.entry(kind).or_default()
    }

    /// Find a project or study by ID or fully-qualified name.
    pub fn find_global(&self, kind: ResourceKind, reference: &str) -> Option<(u64, &Document)> {
        self.collection(kind)
            .find(|(_, doc)| str_field(doc, "id") == reference || str_field(doc, "fqn") == reference)
            .map(|(uid, doc)| (*uid, doc))
    }

    /// Find an entity by ID (or UUID) inside a study.
    pub fn find_in_study(
        &self,
        kind: ResourceKind,
        study_id: &str,
        id: &str,
    ) -> Option<(u64, &Document)> {
        self.collection(kind)
            .find(|(_, doc)| {
                str_field(doc, "study") == study_id
                    && (str_field(doc, "id") == id || str_field(doc, "uuid") == id)
            })
            .map(|(uid, doc)| (*uid, doc))
    }

    pub fn find(
        &self,
        kind: ResourceKind,
        study: Option<&StudyRef>,
        id: &str,
    ) -> Result<(u64, &Document)> {
        let found = match (kind.is_study_scoped(), study) {
            (true, Some(study)) => self.find_in_study(kind, &study.id, id),
            (true, None) => None,
            (false, _) => match kind {
                ResourceKind::Project | ResourceKind::Study => self.find_global(kind, id),
                _ => self
                    .collection(kind)
                    .find(|(_, doc)| str_field(doc, "id") == id)
                    .map(|(uid, doc)| (*uid, doc)),
            },
        };
        found.ok_or_else(|| Error::NotFound(format!("{} '{}' not found", kind.result_type(), id)))
    }

    pub fn study_ref(&self, doc: &Document) -> StudyRef {
        StudyRef {
            id: str_field(doc, "id").to_string(),
            fqn: str_field(doc, "fqn").to_string(),
            owner: str_field(doc, "owner").to_string(),
        }
    }

    /// Resolve the study a study-scoped call works on.
    ///
    /// Without an explicit study the caller must be able to see exactly one.
    pub fn resolve_study(
        &self,
        caller: &Caller,
        study: Option<&str>,
        permission: Permission,
    ) -> Result<StudyRef> {
        let doc = match study {
            Some(reference) => {
                let (_, doc) = self.find_global(ResourceKind::Study, reference).ok_or_else(|| {
                    Error::NotFound(format!("Study '{}' not found", reference))
                })?;
                doc
            }
            None => {
                let visible: Vec<&Document> = self
                    .collection(ResourceKind::Study)
                    .map(|(_, doc)| doc)
                    .filter(|doc| study_allows(caller, doc, Permission::View))
                    .collect();
                match visible.as_slice() {
                    [only] => *only,
                    _ => return Err(Error::missing("study")),
                }
            }
        };

        if !study_allows(caller, doc, permission) {
            return Err(Error::permission_denied(
                &caller.user,
                &permission.as_str().to_lowercase(),
                &format!("study '{}'", str_field(doc, "fqn")),
            ));
        }
        Ok(self.study_ref(doc))
    }

    /// Decide whether `caller` holds `permission` on `doc`.
    pub fn allows(
        &self,
        caller: &Caller,
        kind: ResourceKind,
        doc: &Document,
        permission: Permission,
    ) -> bool {
        if caller.admin {
            return true;
        }
        match kind {
            ResourceKind::Project => {
                str_field(doc, "owner") == caller.user
                    || (permission == Permission::View
                        && self.collection(ResourceKind::Study).any(|(_, study)| {
                            str_field(study, "project") == str_field(doc, "id")
                                && study_allows(caller, study, Permission::View)
                        }))
            }
            ResourceKind::Study => study_allows(caller, doc, permission),
            ResourceKind::Notification => str_field(doc, "receiver") == caller.user,
            _ => {
                let study_grants = self
                    .find_global(ResourceKind::Study, str_field(doc, "study"))
                    .is_some_and(|(_, study)| study_allows(caller, study, permission));
                study_grants || acl_grants(doc, &caller.user, permission)
            }
        }
    }

    pub fn require(
        &self,
        caller: &Caller,
        kind: ResourceKind,
        doc: &Document,
        permission: Permission,
    ) -> Result<()> {
        if self.allows(caller, kind, doc, permission) {
            Ok(())
        } else {
            Err(Error::permission_denied(
                &caller.user,
                &permission.as_str().to_lowercase(),
                &format!("{} '{}'", kind, str_field(doc, "id")),
            ))
        }
    }

    /// Variable sets defined in a study.
    pub fn variable_sets(&self, study_id: &str) -> Vec<Value> {
        self.find_global(ResourceKind::Study, study_id)
            .and_then(|(_, study)| study.get("variableSets"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

/// Owner and admin hold every permission on a study; others need an ACL entry.
pub fn study_allows(caller: &Caller, study: &Document, permission: Permission) -> bool {
    caller.admin
        || str_field(study, "owner") == caller.user
        || acl_grants(study, &caller.user, permission)
}

pub fn acl_grants(doc: &Document, user: &str, permission: Permission) -> bool {
    [user, ANY_MEMBER]
        .iter()
        .flat_map(|member| member_permissions(doc, member))
        .any(|granted| implies(granted, permission))
}

/// Any permission implies `VIEW`; `WRITE` implies `WRITE_ANNOTATIONS`.
fn implies(granted: Permission, requested: Permission) -> bool {
    granted == requested
        || requested == Permission::View
        || (granted == Permission::Write && requested == Permission::WriteAnnotations)
}

pub fn member_permissions(doc: &Document, member: &str) -> Vec<Permission> {
    doc.get(ACL_FIELD)
        .and_then(Value::as_object)
        .and_then(|acl| acl.get(member))
        .and_then(Value::as_array)
        .map(|perms| {
            perms
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|p| p.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// ACL entries of a document, optionally restricted to one member.
pub fn acl_entries(doc: &Document, member: Option<&str>) -> Vec<Value> {
    let Some(Value::Object(acl)) = doc.get(ACL_FIELD) else {
        return Vec::new();
    };
    acl.iter()
        .filter(|(m, _)| member.is_none_or(|wanted| wanted == m.as_str()))
        .map(|(m, perms)| serde_json::json!({"member": m, "permissions": perms}))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caller(user: &str) -> Caller {
        Caller {
            user: user.to_string(),
            admin: false,
        }
    }

    fn state_with_study() -> State {
        let mut state = State::default();
        let uid = state.next_uid();
        let study = json!({
            "id": "s1",
            "fqn": "owner@p1:s1",
            "owner": "owner",
            "project": "p1",
            "_acl": {"reader": ["VIEW"], "*": ["VIEW_CONTENT"]},
        });
        state
            .collection_mut(ResourceKind::Study)
            .insert(uid, study.as_object().cloned().unwrap());
        let uid = state.next_uid();
        let sample = json!({
            "id": "sample1",
            "study": "s1",
            "_acl": {"writer": ["WRITE"]},
        });
        state
            .collection_mut(ResourceKind::Sample)
            .insert(uid, sample.as_object().cloned().unwrap());
        state
    }

    #[test]
    fn test_resolve_study_by_fqn() {
        let state = state_with_study();
        let study = state
            .resolve_study(&caller("owner"), Some("owner@p1:s1"), Permission::Write)
            .unwrap();
        assert_eq!(study.id, "s1");
    }

    #[test]
    fn test_resolve_single_visible_study() {
        let state = state_with_study();
        let study = state
            .resolve_study(&caller("reader"), None, Permission::View)
            .unwrap();
        assert_eq!(study.fqn, "owner@p1:s1");
    }

    #[test]
    fn test_resolve_study_denied() {
        let state = state_with_study();
        let err = state
            .resolve_study(&caller("reader"), Some("s1"), Permission::Write)
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[test]
    fn test_entity_acl() {
        let state = state_with_study();
        let (_, sample) = state.collection(ResourceKind::Sample).next().unwrap();

        assert!(state.allows(&caller("reader"), ResourceKind::Sample, sample, Permission::View));
        assert!(!state.allows(&caller("reader"), ResourceKind::Sample, sample, Permission::Write));
        assert!(state.allows(
            &caller("writer"),
            ResourceKind::Sample,
            sample,
            Permission::WriteAnnotations
        ));
        assert!(state.allows(
            &caller("stranger"),
            ResourceKind::Sample,
            sample,
            Permission::ViewContent
        ));
        assert!(!state.allows(&caller("stranger"), ResourceKind::Sample, sample, Permission::Delete));
    }

    #[test]
    fn test_project_visible_through_study() {
        let mut state = state_with_study();
        let uid = state.next_uid();
        state.collection_mut(ResourceKind::Project).insert(
            uid,
            json!({"id": "p1", "owner": "owner"}).as_object().cloned().unwrap(),
        );
        let (_, project) = state.find_global(ResourceKind::Project, "p1").unwrap();
        assert!(state.allows(&caller("reader"), ResourceKind::Project, project, Permission::View));
        assert!(!state.allows(&caller("reader"), ResourceKind::Project, project, Permission::Write));
    }

    #[test]
    fn test_acl_entries_filter() {
        let state = state_with_study();
        let (_, study) = state.find_global(ResourceKind::Study, "s1").unwrap();
        assert_eq!(acl_entries(study, None).len(), 2);
        assert_eq!(
            acl_entries(study, Some("reader")),
            vec![json!({"member": "reader", "permissions": ["VIEW"]})]
        );
    }

    #[test]
    fn test_member_with_dot_in_id() {
        let study = json!({"id": "s1", "owner": "owner", "_acl": {"jane.doe": ["VIEW"]}});
        let study = study.as_object().cloned().unwrap();
        assert_eq!(member_permissions(&study, "jane.doe"), vec![Permission::View]);
        assert!(study_allows(&caller("jane.doe"), &study, Permission::View));
        assert!(!study_allows(&caller("jane"), &study, Permission::View));
    }
}
