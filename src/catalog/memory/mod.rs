//! In-process catalog.
//!
//! All records live in memory behind a single `RwLock`; file contents and
//! job logs are delegated to a [`ContentStore`]. Locks are never held
//! across an `.await`.

mod annotations;
mod entities;
mod files;
pub mod filter;
mod jobs;
mod state;

pub use state::{Caller, Document};

use super::{Catalog, EntityManager, FileManager, JobManager, StudyManager, UserManager};
use crate::auth::{PasswordHash, TokenManager};
use crate::storage::ContentStore;
use crate::types::{DataResult, Permission, QueryOptions, ResourceKind, VariableSetAction};
use crate::{Error, Result};
use async_trait::async_trait;
use entities::MemoryEntityManager;
use parking_lot::RwLock;
use serde_json::{Value, json};
use state::{State, UserRecord, str_field};
use std::sync::Arc;
use std::time::Instant;

/// Catalog timestamps, `yyyyMMddHHmmss`.
pub(crate) fn now() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}

pub(crate) fn elapsed(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub(crate) struct Inner {
    pub state: RwLock<State>,
    pub tokens: TokenManager,
    pub content: Arc<dyn ContentStore>,
    pub admin: String,
}

impl Inner {
    /// Resolve a session token to the user it was issued for.
    pub fn authenticate(&self, token: &str) -> Result<Caller> {
        let claims = self.tokens.validate(token)?;
        if !self.state.read().users.contains_key(&claims.sub) {
            return Err(Error::Authentication(format!(
                "User '{}' not found",
                claims.sub
            )));
        }
        Ok(Caller {
            admin: claims.sub == self.admin,
            user: claims.sub,
        })
    }
}

pub struct MemoryCatalog {
    inner: Arc<Inner>,
    managers: Vec<MemoryEntityManager>,
}

impl MemoryCatalog {
    /// Create a catalog holding only the administrator account.
    pub fn new(
        content: Arc<dyn ContentStore>,
        tokens: TokenManager,
        admin_user: &str,
        admin_password: &str,
    ) -> Self {
        let mut state = State::default();
        state.users.insert(
            admin_user.to_string(),
            UserRecord {
                doc: user_document(admin_user, "Administrator", ""),
                password: PasswordHash::new(admin_password),
            },
        );

        let inner = Arc::new(Inner {
            state: RwLock::new(state),
            tokens,
            content,
            admin: admin_user.to_string(),
        });
        let managers = ResourceKind::ALL
            .iter()
            .map(|kind| MemoryEntityManager::new(*kind, inner.clone()))
            .collect();

        tracing::info!("in-memory catalog ready, administrator '{}'", admin_user);
        Self { inner, managers }
    }
}

fn user_document(id: &str, name: &str, email: &str) -> Document {
    let doc = json!({
        "id": id,
        "name": name,
        "email": email,
        "creationDate": now(),
        "internal": {"status": {"id": "READY"}},
    });
    match doc {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

impl Catalog for MemoryCatalog {
    fn entities(&self, kind: ResourceKind) -> &dyn EntityManager {
        &self.managers[kind as usize]
    }

    fn users(&self) -> &dyn UserManager {
        self
    }

    fn studies(&self) -> &dyn StudyManager {
        self
    }

    fn files(&self) -> &dyn FileManager {
        self
    }

    fn jobs(&self) -> &dyn JobManager {
        self
    }
}

#[async_trait]
impl UserManager for MemoryCatalog {
    async fn login(&self, user: &str, password: &str) -> Result<DataResult> {
        let started = Instant::now();
        let valid = self
            .inner
            .state
            .read()
            .users
            .get(user)
            .is_some_and(|record| record.password.verify(password));
        if !valid {
            tracing::warn!("failed login attempt for user '{}'", user);
            return Err(Error::Authentication("Incorrect user or password".to_string()));
        }

        let token = self.inner.tokens.create_token(user)?;
        tracing::info!("user '{}' logged in", user);
        Ok(DataResult::new(
            "Token",
            vec![json!({"token": token, "expiresIn": self.inner.tokens.expiration_secs()})],
        )
        .with_time(elapsed(started)))
    }

    async fn create(&self, params: Value, token: &str) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        if !caller.admin {
            return Err(Error::permission_denied(&caller.user, "create", "users"));
        }

        let field = |name: &str| params.get(name).and_then(Value::as_str).unwrap_or_default();
        let id = field("id");
        let password = field("password");
        if id.is_empty() {
            return Err(Error::missing("id"));
        }
        if password.is_empty() {
            return Err(Error::missing("password"));
        }

        let mut state = self.inner.state.write();
        if state.users.contains_key(id) {
            return Err(Error::AlreadyExists(format!("User '{}' already exists", id)));
        }
        let name = match field("name") {
            "" => id,
            name => name,
        };
        let doc = user_document(id, name, field("email"));
        let result = Value::Object(doc.clone());
        state.users.insert(
            id.to_string(),
            UserRecord {
                doc,
                password: PasswordHash::new(password),
            },
        );

        tracing::info!("user '{}' created", id);
        let mut result = DataResult::new("User", vec![result]).with_time(elapsed(started));
        result.num_inserted = 1;
        Ok(result)
    }

    async fn info(
        &self,
        ids: &[String],
        options: &QueryOptions,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if !caller.admin && caller.user != *id {
                return Err(Error::permission_denied(
                    &caller.user,
                    "view",
                    &format!("user '{}'", id),
                ));
            }
            let record = state
                .users
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("User '{}' not found", id)))?;

            let mut doc = record.doc.clone();
            let projects: Vec<Value> = state
                .collection(ResourceKind::Project)
                .filter(|(_, p)| str_field(p, "owner") == id)
                .map(|(_, p)| Value::from(str_field(p, "id")))
                .collect();
            doc.insert("projects".to_string(), Value::Array(projects));
            results.push(filter::project(&doc, options));
        }

        let matches = results.len();
        Ok(DataResult::new("User", results)
            .with_matches(matches)
            .with_time(elapsed(started)))
    }

    async fn change_password(
        &self,
        user: &str,
        password: &str,
        new_password: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        if new_password.is_empty() {
            return Err(Error::missing("newPassword"));
        }

        let mut state = self.inner.state.write();
        let record = state
            .users
            .get_mut(user)
            .filter(|record| record.password.verify(password))
            .ok_or_else(|| Error::Authentication("Incorrect user or password".to_string()))?;
        record.password = PasswordHash::new(new_password);

        tracing::info!("password changed for user '{}'", user);
        let mut result = DataResult::empty("User").with_time(elapsed(started));
        result.num_updated = 1;
        Ok(result)
    }
}

#[async_trait]
impl StudyManager for MemoryCatalog {
    async fn variable_sets(
        &self,
        study: &str,
        variable_set: Option<&str>,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let state = self.inner.state.read();
        let study = state.resolve_study(&caller, Some(study), Permission::View)?;

        let sets: Vec<Value> = state
            .variable_sets(&study.id)
            .into_iter()
            .filter(|vs| {
                variable_set.is_none_or(|id| vs.get("id").and_then(Value::as_str) == Some(id))
            })
            .collect();
        if let (Some(id), true) = (variable_set, sets.is_empty()) {
            return Err(Error::NotFound(format!("Variable set '{}' not found", id)));
        }

        let matches = sets.len();
        Ok(DataResult::new("VariableSet", sets)
            .with_matches(matches)
            .with_time(elapsed(started)))
    }

    async fn update_variable_sets(
        &self,
        study: &str,
        action: VariableSetAction,
        params: Value,
        token: &str,
    ) -> Result<DataResult> {
        let started = Instant::now();
        let caller = self.inner.authenticate(token)?;
        let mut state = self.inner.state.write();
        let study = state.resolve_study(&caller, Some(study), Permission::View)?;
        if !caller.admin && study.owner != caller.user {
            return Err(Error::permission_denied(
                &caller.user,
                "update variable sets of",
                &format!("study '{}'", study.fqn),
            ));
        }

        let id = params
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::missing("id"))?
            .to_string();
        let mut sets = state.variable_sets(&study.id);
        let position = sets
            .iter()
            .position(|vs| vs.get("id").and_then(Value::as_str) == Some(id.as_str()));

        match action {
            VariableSetAction::Add => {
                if position.is_some() {
                    return Err(Error::AlreadyExists(format!(
                        "Variable set '{}' already exists",
                        id
                    )));
                }
                let variables = params
                    .get("variables")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::missing("variables"))?;
                if variables
                    .iter()
                    .any(|v| v.get("id").and_then(Value::as_str).is_none_or(str::is_empty))
                {
                    return Err(Error::InvalidParameter(
                        "Every variable needs an 'id'".to_string(),
                    ));
                }
                sets.push(params.clone());
            }
            VariableSetAction::Remove => {
                let position = position
                    .ok_or_else(|| Error::NotFound(format!("Variable set '{}' not found", id)))?;
                let in_use = ResourceKind::ALL
                    .iter()
                    .filter(|kind| kind.is_annotable())
                    .flat_map(|kind| state.collection(*kind))
                    .any(|(_, doc)| {
                        str_field(doc, "study") == study.id
                            && annotations::uses_variable_set(doc, &id)
                    });
                if in_use {
                    return Err(Error::InvalidParameter(format!(
                        "Variable set '{}' is in use",
                        id
                    )));
                }
                sets.remove(position);
            }
        }

        let (uid, _) = state
            .find_global(ResourceKind::Study, &study.id)
            .ok_or_else(|| Error::NotFound(format!("Study '{}' not found", study.id)))?;
        if let Some(doc) = state.collection_mut(ResourceKind::Study).get_mut(&uid) {
            doc.insert("variableSets".to_string(), Value::Array(sets.clone()));
            doc.insert("modificationDate".to_string(), Value::from(now()));
        }

        tracing::info!("variable set '{}' {:?} in study '{}'", id, action, study.fqn);
        let mut result = DataResult::new("VariableSet", sets).with_time(elapsed(started));
        result.num_updated = 1;
        Ok(result)
    }
}
