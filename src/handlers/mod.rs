mod context;
mod entities;
mod files;
mod jobs;
mod meta;
mod notifications;
mod panels;
mod projects;
mod studies;
mod users;

pub use context::WsContext;

use crate::catalog::Catalog;
use crate::params::Limits;
use crate::types::{Query, ResourceKind};
use crate::{Error, Result};
use axum::{Json, Router, extract::rejection::JsonRejection};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Values fixed at startup that every web service needs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_version: String,
    pub limits: Limits,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(catalog: Arc<dyn Catalog>, settings: Settings) -> Self {
        Self {
            catalog,
            settings: Arc::new(settings),
        }
    }
}

/// Build the complete web service tree under `/{apiVersion}`.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/users", users::routes())
        .nest("/projects", projects::routes())
        .nest("/studies", studies::routes())
        .nest("/files", files::routes())
        .nest("/jobs", jobs::routes())
        .nest("/panels", panels::routes())
        .nest("/notifications", notifications::routes())
        .nest("/meta", meta::routes());

    let api = [
        ResourceKind::Sample,
        ResourceKind::Individual,
        ResourceKind::Family,
        ResourceKind::Cohort,
        ResourceKind::Workflow,
        ResourceKind::ExternalTool,
    ]
    .into_iter()
    .fold(api, |api, kind| {
        api.nest(&format!("/{}", kind.path()), entities::routes(kind))
    });

    let prefix = format!("/{}", state.settings.api_version.trim_matches('/'));
    Router::new()
        .nest(&prefix, api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Route for an operation on the IDs bound to `/{<resource>}`.
fn id_route(kind: ResourceKind, suffix: &str) -> String {
    format!("/{{{}}}{}", kind.path(), suffix)
}

/// Unwrap a JSON body, turning a rejection into a parameter error so it is
/// reported inside the envelope.
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|e| Error::InvalidParameter(e.body_text()))
}

/// `study` travels positionally to the managers, never inside the query.
fn take_study(query: &mut Query) -> Option<String> {
    query
        .remove("study")
        .and_then(|v| v.as_str().map(str::to_string))
}
