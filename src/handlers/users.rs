use super::{AppState, WsContext, json_body};
use crate::params::split_ids;
use crate::types::{DataResult, ResourceKind};
use crate::{Error, Result};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordBody {
    pub user: String,
    pub password: String,
    pub new_password: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/create", post(create))
        .route("/password", post(change_password))
        .route("/{users}/info", get(info))
        .route("/{users}/projects", get(projects))
}

/// The only web service that does not need a token.
pub async fn login(
    State(state): State<AppState>,
    ctx: WsContext,
    body: std::result::Result<Json<LoginBody>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let body = json_body(body)?;
        if body.user.is_empty() {
            return Err(Error::missing("user"));
        }
        state.catalog.users().login(&body.user, &body.password).await
    }
    .await;
    ctx.respond(result)
}

pub async fn create(
    State(state): State<AppState>,
    ctx: WsContext,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let params = json_body(body)?;
        state.catalog.users().create(params, ctx.token()?).await
    }
    .await;
    ctx.respond(result)
}

pub async fn change_password(
    State(state): State<AppState>,
    ctx: WsContext,
    body: std::result::Result<Json<PasswordBody>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let body = json_body(body)?;
        state
            .catalog
            .users()
            .change_password(&body.user, &body.password, &body.new_password)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn info(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let users = split_ids(ctx.path("users")?, true)?;
        let (_, options) = ctx.query_options()?;
        state
            .catalog
            .users()
            .info(&users, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

/// Projects owned by the given users.
pub async fn projects(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let users = split_ids(ctx.path("users")?, true)?;
        let (mut query, options) = ctx.query_options()?;
        query.put("owner", users.join(","));
        state
            .catalog
            .entities(ResourceKind::Project)
            .search(None, &query, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}
