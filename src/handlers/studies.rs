use super::{AppState, WsContext, entities, id_route, json_body};
use crate::params::parse_enum;
use crate::types::{DataResult, ResourceKind, VariableSetAction};
use crate::Result;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::Response,
    routing::{get, post},
};
use serde_json::Value;

pub fn routes() -> Router<AppState> {
    entities::routes(ResourceKind::Study)
        .route(
            &id_route(ResourceKind::Study, "/variableSets"),
            get(variable_sets),
        )
        .route(
            &id_route(ResourceKind::Study, "/variableSets/update"),
            post(update_variable_sets),
        )
}

pub async fn variable_sets(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let study = entities::single_id(&ctx, ResourceKind::Study)?;
        state
            .catalog
            .studies()
            .variable_sets(study, ctx.param("id"), ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn update_variable_sets(
    State(state): State<AppState>,
    ctx: WsContext,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let params = json_body(body)?;
        let study = entities::single_id(&ctx, ResourceKind::Study)?;
        let action = match ctx.param("action") {
            Some(action) => parse_enum("action", &action.to_ascii_uppercase())?,
            None => VariableSetAction::default(),
        };
        state
            .catalog
            .studies()
            .update_variable_sets(study, action, params, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}
