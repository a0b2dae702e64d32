use super::{AppState, WsContext, entities, id_route};
use crate::types::{DataResult, QueryOptions, ResourceKind};
use crate::Result;
use axum::{Router, extract::State, response::Response, routing::post};
use serde_json::json;

pub fn routes() -> Router<AppState> {
    entities::routes(ResourceKind::Notification).route(
        &id_route(ResourceKind::Notification, "/visit"),
        post(visit),
    )
}

/// Mark notifications as seen by their receiver.
pub async fn visit(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let ids = entities::path_ids(&ctx, ResourceKind::Notification)?;
        state
            .catalog
            .entities(ResourceKind::Notification)
            .update(
                None,
                &ids,
                json!({"visited": true}),
                &QueryOptions::new(),
                ctx.token()?,
            )
            .await
    }
    .await;
    ctx.respond(result)
}
