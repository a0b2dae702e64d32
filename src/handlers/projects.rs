use super::{AppState, WsContext, entities, id_route};
use crate::types::{DataResult, ResourceKind};
use crate::Result;
use axum::{Router, extract::State, response::Response, routing::get};

pub fn routes() -> Router<AppState> {
    entities::routes(ResourceKind::Project)
        .route(&id_route(ResourceKind::Project, "/studies"), get(studies))
}

/// Studies of the given projects.
pub async fn studies(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let projects = entities::path_ids(&ctx, ResourceKind::Project)?;
        let (mut query, options) = ctx.query_options()?;
        query.put("project", projects.join(","));
        state
            .catalog
            .entities(ResourceKind::Study)
            .search(None, &query, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}
