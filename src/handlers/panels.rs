use super::{AppState, WsContext, entities};
use crate::types::{DataResult, ResourceKind};
use crate::{Error, Result};
use axum::{Router, response::Response, routing::post};

pub fn routes() -> Router<AppState> {
    entities::routes(ResourceKind::Panel).route("/import", post(import))
}

/// Importing panels from external sources is not available.
pub async fn import(ctx: WsContext) -> Response {
    let result: Result<DataResult> = Err(Error::not_implemented("Importing panels"));
    ctx.respond(result)
}
