use super::{AppState, WsContext};
use crate::types::DataResult;
use axum::{Router, extract::State, response::Response, routing::get};
use serde_json::json;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/about", get(about))
        .route("/ping", get(ping))
}

pub async fn about(State(state): State<AppState>, ctx: WsContext) -> Response {
    let about = json!({
        "program": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "apiVersion": state.settings.api_version,
    });
    ctx.respond(Ok(DataResult::new("About", vec![about]).with_matches(1)))
}

pub async fn ping(ctx: WsContext) -> Response {
    ctx.respond(Ok(DataResult::new("Pong", vec![json!("pong")]).with_matches(1)))
}
