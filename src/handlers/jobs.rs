use super::{AppState, WsContext, entities, id_route, take_study};
use crate::params::parse_enum;
use crate::types::{DataResult, LogType, ResourceKind, TextWindow};
use crate::Result;
use axum::{Router, extract::State, response::Response, routing::get};

const DEFAULT_LINES: usize = 20;
const DEFAULT_TOP: usize = 20;

pub fn routes() -> Router<AppState> {
    entities::routes(ResourceKind::Job)
        .route("/top", get(top))
        .route(&id_route(ResourceKind::Job, "/log/head"), get(log_head))
        .route(&id_route(ResourceKind::Job, "/log/tail"), get(log_tail))
}

fn log_type(ctx: &WsContext) -> Result<LogType> {
    match ctx.param("type") {
        Some(log_type) => parse_enum("type", &log_type.to_ascii_lowercase()),
        None => Ok(LogType::default()),
    }
}

async fn log(state: &AppState, ctx: &WsContext, window: TextWindow) -> Result<DataResult> {
    let job = entities::single_id(ctx, ResourceKind::Job)?;
    state
        .catalog
        .jobs()
        .log(ctx.param("study"), job, log_type(ctx)?, window, ctx.token()?)
        .await
}

pub async fn log_head(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let window = TextWindow::Head {
            offset: ctx.usize_param("offset", 0)?,
            lines: ctx.usize_param("lines", DEFAULT_LINES)?,
        };
        log(&state, &ctx, window).await
    }
    .await;
    ctx.respond(result)
}

pub async fn log_tail(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let window = TextWindow::Tail {
            lines: ctx.usize_param("lines", DEFAULT_LINES)?,
        };
        log(&state, &ctx, window).await
    }
    .await;
    ctx.respond(result)
}

/// Job counts per status plus the most recent jobs.
pub async fn top(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let limit = ctx.usize_param("limit", DEFAULT_TOP)?;
        let (mut query, _) = ctx.query_options()?;
        let study = take_study(&mut query);
        state
            .catalog
            .jobs()
            .top(study.as_deref(), &query, limit, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}
