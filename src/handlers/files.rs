use super::{AppState, WsContext, entities, id_route};
use crate::catalog::{FileDownload, FileUpload};
use crate::types::{DataResult, ResourceKind, TextWindow};
use crate::{Error, Result};
use axum::{
    Router,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use std::collections::HashMap;

/// Lines returned by head and tail when none are requested.
const DEFAULT_LINES: usize = 20;
/// Matching lines returned by grep when none are requested.
const DEFAULT_MAX_COUNT: usize = 50;

pub fn routes() -> Router<AppState> {
    let file = |suffix: &str| id_route(ResourceKind::File, suffix);
    entities::routes(ResourceKind::File)
        .route("/upload", post(upload))
        .route(&file("/download"), get(download))
        .route(&file("/head"), get(head))
        .route(&file("/tail"), get(tail))
        .route(&file("/grep"), get(grep))
}

fn multipart_error(e: MultipartError) -> Error {
    Error::InvalidParameter(format!("Invalid multipart body: {}", e.body_text()))
}

/// Multipart form fields: the `file` part plus text fields.
pub async fn upload(
    State(state): State<AppState>,
    ctx: WsContext,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let mut multipart = multipart.map_err(|e| Error::InvalidParameter(e.body_text()))?;

        let mut content: Option<Bytes> = None;
        let mut original_name: Option<String> = None;
        let mut fields: HashMap<String, String> = HashMap::new();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                original_name = field.file_name().map(str::to_string);
                content = Some(field.bytes().await.map_err(multipart_error)?);
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                fields.insert(name, value);
            }
        }

        let content = content.ok_or_else(|| Error::missing("file"))?;
        let file_name = fields
            .remove("fileName")
            .filter(|name| !name.trim().is_empty())
            .or(original_name)
            .ok_or_else(|| Error::missing("fileName"))?;
        let study = fields
            .remove("study")
            .or_else(|| ctx.param("study").map(str::to_string));

        let upload = FileUpload {
            file_name,
            path: fields.remove("path").unwrap_or_default(),
            content,
            format: fields.remove("format"),
            bioformat: fields.remove("bioformat"),
            description: fields.remove("description"),
        };
        state
            .catalog
            .files()
            .upload(study.as_deref(), upload, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

/// Raw file bytes; failures still come back as an envelope.
pub async fn download(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<FileDownload> = async {
        let file = entities::single_id(&ctx, ResourceKind::File)?;
        state
            .catalog
            .files()
            .download(ctx.param("study"), file, ctx.token()?)
            .await
    }
    .await;

    match result {
        Ok(download) => {
            let disposition = format!("attachment; filename=\"{}\"", download.name);
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                download.content,
            )
                .into_response()
        }
        Err(e) => ctx.error(e),
    }
}

pub async fn head(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let file = entities::single_id(&ctx, ResourceKind::File)?;
        let window = TextWindow::Head {
            offset: ctx.usize_param("offset", 0)?,
            lines: ctx.usize_param("lines", DEFAULT_LINES)?,
        };
        state
            .catalog
            .files()
            .content(ctx.param("study"), file, window, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn tail(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let file = entities::single_id(&ctx, ResourceKind::File)?;
        let window = TextWindow::Tail {
            lines: ctx.usize_param("lines", DEFAULT_LINES)?,
        };
        state
            .catalog
            .files()
            .content(ctx.param("study"), file, window, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn grep(State(state): State<AppState>, ctx: WsContext) -> Response {
    let result: Result<DataResult> = async {
        let file = entities::single_id(&ctx, ResourceKind::File)?;
        let pattern = ctx.param("pattern").ok_or_else(|| Error::missing("pattern"))?;
        state
            .catalog
            .files()
            .grep(
                ctx.param("study"),
                file,
                pattern,
                ctx.bool_param("ignoreCase"),
                ctx.usize_param("maxCount", DEFAULT_MAX_COUNT)?,
                ctx.token()?,
            )
            .await
    }
    .await;
    ctx.respond(result)
}
