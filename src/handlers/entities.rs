//! Web services shared by every catalog resource.

use super::{AppState, WsContext, id_route, json_body, take_study};
use crate::catalog::AnnotationChange;
use crate::params::{parse_enum, split_ids, split_list};
use crate::types::{
    AclAction, AclUpdate, AnnotationAction, DataResult, Permission, QueryOptions, ResourceKind,
};
use crate::{Error, Result};
use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    response::Response,
    routing::{delete, get, post},
};
use serde_json::{Map, Value};

/// Generic routes for `kind`, to be nested under `/<kind.path()>`.
pub fn routes(kind: ResourceKind) -> Router<AppState> {
    let mut router = Router::new()
        .route("/create", post(create))
        .route("/search", get(search))
        .route("/distinct", get(distinct))
        .route("/aggregationStats", get(aggregation_stats))
        .route(&id_route(kind, "/info"), get(info))
        .route(&id_route(kind, "/update"), post(update))
        .route(&id_route(kind, "/delete"), delete(remove));

    if kind.has_acl() {
        router = router
            .route(&id_route(kind, "/acl"), get(acl))
            .route("/acl/{members}/update", post(update_acl));
    }
    if kind.is_annotable() {
        router = router.route(
            &id_route(kind, "/annotationSets/{annotationSet}/annotations/update"),
            post(update_annotations),
        );
    }
    router.layer(Extension(kind))
}

/// IDs bound to the resource path segment, at most 100 per request.
pub(super) fn path_ids(ctx: &WsContext, kind: ResourceKind) -> Result<Vec<String>> {
    split_ids(ctx.path(kind.path())?, true)
}

/// The one ID bound to the resource path segment.
pub(super) fn single_id(ctx: &WsContext, kind: ResourceKind) -> Result<&str> {
    let id = ctx.path(kind.path())?;
    if id.contains(',') {
        return Err(Error::InvalidParameter(format!(
            "Only one {} is accepted, found '{}'",
            kind, id
        )));
    }
    Ok(id)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let mut params = json_body(body)?;
        let (mut query, options) = ctx.query_options()?;
        let study = take_study(&mut query);

        if kind == ResourceKind::Study {
            if let (Some(project), Value::Object(map)) = (ctx.param("project"), &mut params) {
                map.entry("project")
                    .or_insert_with(|| Value::from(project));
            }
        }

        state
            .catalog
            .entities(kind)
            .create(study.as_deref(), params, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn search(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
) -> Response {
    let result: Result<DataResult> = async {
        let (mut query, options) = ctx.query_options()?;
        let study = take_study(&mut query);
        state
            .catalog
            .entities(kind)
            .search(study.as_deref(), &query, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn distinct(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
) -> Response {
    let result: Result<DataResult> = async {
        let (mut query, _) = ctx.query_options()?;
        let study = take_study(&mut query);
        let field = query
            .remove("field")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| Error::missing("field"))?;
        state
            .catalog
            .entities(kind)
            .distinct(study.as_deref(), &field, &query, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn aggregation_stats(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
) -> Response {
    let result: Result<DataResult> = async {
        let (mut query, options) = ctx.query_options()?;
        let study = take_study(&mut query);
        let facet = query
            .remove("field")
            .and_then(|v| v.as_str().map(str::to_string))
            .or_else(|| {
                options
                    .get(QueryOptions::FACET)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| Error::missing("field"))?;
        state
            .catalog
            .entities(kind)
            .facet(study.as_deref(), &query, &facet, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn info(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
) -> Response {
    let result: Result<DataResult> = async {
        let ids = path_ids(&ctx, kind)?;
        let (_, options) = ctx.query_options()?;
        state
            .catalog
            .entities(kind)
            .info(ctx.param("study"), &ids, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let params = json_body(body)?;
        let ids = path_ids(&ctx, kind)?;
        let (_, options) = ctx.query_options()?;
        state
            .catalog
            .entities(kind)
            .update(ctx.param("study"), &ids, params, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
) -> Response {
    let result: Result<DataResult> = async {
        let ids = path_ids(&ctx, kind)?;
        let (_, options) = ctx.query_options()?;
        state
            .catalog
            .entities(kind)
            .delete(ctx.param("study"), &ids, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn acl(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
) -> Response {
    let result: Result<DataResult> = async {
        let ids = path_ids(&ctx, kind)?;
        state
            .catalog
            .entities(kind)
            .acl(ctx.param("study"), &ids, ctx.param("member"), ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn update_acl(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let body = json_body(body)?;
        let members = split_ids(ctx.path("members")?, true)?;
        let (ids, update) = parse_acl_body(kind, &body)?;
        state
            .catalog
            .entities(kind)
            .update_acl(ctx.param("study"), &ids, &members, &update, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

pub async fn update_annotations(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    ctx: WsContext,
    body: std::result::Result<Json<Map<String, Value>>, JsonRejection>,
) -> Response {
    let result: Result<DataResult> = async {
        let annotations = json_body(body)?;
        let id = ctx.path(kind.path())?;
        let annotation_set = ctx.path("annotationSet")?;
        let action = match ctx.param("action") {
            Some(action) => parse_enum("action", &action.to_ascii_uppercase())?,
            None => AnnotationAction::default(),
        };
        let (_, options) = ctx.query_options()?;

        let change = AnnotationChange {
            annotation_set: annotation_set.to_string(),
            variable_set: ctx.param("variableSetId").map(str::to_string),
            action,
            annotations,
        };
        state
            .catalog
            .entities(kind)
            .update_annotations(ctx.param("study"), id, change, &options, ctx.token()?)
            .await
    }
    .await;
    ctx.respond(result)
}

/// Strings or arrays of strings.
fn string_list(value: &Value, key: &str) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(split_list(s)),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    Error::InvalidParameter(format!("'{}' must be a list of strings", key))
                })
            })
            .collect(),
        _ => Err(Error::InvalidParameter(format!(
            "'{}' must be a list of strings",
            key
        ))),
    }
}

/// Read `{permissions, action, <resource>: ids}` from an ACL update body.
fn parse_acl_body(kind: ResourceKind, body: &Value) -> Result<(Vec<String>, AclUpdate)> {
    let permissions = string_list(body.get("permissions").unwrap_or(&Value::Null), "permissions")?
        .iter()
        .map(|p| p.parse::<Permission>())
        .collect::<Result<Vec<_>>>()?;

    let action = match body.get("action").and_then(Value::as_str) {
        Some(action) => parse_enum("action", &action.to_ascii_uppercase())?,
        None => AclAction::default(),
    };

    let ids = string_list(body.get(kind.param()).unwrap_or(&Value::Null), kind.param())?;
    if ids.is_empty() {
        return Err(Error::missing(kind.param()));
    }
    let ids = split_ids(&ids.join(","), true)?;

    Ok((ids, AclUpdate { permissions, action }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_acl_body() {
        let body = json!({"permissions": "VIEW,write", "action": "add", "sample": "s1,s2"});
        let (ids, update) = parse_acl_body(ResourceKind::Sample, &body).unwrap();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(update.action, AclAction::Add);
        assert_eq!(update.permissions, vec![Permission::View, Permission::Write]);
    }

    #[test]
    fn test_parse_acl_body_array_and_default_action() {
        let body = json!({"permissions": ["DOWNLOAD"], "file": ["data:a.txt"]});
        let (ids, update) = parse_acl_body(ResourceKind::File, &body).unwrap();
        assert_eq!(ids, vec!["data:a.txt"]);
        assert_eq!(update.action, AclAction::Set);
        assert_eq!(update.permissions, vec![Permission::Download]);
    }

    #[test]
    fn test_parse_acl_body_errors() {
        let missing = parse_acl_body(ResourceKind::Sample, &json!({"permissions": "VIEW"}));
        assert!(matches!(missing, Err(Error::InvalidParameter(msg)) if msg.contains("'sample'")));

        let unknown = json!({"permissions": "FLY", "sample": "s1"});
        assert!(parse_acl_body(ResourceKind::Sample, &unknown).is_err());

        let duplicated = json!({"permissions": "VIEW", "sample": "s1,s1"});
        assert!(parse_acl_body(ResourceKind::Sample, &duplicated).is_err());
    }
}
