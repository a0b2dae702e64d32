//! Request context shared by every web service.
//!
//! [`WsContext`] captures what the base web service needs from a request
//! before any manager is called: echoed parameters, the session token, the
//! start time and pagination bounds. Handlers finish by handing the
//! manager's result to [`WsContext::respond`], which builds the envelope.

use super::AppState;
use crate::auth::{TokenSource, extract_token};
use crate::params::{self, Limits};
use crate::types::{DataResult, Event, Query, QueryOptions, RestResponse};
use crate::{Error, Result};
use axum::{
    Json,
    extract::{FromRequestParts, Query as QueryParams, RawPathParams},
    http::{Method, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use std::time::Instant;

/// Echoed in place of credentials passed as query parameters.
const MASKED: &str = "********";

pub struct WsContext {
    started: Instant,
    method: Method,
    path: String,
    api_version: String,
    limits: Limits,
    query_params: BTreeMap<String, String>,
    path_params: BTreeMap<String, String>,
    token: Option<String>,
    events: Vec<Event>,
}

impl FromRequestParts<AppState> for WsContext {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let started = Instant::now();

        let QueryParams(pairs) = QueryParams::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|e| Error::InvalidParameter(e.body_text()))?;
        let mut query_params: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in pairs {
            match query_params.get_mut(&key) {
                Some(existing) => {
                    existing.push(',');
                    existing.push_str(&value);
                }
                None => {
                    query_params.insert(key, value);
                }
            }
        }

        let path_params = match RawPathParams::from_request_parts(parts, state).await {
            Ok(raw) => raw
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => BTreeMap::new(),
        };

        let mut events = Vec::new();
        let token = match extract_token(&parts.headers, query_params.get("sid").map(String::as_str))
        {
            Some((token, TokenSource::Sid)) => {
                events.push(Event::warning(
                    "DeprecatedParameter",
                    "Parameter 'sid' is deprecated, use the Authorization header instead",
                ));
                Some(token)
            }
            Some((token, TokenSource::Header)) => Some(token),
            None => None,
        };

        Ok(Self {
            started,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            api_version: state.settings.api_version.clone(),
            limits: state.settings.limits,
            query_params,
            path_params,
            token,
            events,
        })
    }
}

impl WsContext {
    /// Session token, required by every call that reaches a manager on
    /// behalf of a user.
    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| Error::Authentication("Missing authentication token".to_string()))
    }

    /// Path parameter bound by the route, e.g. `samples` in `/{samples}/info`.
    pub fn path(&self, name: &str) -> Result<&str> {
        self.path_params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::missing(name))
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    pub fn bool_param(&self, key: &str) -> bool {
        self.param(key).is_some_and(params::parse_bool)
    }

    /// Non-negative integer query parameter.
    pub fn usize_param(&self, key: &str, default: usize) -> Result<usize> {
        match self.param(key) {
            None => Ok(default),
            Some(value) => {
                let parsed = params::parse_int(key, value)?;
                usize::try_from(parsed).map_err(|_| {
                    Error::InvalidParameter(format!(
                        "Invalid value '{}' for parameter '{}'",
                        value, key
                    ))
                })
            }
        }
    }

    /// Build the manager query and options from the query string.
    pub fn query_options(&self) -> Result<(Query, QueryOptions)> {
        params::parse_params(&self.query_params, self.limits)
    }

    pub fn respond(self, result: Result<DataResult>) -> Response {
        self.respond_many(result.map(|r| vec![r]))
    }

    pub fn respond_many(self, result: Result<Vec<DataResult>>) -> Response {
        match result {
            Ok(responses) => self.ok(responses),
            Err(e) => self.error(e),
        }
    }

    pub fn ok(self, responses: Vec<DataResult>) -> Response {
        let elapsed = self.elapsed();
        tracing::debug!("{} {} OK {}ms", self.method, self.path, elapsed);
        let body = self.envelope(responses, elapsed);
        (StatusCode::OK, Json(body)).into_response()
    }

    pub fn error(mut self, error: Error) -> Response {
        let status = error.status_code();
        let elapsed = self.elapsed();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(
                "{} {} failed after {}ms: {}: {}",
                self.method,
                self.path,
                elapsed,
                error.name(),
                error
            );
        } else {
            tracing::warn!(
                "{} {} rejected ({}) after {}ms: {}",
                self.method,
                self.path,
                status.as_u16(),
                elapsed,
                error
            );
        }

        self.events.insert(0, error.to_event());
        let body = self.envelope(Vec::new(), elapsed);
        (status, Json(body)).into_response()
    }

    fn elapsed(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn envelope(self, responses: Vec<DataResult>, time: u64) -> RestResponse {
        let mut params = self.query_params;
        params.extend(self.path_params);
        if let Some(sid) = params.get_mut("sid") {
            *sid = MASKED.to_string();
        }
        RestResponse {
            api_version: self.api_version,
            time,
            params,
            events: self.events,
            responses,
        }
    }
}
