use crate::types::{Event, RestResponse};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn permission_denied(user: &str, action: &str, target: &str) -> Self {
        Error::Authorization(format!(
            "Permission denied. User '{}' cannot {} {}",
            user, action, target
        ))
    }

    pub fn missing(param: &str) -> Self {
        Error::InvalidParameter(format!("Missing mandatory parameter '{}'", param))
    }

    pub fn not_implemented(what: &str) -> Self {
        Error::NotImplemented(format!("{} is not implemented", what))
    }

    /// Name echoed in the `events` array of an error envelope.
    pub fn name(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "AuthenticationException",
            Error::Authorization(_) => "AuthorizationException",
            Error::NotFound(_) => "NotFoundException",
            Error::AlreadyExists(_) => "AlreadyExistsException",
            Error::InvalidParameter(_) => "ParameterException",
            Error::NotImplemented(_) => "NotImplementedException",
            Error::Io(_) => "IOException",
            Error::Internal(_) => "InternalException",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_event(&self) -> Event {
        Event::error(self.name(), self.to_string())
    }
}

/// Failures raised before a handler runs (extractor rejections) still
/// produce a well-formed envelope, without echoed parameters.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = RestResponse {
            api_version: String::new(),
            time: 0,
            params: Default::default(),
            events: vec![self.to_event()],
            responses: Vec::new(),
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::Authentication("bad token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Authorization("nope".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::NotFound("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::not_implemented("import").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_event_echoes_message() {
        let event = Error::InvalidParameter("Missing mandatory parameter 'study'".into()).to_event();
        assert_eq!(event.name, "ParameterException");
        assert_eq!(event.message, "Missing mandatory parameter 'study'");
    }
}
