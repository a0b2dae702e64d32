//! Session token lookup on incoming requests.

use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Where a session token was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer <token>`
    Header,
    /// Legacy `sid` query parameter.
    Sid,
}

/// Extract the caller's token, preferring the Bearer header over `sid`.
pub fn extract_token(headers: &HeaderMap, sid: Option<&str>) -> Option<(String, TokenSource)> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some((token.to_string(), TokenSource::Header));
    }

    sid.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), TokenSource::Sid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(
            extract_token(&headers, Some("legacy")),
            Some(("abc".to_string(), TokenSource::Header))
        );
    }

    #[test]
    fn test_sid_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_token(&headers, Some("legacy")),
            Some(("legacy".to_string(), TokenSource::Sid))
        );
        assert_eq!(extract_token(&headers, None), None);
    }

    #[test]
    fn test_non_bearer_scheme_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&headers, None), None);
    }
}
