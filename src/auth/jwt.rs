//! JWT issuing and validation.

use crate::Error;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Issues and validates HS256 session tokens.
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    expiration: Duration,
}

impl TokenManager {
    pub const ISSUER: &'static str = "catalogr";

    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: Self::ISSUER.to_string(),
            expiration: Duration::seconds(expiration_secs as i64),
        }
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration.num_seconds()
    }

    pub fn create_token(&self, user: &str) -> Result<String, Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.expiration).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("failed to create token: {}", e)))
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("token validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        Error::Authentication("Token expired".to_string())
                    }
                    _ => Error::Authentication("Invalid authentication token".to_string()),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let manager = TokenManager::new("test-secret", 3600);
        let token = manager.create_token("alice").unwrap();
        let claims = manager.validate(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, TokenManager::ISSUER);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_wrong_secret() {
        let token = TokenManager::new("one", 3600).create_token("alice").unwrap();
        let err = TokenManager::new("two", 3600).validate(&token).unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn test_garbage_token() {
        let manager = TokenManager::new("secret", 3600);
        assert!(manager.validate("not-a-valid-jwt").is_err());
    }
}
