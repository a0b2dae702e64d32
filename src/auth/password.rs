//! Salted HMAC-SHA256 password hashes.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Stored form of a user password.
#[derive(Debug, Clone)]
pub struct PasswordHash {
    salt: String,
    hash: String,
}

impl PasswordHash {
    pub fn new(password: &str) -> Self {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let hash = URL_SAFE_NO_PAD.encode(Self::mac(&salt, password).finalize().into_bytes());
        Self { salt, hash }
    }

    pub fn verify(&self, password: &str) -> bool {
        let Ok(expected) = URL_SAFE_NO_PAD.decode(&self.hash) else {
            return false;
        };
        Self::mac(&self.salt, password).verify_slice(&expected).is_ok()
    }

    fn mac(salt: &str, password: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC can take key of any size");
        mac.update(password.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let hash = PasswordHash::new("s3cret");
        assert!(hash.verify("s3cret"));
        assert!(!hash.verify("S3cret"));
    }

    #[test]
    fn test_salted() {
        let a = PasswordHash::new("same");
        let b = PasswordHash::new("same");
        assert_ne!(a.hash, b.hash);
    }
}
