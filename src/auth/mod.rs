//! Authentication primitives.
//!
//! Session tokens are HS256 JWTs issued at login. Requests carry them in an
//! `Authorization: Bearer` header or, for older clients, in the `sid` query
//! parameter.

mod extractor;
mod jwt;
mod password;

pub use extractor::{TokenSource, extract_token};
pub use jwt::{Claims, TokenManager};
pub use password::PasswordHash;
