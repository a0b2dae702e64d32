pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod params;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
