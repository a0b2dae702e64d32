use crate::params::Limits;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "catalogr")]
#[command(about = "REST web services for a biomedical data catalog")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "CATALOG_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "CATALOG_PORT", default_value = "9090")]
    pub port: u16,

    /// Version segment every web service is served under (e.g. v2)
    #[arg(long, env = "CATALOG_API_VERSION", default_value = "v2")]
    pub api_version: String,

    /// Directory holding uploaded files and job logs
    #[arg(long, env = "CATALOG_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Enable CORS for all origins
    #[arg(long, env = "CATALOG_CORS", default_value = "true")]
    pub cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Maximum payload size in bytes
    #[arg(long, env = "CATALOG_MAX_PAYLOAD", default_value = "104857600")]
    pub max_payload: usize,

    /// Results returned when a search does not set `limit`
    #[arg(long, env = "CATALOG_DEFAULT_LIMIT", default_value = "10")]
    pub default_limit: usize,

    /// Largest `limit` accepted
    #[arg(long, env = "CATALOG_MAX_LIMIT", default_value = "5000")]
    pub max_limit: usize,

    /// Secret used to sign session tokens
    #[arg(long, env = "CATALOG_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Session token lifetime in seconds
    #[arg(long, env = "CATALOG_TOKEN_EXPIRATION", default_value = "3600")]
    pub token_expiration: u64,

    /// Administrator account created at startup
    #[arg(long, env = "CATALOG_ADMIN_USER", default_value = "opencga")]
    pub admin_user: String,

    /// Administrator password
    #[arg(long, env = "CATALOG_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: String,
}

impl Config {
    pub fn limits(&self) -> Limits {
        Limits {
            default_limit: self.default_limit.min(self.max_limit),
            max_limit: self.max_limit,
        }
    }

    /// Version segment without surrounding slashes.
    pub fn api_prefix(&self) -> &str {
        self.api_version.trim_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Config {
        let mut argv = vec![
            "catalogr",
            "--secret-key",
            "secret",
            "--admin-password",
            "admin",
        ];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.api_version, "v2");
        assert_eq!(config.admin_user, "opencga");
        assert_eq!(config.token_expiration, 3600);
        assert_eq!(config.limits(), Limits::default());
    }

    #[test]
    fn test_default_limit_capped_by_max() {
        let config = config(&["--default-limit", "500", "--max-limit", "100"]);
        assert_eq!(
            config.limits(),
            Limits {
                default_limit: 100,
                max_limit: 100,
            }
        );
    }

    #[test]
    fn test_api_prefix() {
        let config = config(&["--api-version", "/v3/"]);
        assert_eq!(config.api_prefix(), "v3");
    }
}
