//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The GitHub client id can be supplied via GITHUB_CLIENT_ID instead of
//! the TOML file; it is not a secret, but it is deployment-specific.
//! The client *secret* never appears here at all, it lives behind the
//! token-exchange proxy.

use github_auth::constants::{DEFAULT_SCOPES, DEFAULT_TOKEN_TTL_SECS, USER_ENDPOINT};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub github: GithubConfig,
    pub exchange: ExchangeConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// GitHub OAuth app settings
#[derive(Debug, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
}

/// Token-exchange proxy settings
#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    pub proxy_url: String,
    #[serde(default = "default_user_endpoint")]
    pub user_endpoint: String,
    #[serde(default = "default_token_ttl_secs")]
    pub default_token_ttl_secs: u64,
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Local persistence settings
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub state_dir: PathBuf,
}

fn default_scopes() -> String {
    DEFAULT_SCOPES.to_string()
}

fn default_user_endpoint() -> String {
    USER_ENDPOINT.to_string()
}

fn default_token_ttl_secs() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_max_connections() -> usize {
    1000
}

fn require_http_url(name: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client id resolution order:
    /// 1. GITHUB_CLIENT_ID env var
    /// 2. `[github] client_id` from the file
    ///
    /// A missing client id is not a load error: the gateway still serves
    /// the session and health endpoints, and only `begin_login` fails.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http_url("redirect_uri", &config.github.redirect_uri)?;
        require_http_url("proxy_url", &config.exchange.proxy_url)?;
        require_http_url("user_endpoint", &config.exchange.user_endpoint)?;

        if config.exchange.default_token_ttl_secs == 0 {
            return Err(common::Error::Config(
                "default_token_ttl_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if let Ok(id) = std::env::var("GITHUB_CLIENT_ID")
            && !id.is_empty()
        {
            config.github.client_id = id;
        }
        if config.github.client_id.is_empty() {
            warn!("no GitHub client_id configured, login attempts will fail");
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("login-gateway.toml")
    }
}
