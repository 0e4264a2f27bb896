//! Configuration for the WhoAmI MCP server.

use std::time::Duration;

use anyhow::Context;

use crate::auth::metadata::AuthServerType;

/// Deployment defaults.
pub mod defaults {
    use std::time::Duration;

    /// Issuer of the identity provider the server trusts.
    pub const ISSUER: &str = "https://dev-u2gjr1qq43hqstd0.us.auth0.com/";

    /// Listen address (all interfaces).
    pub const HOST: &str = "0.0.0.0";

    /// Listen port.
    pub const PORT: u16 = 8031;

    /// Timeout for a single userinfo or discovery request.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Path appended to the issuer when neither the configuration nor the
    /// discovery document names a userinfo endpoint.
    pub const USERINFO_PATH: &str = "userinfo";
}

/// Server configuration.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Issuer URL of the authorization server.
    pub issuer: String,

    /// Which discovery document the issuer publishes.
    pub auth_server_type: AuthServerType,

    /// Explicit userinfo endpoint. Overrides discovery when set.
    pub userinfo_url: Option<String>,

    /// Listen host.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Public URL of this server, advertised in protected-resource metadata.
    pub base_url: Option<String>,

    /// Scopes every bearer token must carry.
    pub required_scopes: Vec<String>,

    /// Request timeout for calls to the identity provider.
    pub request_timeout: Duration,

    /// Connection timeout for calls to the identity provider.
    pub connect_timeout: Duration,
}

impl Config {
    /// Create a configuration for the given issuer with default settings.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            auth_server_type: AuthServerType::OAuth,
            userinfo_url: None,
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            base_url: None,
            required_scopes: Vec::new(),
            request_timeout: defaults::REQUEST_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
        }
    }

    /// Create a test configuration pointing the issuer at a mock server.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            issuer: format!("{}/", base_url.trim_end_matches('/')),
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            ..Self::new(base_url)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `AUTH_ISSUER`, `AUTH_SERVER_TYPE`, `USERINFO_URL`, `HOST`, `PORT`,
    /// `BASE_URL`, `MCP_REQUIRED_SCOPES` (comma separated) and
    /// `REQUEST_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let issuer = std::env::var("AUTH_ISSUER").unwrap_or_else(|_| defaults::ISSUER.to_string());
        let mut config = Self::new(issuer);

        if let Ok(kind) = std::env::var("AUTH_SERVER_TYPE") {
            config.auth_server_type = kind.parse()?;
        }
        config.userinfo_url = std::env::var("USERINFO_URL").ok();
        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse().with_context(|| format!("invalid PORT: {port}"))?;
        }
        config.base_url = std::env::var("BASE_URL").ok();
        if let Ok(scopes) = std::env::var("MCP_REQUIRED_SCOPES") {
            config.required_scopes = parse_scope_list(&scopes);
        }
        if let Ok(secs) = std::env::var("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("invalid REQUEST_TIMEOUT_SECS: {secs}"))?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// The issuer with any trailing slash removed.
    #[must_use]
    pub fn issuer_base(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }

    /// Userinfo endpoint derived from the issuer alone.
    #[must_use]
    pub fn fallback_userinfo_url(&self) -> String {
        format!("{}/{}", self.issuer_base(), defaults::USERINFO_PATH)
    }

    /// URL of the protected-resource metadata document, if a public base URL is known.
    #[must_use]
    pub fn resource_metadata_url(&self) -> Option<String> {
        self.base_url.as_deref().map(|base| {
            format!("{}/.well-known/oauth-protected-resource", base.trim_end_matches('/'))
        })
    }

    /// Socket address string for the listener.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(defaults::ISSUER)
    }
}

/// Split a comma or whitespace separated scope list.
#[must_use]
pub fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
