//! WhoAmI MCP Server - Entry Point
//!
//! Provides both HTTP (bearer-authenticated) and stdio transports.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use whoami_mcp::auth::{self, AuthServerType};
use whoami_mcp::config::{Config, defaults, parse_scope_list};
use whoami_mcp::server::{McpServer, StdioIdentity};

#[derive(Parser, Debug)]
#[command(name = "whoami-mcp")]
#[command(about = "MCP server exposing identity tools behind OAuth2 bearer authentication")]
#[command(version)]
struct Cli {
    /// Transport mode: http or stdio
    #[arg(long, default_value = "http")]
    transport: Transport,

    /// Listen host (only used with --transport http)
    #[arg(long, default_value = defaults::HOST, env = "HOST")]
    host: String,

    /// Listen port (only used with --transport http)
    #[arg(long, default_value_t = defaults::PORT, env = "PORT")]
    port: u16,

    /// Issuer URL of the authorization server
    #[arg(long, default_value = defaults::ISSUER, env = "AUTH_ISSUER")]
    issuer: String,

    /// Discovery document published by the issuer
    #[arg(long, value_enum, default_value = "oauth", env = "AUTH_SERVER_TYPE")]
    auth_server_type: AuthServerType,

    /// Userinfo endpoint (defaults to the discovered one, then <issuer>/userinfo)
    #[arg(long, env = "USERINFO_URL")]
    userinfo_url: Option<String>,

    /// Public URL of this server, advertised in protected-resource metadata
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Scope every bearer token must carry (repeatable, or comma separated in the env var)
    #[arg(long = "required-scope", env = "MCP_REQUIRED_SCOPES", value_delimiter = ',')]
    required_scopes: Vec<String>,

    /// Timeout for calls to the identity provider, in seconds
    #[arg(
        long,
        default_value_t = defaults::REQUEST_TIMEOUT.as_secs(),
        env = "REQUEST_TIMEOUT_SECS"
    )]
    request_timeout_secs: u64,

    /// Access token presented for tool calls in stdio mode
    #[arg(long, env = "MCP_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Transport {
    /// HTTP with bearer authentication
    #[default]
    Http,
    /// Standard input/output
    Stdio,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::new(self.issuer.clone());
        config.auth_server_type = self.auth_server_type;
        config.userinfo_url.clone_from(&self.userinfo_url);
        config.host.clone_from(&self.host);
        config.port = self.port;
        config.base_url.clone_from(&self.base_url);
        config.required_scopes =
            self.required_scopes.iter().flat_map(|s| parse_scope_list(s)).collect();
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config
    }
}

/// Logs go to stderr so stdout stays clean for the stdio transport.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        "Starting WhoAmI MCP server"
    );

    let config = cli.config();

    match cli.transport {
        Transport::Http => {
            let idp = auth::discover(&config).await?;
            McpServer::new(config).run_http(idp.metadata, Arc::new(idp.verifier)).await?;
        }
        Transport::Stdio => {
            let identity = match cli.access_token {
                Some(token) => {
                    let idp = auth::discover(&config).await?;
                    Some(StdioIdentity::new(Arc::new(idp.verifier), token))
                }
                None => {
                    tracing::warn!("No access token configured, tools will run unauthenticated");
                    None
                }
            };
            McpServer::new(config).run_stdio(identity).await?;
        }
    }

    Ok(())
}
