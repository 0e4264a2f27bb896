//! MCP server implementation.
//!
//! Provides both HTTP (bearer-authenticated) and stdio transports.

pub mod jsonrpc;
pub mod session;
pub mod stdio;
pub mod transport;

use std::sync::Arc;

use crate::auth::{AuthorizationServerMetadata, TokenVerifier};
use crate::config::Config;
use crate::tools::{self, McpTool};

pub use stdio::StdioIdentity;

/// MCP server exposing the identity tools.
pub struct McpServer {
    config: Config,

    /// Registered tools.
    tools: Vec<Box<dyn McpTool>>,
}

impl McpServer {
    /// Create a new MCP server.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tools: tools::register_all_tools(),
        }
    }

    /// Run the server in stdio mode.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure.
    pub async fn run_stdio(self, identity: Option<StdioIdentity>) -> anyhow::Result<()> {
        tracing::info!("Starting MCP server in stdio mode");
        tracing::info!("Registered {} tools", self.tools.len());

        stdio::run_stdio(self.tools, identity).await
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(
        self,
        metadata: AuthorizationServerMetadata,
        verifier: Arc<dyn TokenVerifier>,
    ) -> anyhow::Result<()> {
        let addr = self.config.listen_addr();
        tracing::info!(
            addr = %addr,
            issuer = %self.config.issuer,
            "Starting MCP server in HTTP mode"
        );
        tracing::info!("Registered {} tools", self.tools.len());

        let router = transport::create_router(self.tools, &self.config, metadata, verifier);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("HTTP server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// Get tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&dyn McpTool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// List all available tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<(&str, &str)> {
        self.tools.iter().map(|t| (t.name(), t.description())).collect()
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer").field("tools", &self.tools.len()).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
