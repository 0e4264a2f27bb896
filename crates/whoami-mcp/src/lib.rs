//! WhoAmI MCP Server
//!
//! A Model Context Protocol (MCP) server that exposes identity tools behind
//! OAuth2 bearer-token authentication. Tokens are verified against the
//! identity provider's userinfo endpoint, and the resulting claims are handed
//! to each tool call as request-scoped context.
//!
//! # Tools
//!
//! - **whoami**: the caller's claims as returned by the identity provider
//! - **food_recommendation**: a dish picked deterministically from the caller's email
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use whoami_mcp::{auth, config::Config, server::McpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let idp = auth::discover(&config).await?;
//!
//!     McpServer::new(config).run_http(idp.metadata, Arc::new(idp.verifier)).await
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod tools;

pub use auth::{AuthInfo, TokenVerifier, UserinfoVerifier};
pub use config::Config;
pub use error::{ClientError, ToolError, VerificationError};
