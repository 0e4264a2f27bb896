//! Authorization-server discovery.
//!
//! Fetches the issuer's metadata document once at startup. The document is
//! re-served unchanged at `/.well-known/oauth-authorization-server`, and its
//! `userinfo_endpoint` (when present) is where tokens get verified.

use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Well-known suffix for RFC 8414 metadata.
pub const OAUTH_WELL_KNOWN: &str = "/.well-known/oauth-authorization-server";

/// Well-known suffix for OpenID Connect discovery.
pub const OIDC_WELL_KNOWN: &str = "/.well-known/openid-configuration";

/// Kind of discovery document the issuer publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AuthServerType {
    /// OAuth 2.0 Authorization Server Metadata (RFC 8414)
    #[default]
    #[value(name = "oauth")]
    OAuth,
    /// OpenID Connect Discovery
    Oidc,
}

/// Unrecognized `AUTH_SERVER_TYPE` value.
#[derive(thiserror::Error, Debug)]
#[error("unknown auth server type '{0}', expected 'oauth' or 'oidc'")]
pub struct UnknownAuthServerType(String);

impl FromStr for AuthServerType {
    type Err = UnknownAuthServerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oauth" => Ok(Self::OAuth),
            "oidc" => Ok(Self::Oidc),
            other => Err(UnknownAuthServerType(other.to_string())),
        }
    }
}

/// Authorization-server metadata (RFC 8414 section 2).
///
/// Only `issuer` is required. Fields this server does not interpret are kept
/// in `extra` so the document is re-served as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Compute the discovery URL for an issuer.
///
/// RFC 8414 inserts the well-known segment between the host and the issuer's
/// path; OpenID Connect appends it to the issuer.
pub fn well_known_url(issuer: &str, kind: AuthServerType) -> ClientResult<Url> {
    let issuer_url = Url::parse(issuer)?;
    let path = issuer_url.path().trim_end_matches('/').to_string();

    let mut url = issuer_url;
    url.set_query(None);
    url.set_fragment(None);

    match kind {
        AuthServerType::OAuth => url.set_path(&format!("{OAUTH_WELL_KNOWN}{path}")),
        AuthServerType::Oidc => url.set_path(&format!("{path}{OIDC_WELL_KNOWN}")),
    }

    Ok(url)
}

/// Fetch and parse the issuer's metadata document.
///
/// `request_timeout` is the timeout `client` was built with; it is reported
/// when the request times out.
///
/// # Errors
///
/// Returns error on transport failure, a non-success status, or a document
/// without an `issuer`.
pub async fn fetch_server_config(
    client: &Client,
    issuer: &str,
    kind: AuthServerType,
    request_timeout: Duration,
) -> ClientResult<AuthorizationServerMetadata> {
    let url = well_known_url(issuer, kind)?;

    tracing::info!(url = %url, kind = ?kind, "Fetching authorization server metadata");

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ClientError::from_reqwest(e, request_timeout))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::error!(url = %url, status = status.as_u16(), "Metadata discovery failed");
        return Err(ClientError::status(status.as_u16(), text));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::from_reqwest(e, request_timeout))?;
    let metadata: AuthorizationServerMetadata = serde_json::from_slice(&body)?;

    if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        tracing::warn!(
            configured = %issuer,
            advertised = %metadata.issuer,
            "Discovered issuer differs from configured issuer"
        );
    }

    Ok(metadata)
}
