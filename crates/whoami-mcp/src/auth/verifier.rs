//! Token verification against the identity provider's userinfo endpoint.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use super::{AuthInfo, Claims};
use crate::config::Config;
use crate::error::{ClientError, VerificationError, VerificationResult};

/// Resolves a bearer token into a verified identity.
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return the identity it belongs to.
    async fn verify(&self, token: &str) -> VerificationResult<AuthInfo>;
}

/// Verifies tokens by presenting them to the userinfo endpoint.
///
/// Every call is a fresh round-trip; nothing is cached or retried.
#[derive(Clone)]
pub struct UserinfoVerifier {
    /// HTTP client.
    client: Client,

    /// Userinfo endpoint.
    userinfo_url: String,

    /// Issuer recorded on every identity.
    issuer: String,

    /// Request timeout, reported on timeouts.
    request_timeout: Duration,
}

impl UserinfoVerifier {
    /// Create a verifier for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config, userinfo_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            userinfo_url: userinfo_url.into(),
            issuer: config.issuer.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// Create a verifier reusing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, config: &Config, userinfo_url: impl Into<String>) -> Self {
        Self {
            client,
            userinfo_url: userinfo_url.into(),
            issuer: config.issuer.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// The endpoint tokens are checked against.
    #[must_use]
    pub fn userinfo_url(&self) -> &str {
        &self.userinfo_url
    }

    async fn fetch_userinfo(&self, token: &str) -> Result<Vec<u8>, ClientError> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, self.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::status(status.as_u16(), text));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::from_reqwest(e, self.request_timeout))?;
        Ok(body.to_vec())
    }
}

#[async_trait::async_trait]
impl TokenVerifier for UserinfoVerifier {
    async fn verify(&self, token: &str) -> VerificationResult<AuthInfo> {
        let body = self.fetch_userinfo(token).await.map_err(|e| {
            tracing::warn!(
                error = %e,
                code = "token_verification_failed",
                "Userinfo request failed"
            );
            VerificationError::TokenVerificationFailed(e)
        })?;

        let claims: Claims = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(
                error = %e,
                code = "invalid_token",
                "Userinfo response is not a claims object"
            );
            VerificationError::InvalidToken(e)
        })?;

        let info = AuthInfo::from_claims(token, self.issuer.clone(), claims).map_err(|e| {
            tracing::warn!(
                error = %e,
                code = "invalid_token",
                "Userinfo claims have the wrong shape"
            );
            VerificationError::InvalidToken(e)
        })?;

        tracing::debug!(subject = ?info.subject, "Token verified");
        Ok(info)
    }
}

impl std::fmt::Debug for UserinfoVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserinfoVerifier")
            .field("userinfo_url", &self.userinfo_url)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Build the HTTP client used for all identity-provider calls.
///
/// # Errors
///
/// Returns error if HTTP client initialization fails.
pub fn build_http_client(config: &Config) -> anyhow::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let client = Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .gzip(true)
        .build()?;

    Ok(client)
}
