//! Bearer-token authentication.
//!
//! - [`verifier`]: resolves a bearer token to an [`AuthInfo`] via the identity
//!   provider's userinfo endpoint
//! - [`metadata`]: authorization-server discovery (RFC 8414 / OpenID Connect)
//! - [`middleware`]: axum layer that gates routes on a verified token and puts
//!   the identity into request extensions

pub mod metadata;
pub mod middleware;
pub mod verifier;

pub use metadata::{AuthServerType, AuthorizationServerMetadata};
pub use middleware::{BearerAuth, BearerAuthError};
pub use verifier::{TokenVerifier, UserinfoVerifier};

use std::fmt::Write as _;

use anyhow::Context;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::Config;

/// Claims as returned by the identity provider: an open JSON object.
pub type Claims = serde_json::Map<String, Value>;

/// A verified identity, scoped to a single request.
#[derive(Clone, PartialEq)]
pub struct AuthInfo {
    /// The bearer token that was verified.
    pub token: String,

    /// User identifier (the `sub` claim), when the provider sends one.
    pub subject: Option<String>,

    /// Issuer this identity was verified against.
    pub issuer: String,

    /// Every claim the identity provider returned, unmodified.
    pub claims: Claims,
}

impl AuthInfo {
    /// Build an identity from a userinfo JSON object.
    ///
    /// `sub` must be a string when present.
    pub fn from_claims(
        token: impl Into<String>,
        issuer: impl Into<String>,
        claims: Claims,
    ) -> Result<Self, serde_json::Error> {
        let subject = match claims.get("sub") {
            Some(sub) => Some(serde_json::from_value::<String>(sub.clone())?),
            None => None,
        };

        Ok(Self {
            token: token.into(),
            subject,
            issuer: issuer.into(),
            claims,
        })
    }

    /// Scopes granted to the token, from a space-delimited `scope` claim or a
    /// `scope`/`scp` array.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        let raw = self.claims.get("scope").or_else(|| self.claims.get("scp"));
        match raw {
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(Value::Array(items)) => {
                items.iter().filter_map(|v| v.as_str()).map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    /// The `email` claim if it is a string.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.claims.get("email").and_then(Value::as_str)
    }

    /// Key identifying the owner of per-identity resources such as SSE
    /// sessions: the subject, or a SHA-256 of the token when there is no `sub`.
    #[must_use]
    pub fn owner_key(&self) -> String {
        if let Some(subject) = &self.subject {
            return format!("sub:{subject}");
        }

        let digest = Sha256::digest(self.token.as_bytes());
        digest.iter().fold(String::from("token:"), |mut key, byte| {
            let _ = write!(key, "{byte:02x}");
            key
        })
    }
}

/// Identity-provider wiring resolved at startup.
#[derive(Debug)]
pub struct IdentityProvider {
    /// The issuer's discovery document.
    pub metadata: AuthorizationServerMetadata,

    /// Verifier bound to the resolved userinfo endpoint.
    pub verifier: UserinfoVerifier,
}

/// Fetch the issuer's metadata and build the token verifier.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built or discovery fails.
pub async fn discover(config: &Config) -> anyhow::Result<IdentityProvider> {
    let client = verifier::build_http_client(config)?;

    let metadata = metadata::fetch_server_config(
        &client,
        &config.issuer,
        config.auth_server_type,
        config.request_timeout,
    )
    .await
    .with_context(|| {
        format!("failed to fetch authorization server metadata for {}", config.issuer)
    })?;

    let userinfo_url = resolve_userinfo_url(config, Some(&metadata));
    tracing::info!(userinfo_url = %userinfo_url, "Resolved userinfo endpoint");

    let verifier = UserinfoVerifier::with_client(client, config, userinfo_url);
    Ok(IdentityProvider { metadata, verifier })
}

/// Userinfo endpoint: explicit configuration, then discovery, then
/// `<issuer>/userinfo`.
#[must_use]
pub fn resolve_userinfo_url(
    config: &Config,
    metadata: Option<&AuthorizationServerMetadata>,
) -> String {
    config
        .userinfo_url
        .clone()
        .or_else(|| metadata.and_then(|m| m.userinfo_endpoint.clone()))
        .unwrap_or_else(|| config.fallback_userinfo_url())
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("claims", &self.claims.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn claims(value: Value) -> Claims {
        match value {
            Value::Object(map) => map,
            _ => panic!("test claims must be an object"),
        }
    }

    #[test]
    fn test_from_claims_extracts_subject() {
        let info = AuthInfo::from_claims(
            "abc",
            "https://idp.example.com/",
            claims(json!({"sub": "u1", "email": "a@x.com"})),
        )
        .unwrap();

        assert_eq!(info.subject.as_deref(), Some("u1"));
        assert_eq!(info.email(), Some("a@x.com"));
        assert_eq!(info.claims.len(), 2);
    }

    #[test]
    fn test_from_claims_without_sub() {
        let info = AuthInfo::from_claims("abc", "iss", claims(json!({"name": "Ada"}))).unwrap();
        assert!(info.subject.is_none());
    }

    #[test]
    fn test_from_claims_rejects_non_string_sub() {
        assert!(AuthInfo::from_claims("abc", "iss", claims(json!({"sub": 42}))).is_err());
        assert!(AuthInfo::from_claims("abc", "iss", claims(json!({"sub": null}))).is_err());
    }

    #[test]
    fn test_scopes_from_string_and_array() {
        let info =
            AuthInfo::from_claims("t", "i", claims(json!({"scope": "openid  profile"}))).unwrap();
        assert_eq!(info.scopes(), vec!["openid", "profile"]);

        let info =
            AuthInfo::from_claims("t", "i", claims(json!({"scp": ["read", 1, "write"]}))).unwrap();
        assert_eq!(info.scopes(), vec!["read", "write"]);

        let info = AuthInfo::from_claims("t", "i", Claims::new()).unwrap();
        assert!(info.scopes().is_empty());
    }

    #[test]
    fn test_owner_key() {
        let with_sub = AuthInfo::from_claims("t1", "iss", claims(json!({"sub": "u1"}))).unwrap();
        assert_eq!(with_sub.owner_key(), "sub:u1");

        let alice =
            AuthInfo::from_claims("alice", "iss", claims(json!({"email": "alice@x.com"})))
                .unwrap();
        let mallory =
            AuthInfo::from_claims("mallory", "iss", claims(json!({"email": "mallory@x.com"})))
                .unwrap();

        assert!(alice.owner_key().starts_with("token:"));
        assert_eq!(alice.owner_key().len(), "token:".len() + 64);
        assert_ne!(alice.owner_key(), mallory.owner_key());
        assert!(!alice.owner_key().contains("alice"));
    }

    #[test]
    fn test_resolve_userinfo_url_precedence() {
        let mut config = Config::new("https://idp.example.com/");
        let metadata: AuthorizationServerMetadata = serde_json::from_value(json!({
            "issuer": "https://idp.example.com/",
            "userinfo_endpoint": "https://idp.example.com/oauth/userinfo"
        }))
        .unwrap();

        assert_eq!(resolve_userinfo_url(&config, None), "https://idp.example.com/userinfo");
        assert_eq!(
            resolve_userinfo_url(&config, Some(&metadata)),
            "https://idp.example.com/oauth/userinfo"
        );

        config.userinfo_url = Some("https://override.example.com/me".to_string());
        assert_eq!(
            resolve_userinfo_url(&config, Some(&metadata)),
            "https://override.example.com/me"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let info = AuthInfo::from_claims("super-secret-token", "iss", Claims::new()).unwrap();
        let debug = format!("{info:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("issuer"));
    }
}
