//! Bearer-token middleware for axum routes.
//!
//! On every request:
//! 1. Extract the token from `Authorization: Bearer <token>`
//! 2. Verify it with the configured [`TokenVerifier`]
//! 3. Check the issuer and any required scopes
//! 4. Insert `Arc<AuthInfo>` into request extensions for the handlers
//!
//! Failures never reach the handler. They are answered with 401/403, a
//! `WWW-Authenticate` header (RFC 6750 section 3) and a JSON error body.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use serde_json::Value;

use super::{AuthInfo, TokenVerifier};
use crate::error::VerificationError;

/// Reasons a request is turned away by [`require_bearer`].
#[derive(thiserror::Error, Debug)]
pub enum BearerAuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Authorization header must use the Bearer scheme")]
    InvalidAuthHeaderFormat,

    #[error("Bearer token is empty")]
    MissingBearerToken,

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Token issuer '{actual}' does not match '{expected}'")]
    InvalidIssuer { expected: String, actual: String },

    #[error("Token lacks required scopes: {}", .0.join(" "))]
    MissingRequiredScopes(Vec<String>),
}

impl BearerAuthError {
    /// HTTP status for the rejection.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingRequiredScopes(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// RFC 6750 error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MissingAuthHeader | Self::InvalidAuthHeaderFormat | Self::MissingBearerToken => {
                "invalid_request"
            }
            Self::Verification(_) | Self::InvalidIssuer { .. } => "invalid_token",
            Self::MissingRequiredScopes(_) => "insufficient_scope",
        }
    }

    /// Description safe to send to the client.
    ///
    /// Verification failures only expose their classification, never the
    /// identity provider's response body.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Verification(e) => format!("Token verification failed ({})", e.code()),
            other => other.to_string(),
        }
    }

    /// Build the `WWW-Authenticate` header value.
    ///
    /// A request without any credentials gets a bare challenge with no error
    /// code (RFC 6750 section 3.1).
    #[must_use]
    pub fn www_authenticate(&self, resource_metadata_url: Option<&str>) -> String {
        let mut params = Vec::new();
        if !matches!(self, Self::MissingAuthHeader) {
            params.push(format!("error=\"{}\"", self.error_code()));
            params.push(format!("error_description=\"{}\"", quote_safe(&self.description())));
        }
        if let Self::MissingRequiredScopes(scopes) = self {
            params.push(format!("scope=\"{}\"", quote_safe(&scopes.join(" "))));
        }
        if let Some(url) = resource_metadata_url {
            params.push(format!("resource_metadata=\"{}\"", quote_safe(url)));
        }

        if params.is_empty() {
            "Bearer".to_string()
        } else {
            format!("Bearer {}", params.join(", "))
        }
    }

    /// Render the rejection as an HTTP response.
    #[must_use]
    pub fn into_response_with(self, resource_metadata_url: Option<&str>) -> Response {
        let challenge = HeaderValue::from_str(&self.www_authenticate(resource_metadata_url))
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));

        let body = Json(serde_json::json!({
            "error": self.error_code(),
            "error_description": self.description(),
        }));

        let mut response = (self.status_code(), body).into_response();
        response.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
        response
    }
}

/// Shared state for the bearer-auth layer.
pub struct BearerAuth {
    verifier: Arc<dyn TokenVerifier>,
    issuer: String,
    required_scopes: Vec<String>,
    resource_metadata_url: Option<String>,
}

impl BearerAuth {
    /// Gate requests on tokens verified by `verifier` for `issuer`.
    pub fn new(verifier: Arc<dyn TokenVerifier>, issuer: impl Into<String>) -> Self {
        Self {
            verifier,
            issuer: issuer.into(),
            required_scopes: Vec::new(),
            resource_metadata_url: None,
        }
    }

    /// Require every token to carry these scopes.
    #[must_use]
    pub fn required_scopes(mut self, scopes: Vec<String>) -> Self {
        self.required_scopes = scopes;
        self
    }

    /// Advertise the protected-resource metadata URL in challenges.
    #[must_use]
    pub fn resource_metadata_url(mut self, url: Option<String>) -> Self {
        self.resource_metadata_url = url;
        self
    }

    /// Authenticate a request from its headers.
    ///
    /// The verifier is only called once a well-formed bearer token is present.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthInfo, BearerAuthError> {
        let token = extract_bearer_token(headers)?;
        let info = self.verifier.verify(token).await?;

        if let Some(iss) = info.claims.get("iss").and_then(Value::as_str) {
            if iss.trim_end_matches('/') != self.issuer.trim_end_matches('/') {
                return Err(BearerAuthError::InvalidIssuer {
                    expected: self.issuer.clone(),
                    actual: iss.to_string(),
                });
            }
        }

        if !self.required_scopes.is_empty() {
            let granted = info.scopes();
            let missing: Vec<String> = self
                .required_scopes
                .iter()
                .filter(|s| !granted.contains(s))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BearerAuthError::MissingRequiredScopes(missing));
            }
        }

        Ok(info)
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("issuer", &self.issuer)
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

/// axum middleware: `middleware::from_fn_with_state(auth, require_bearer)`.
pub async fn require_bearer(
    State(auth): State<Arc<BearerAuth>>,
    mut req: Request,
    next: Next,
) -> Response {
    match auth.authenticate(req.headers()).await {
        Ok(info) => {
            tracing::debug!(
                subject = ?info.subject,
                path = %req.uri().path(),
                "Request authenticated"
            );
            req.extensions_mut().insert(Arc::new(info));
            next.run(req).await
        }
        Err(e) => {
            tracing::info!(
                path = %req.uri().path(),
                error = %e,
                code = e.error_code(),
                "Rejected unauthenticated request"
            );
            e.into_response_with(auth.resource_metadata_url.as_deref())
        }
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, BearerAuthError> {
    let value = headers.get(header::AUTHORIZATION).ok_or(BearerAuthError::MissingAuthHeader)?;
    let value = value.to_str().map_err(|_| BearerAuthError::InvalidAuthHeaderFormat)?.trim();

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() {
                Err(BearerAuthError::MissingBearerToken)
            } else {
                Ok(token)
            }
        }
        None if value.eq_ignore_ascii_case("bearer") => Err(BearerAuthError::MissingBearerToken),
        _ => Err(BearerAuthError::InvalidAuthHeaderFormat),
    }
}

fn quote_safe(s: &str) -> String {
    s.replace(['"', '\\'], "'")
}
