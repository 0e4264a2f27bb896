//! Authorization-server discovery tests.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use whoami_mcp::auth::metadata::{AuthServerType, fetch_server_config};
use whoami_mcp::auth::verifier::build_http_client;
use whoami_mcp::auth::{self, TokenVerifier};
use whoami_mcp::config::Config;
use whoami_mcp::error::ClientError;

fn metadata_json(issuer: &str, userinfo: Option<&str>) -> serde_json::Value {
    let mut doc = json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}authorize"),
        "token_endpoint": format!("{issuer}oauth/token"),
        "jwks_uri": format!("{issuer}.well-known/jwks.json"),
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256", "plain"]
    });
    if let Some(url) = userinfo {
        doc["userinfo_endpoint"] = json!(url);
    }
    doc
}

#[tokio::test]
async fn test_fetch_oauth_metadata() {
    let mock_server = MockServer::start().await;
    let config = Config::for_testing(&mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(metadata_json(&config.issuer, None)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = build_http_client(&config).unwrap();
    let metadata = fetch_server_config(
        &client,
        &config.issuer,
        AuthServerType::OAuth,
        config.request_timeout,
    )
    .await
    .unwrap();

    assert_eq!(metadata.issuer, config.issuer);
    assert_eq!(
        metadata.code_challenge_methods_supported.as_deref(),
        Some(&["S256".to_string(), "plain".to_string()][..])
    );
    assert!(metadata.userinfo_endpoint.is_none());
}

#[tokio::test]
async fn test_fetch_oidc_metadata() {
    let mock_server = MockServer::start().await;
    let mut config = Config::for_testing(&mock_server.uri());
    config.auth_server_type = AuthServerType::Oidc;

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_json(
            &config.issuer,
            Some(&format!("{}/me", mock_server.uri())),
        )))
        .mount(&mock_server)
        .await;

    let client = build_http_client(&config).unwrap();
    let metadata = fetch_server_config(
        &client,
        &config.issuer,
        AuthServerType::Oidc,
        config.request_timeout,
    )
    .await
    .unwrap();

    assert_eq!(metadata.userinfo_endpoint, Some(format!("{}/me", mock_server.uri())));
}

#[tokio::test]
async fn test_fetch_metadata_not_found() {
    let mock_server = MockServer::start().await;
    let config = Config::for_testing(&mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = build_http_client(&config).unwrap();
    let err = fetch_server_config(
        &client,
        &config.issuer,
        AuthServerType::OAuth,
        config.request_timeout,
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), Some(404));
}

#[tokio::test]
async fn test_fetch_metadata_without_issuer_is_parse_error() {
    let mock_server = MockServer::start().await;
    let config = Config::for_testing(&mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token_endpoint": "x"})),
        )
        .mount(&mock_server)
        .await;

    let client = build_http_client(&config).unwrap();
    let err = fetch_server_config(
        &client,
        &config.issuer,
        AuthServerType::OAuth,
        config.request_timeout,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ClientError::Parse(_)));
}

#[tokio::test]
async fn test_fetch_metadata_timeout_is_classified() {
    let mock_server = MockServer::start().await;
    let mut config = Config::for_testing(&mock_server.uri());
    config.request_timeout = Duration::from_millis(200);

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(metadata_json(&config.issuer, None))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let client = build_http_client(&config).unwrap();
    let err = fetch_server_config(
        &client,
        &config.issuer,
        AuthServerType::OAuth,
        config.request_timeout,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ClientError::Timeout(t) if t == Duration::from_millis(200)));
}

#[tokio::test]
async fn test_discover_uses_advertised_userinfo_endpoint() {
    let mock_server = MockServer::start().await;
    let config = Config::for_testing(&mock_server.uri());
    let userinfo = format!("{}/oauth/userinfo", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(metadata_json(&config.issuer, Some(&userinfo))),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth/userinfo"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": "u1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let idp = auth::discover(&config).await.unwrap();
    assert_eq!(idp.verifier.userinfo_url(), userinfo);

    let info = idp.verifier.verify("abc").await.unwrap();
    assert_eq!(info.subject.as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_discover_falls_back_to_issuer_userinfo() {
    let mock_server = MockServer::start().await;
    let config = Config::for_testing(&mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(metadata_json(&config.issuer, None)),
        )
        .mount(&mock_server)
        .await;

    let idp = auth::discover(&config).await.unwrap();
    assert_eq!(idp.verifier.userinfo_url(), format!("{}/userinfo", mock_server.uri()));
}

#[tokio::test]
async fn test_discover_prefers_configured_userinfo() {
    let mock_server = MockServer::start().await;
    let mut config = Config::for_testing(&mock_server.uri());
    config.userinfo_url = Some("https://override.example.com/me".to_string());

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_json(
            &config.issuer,
            Some("https://ignored.example.com/userinfo"),
        )))
        .mount(&mock_server)
        .await;

    let idp = auth::discover(&config).await.unwrap();
    assert_eq!(idp.verifier.userinfo_url(), "https://override.example.com/me");
}

#[tokio::test]
async fn test_discover_fails_when_metadata_unavailable() {
    let mock_server = MockServer::start().await;
    let config = Config::for_testing(&mock_server.uri());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let err = auth::discover(&config).await.unwrap_err();
    assert!(err.to_string().contains("authorization server metadata"));
}
