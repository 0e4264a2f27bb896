//! Stdio transport for MCP protocol.
//!
//! Handles newline-delimited JSON-RPC 2.0 over stdin/stdout. There is no HTTP
//! header to carry a token, so an access token may be configured up front; it
//! is verified again for every `tools/call`.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::jsonrpc::{self, JsonRpcRequest, JsonRpcResponse, codes};
use crate::auth::TokenVerifier;
use crate::tools::{McpTool, ToolContext};

/// Token presented on behalf of the local client.
pub struct StdioIdentity {
    verifier: Arc<dyn TokenVerifier>,
    token: String,
}

impl StdioIdentity {
    pub fn new(verifier: Arc<dyn TokenVerifier>, token: impl Into<String>) -> Self {
        Self {
            verifier,
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StdioIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioIdentity").finish_non_exhaustive()
    }
}

/// Handle MCP protocol over the process's stdin/stdout.
pub async fn run_stdio(
    tools: Vec<Box<dyn McpTool>>,
    identity: Option<StdioIdentity>,
) -> anyhow::Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    serve(reader, writer, &tools, identity.as_ref()).await
}

/// Serve requests from `reader` until EOF, writing responses to `writer`.
pub async fn serve<R, W>(
    mut reader: R,
    mut writer: W,
    tools: &[Box<dyn McpTool>],
    identity: Option<&StdioIdentity>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    tracing::info!(
        authenticated = identity.is_some(),
        "MCP stdio server ready, waiting for requests..."
    );

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            tracing::info!("Stdin closed, shutting down");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(req) => req,
            Err(e) => {
                let error_response =
                    JsonRpcResponse::error(None, codes::PARSE_ERROR, format!("Parse error: {}", e));
                write_response(&mut writer, &error_response).await?;
                continue;
            }
        };

        tracing::debug!(method = %request.method, "Received request");

        if let Some(response) = handle(&request, tools, identity).await {
            write_response(&mut writer, &response).await?;
        }
    }

    Ok(())
}

async fn handle(
    request: &JsonRpcRequest,
    tools: &[Box<dyn McpTool>],
    identity: Option<&StdioIdentity>,
) -> Option<JsonRpcResponse> {
    let ctx = match (request.method.as_str(), identity) {
        ("tools/call", Some(identity)) => match identity.verifier.verify(&identity.token).await {
            Ok(info) => ToolContext::authenticated(Arc::new(info)),
            Err(e) => {
                tracing::warn!(error = %e, code = %e.code(), "Configured access token rejected");
                if request.is_notification() {
                    return None;
                }
                return Some(JsonRpcResponse::error(
                    request.id.clone(),
                    codes::UNAUTHORIZED,
                    format!("Unauthorized: {}", e.code()),
                ));
            }
        },
        _ => ToolContext::anonymous(),
    };

    jsonrpc::handle_request(request, tools, &ctx).await
}

async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response_json = serde_json::to_string(response)?;
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::auth::{AuthInfo, Claims};
    use crate::error::{ClientError, VerificationResult};
    use crate::tools::register_all_tools;

    struct FixedVerifier(bool);

    #[async_trait::async_trait]
    impl TokenVerifier for FixedVerifier {
        async fn verify(&self, token: &str) -> VerificationResult<AuthInfo> {
            if !self.0 {
                return Err(ClientError::status(401, "nope").into());
            }
            let mut claims = Claims::new();
            claims.insert("sub".to_string(), json!("u1"));
            Ok(AuthInfo::from_claims(token, "iss", claims).unwrap())
        }
    }

    async fn run(input: &str, identity: Option<StdioIdentity>) -> Vec<Value> {
        let tools = register_all_tools();
        let mut output = Vec::new();
        serve(input.as_bytes(), &mut output, &tools, identity.as_ref()).await.unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_parse_error_and_notification() {
        let input = "not json\n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\n";
        let responses = run(input, None).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], codes::PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_anonymous_whoami() {
        let input = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"whoami"}}"#;
        let responses = run(&format!("{input}\n"), None).await;

        assert_eq!(responses[0]["result"]["structuredContent"]["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_verified_token_whoami() {
        let identity = StdioIdentity::new(Arc::new(FixedVerifier(true)), "abc");
        let input = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"whoami"}}"#;
        let responses = run(&format!("{input}\n"), Some(identity)).await;

        assert_eq!(responses[0]["result"]["structuredContent"], json!({"sub": "u1"}));
    }

    #[tokio::test]
    async fn test_rejected_token_on_notification_is_silent() {
        let identity = StdioIdentity::new(Arc::new(FixedVerifier(false)), "expired");
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"whoami"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let responses = run(input, Some(identity)).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 2);
        assert!(responses[0].get("error").is_none());
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let identity = StdioIdentity::new(Arc::new(FixedVerifier(false)), "expired");
        let input = r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"whoami"}}"#;
        let responses = run(&format!("{input}\n"), Some(identity)).await;

        assert_eq!(responses[0]["id"], 7);
        assert_eq!(responses[0]["error"]["code"], codes::UNAUTHORIZED);
    }
}
