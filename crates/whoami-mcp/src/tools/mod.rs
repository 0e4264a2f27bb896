//! MCP tool implementations.
//!
//! Tools read the caller's identity from the [`ToolContext`] handed to them
//! for each call; there is no ambient authentication state.

mod food;
mod whoami;

pub use food::{FoodRecommendationTool, SUGGESTIONS, suggestion_index};
pub use whoami::WhoAmITool;

use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::auth::AuthInfo;
use crate::error::{ToolError, ToolResult};

/// Payload returned to callers without a verified identity.
pub const NOT_AUTHENTICATED: &str = "Not authenticated";

/// Structured tool output: a JSON object.
pub type ToolOutput = Map<String, Value>;

/// Tool execution context, built per request.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Identity verified for this request, if any.
    pub auth: Option<Arc<AuthInfo>>,
}

impl ToolContext {
    /// Context for a request that carried a verified token.
    #[must_use]
    pub fn authenticated(auth: Arc<AuthInfo>) -> Self {
        Self { auth: Some(auth) }
    }

    /// Context for a request without an identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { auth: None }
    }

    /// The verified identity, if any.
    #[must_use]
    pub fn auth_info(&self) -> Option<&AuthInfo> {
        self.auth.as_deref()
    }
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g., "whoami").
    fn name(&self) -> &'static str;

    /// Tool description for LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value {
        no_arguments_schema()
    }

    /// Execute the tool with given input.
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<ToolOutput>;
}

/// Register all tools.
#[must_use]
pub fn register_all_tools() -> Vec<Box<dyn McpTool>> {
    vec![Box::new(WhoAmITool), Box::new(FoodRecommendationTool)]
}

/// Schema for a tool that takes no arguments.
#[must_use]
pub fn no_arguments_schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

/// `{"error": "Not authenticated"}`
#[must_use]
pub fn not_authenticated() -> ToolOutput {
    let mut out = ToolOutput::new();
    out.insert("error".to_string(), Value::String(NOT_AUTHENTICATED.to_string()));
    out
}

/// Accept only an object (or nothing) as tool arguments.
fn expect_no_arguments(input: &Value) -> ToolResult<()> {
    match input {
        Value::Null | Value::Object(_) => Ok(()),
        _ => Err(ToolError::validation("arguments", "must be an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        let tools = register_all_tools();
        let names: Vec<_> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["whoami", "food_recommendation"]);
    }

    #[test]
    fn test_not_authenticated_payload() {
        assert_eq!(Value::Object(not_authenticated()), json!({"error": "Not authenticated"}));
    }

    #[test]
    fn test_expect_no_arguments() {
        assert!(expect_no_arguments(&Value::Null).is_ok());
        assert!(expect_no_arguments(&json!({})).is_ok());
        assert!(expect_no_arguments(&json!([1])).is_err());
    }

    #[test]
    fn test_default_context_is_anonymous() {
        assert!(ToolContext::default().auth_info().is_none());
        assert!(ToolContext::anonymous().auth.is_none());
    }
}
