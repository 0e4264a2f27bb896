//! Identity echo tool.

use serde_json::Value;

use super::{McpTool, ToolContext, ToolOutput, expect_no_arguments, not_authenticated};
use crate::error::ToolResult;

/// Returns the caller's claims exactly as the identity provider sent them.
pub struct WhoAmITool;

#[async_trait::async_trait]
impl McpTool for WhoAmITool {
    fn name(&self) -> &'static str {
        "whoami"
    }

    fn description(&self) -> &'static str {
        "A tool that returns the current user's information."
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<ToolOutput> {
        expect_no_arguments(&input)?;

        Ok(ctx.auth_info().map_or_else(not_authenticated, |auth| auth.claims.clone()))
    }
}
