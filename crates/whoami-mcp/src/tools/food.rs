//! Food recommendation tool.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{McpTool, ToolContext, ToolOutput, expect_no_arguments, not_authenticated};
use crate::error::ToolResult;

/// Dishes to pick from, in selection order.
pub const SUGGESTIONS: [&str; 5] = [
    "Grilled salmon with quinoa",
    "Avocado toast with poached egg",
    "Greek yogurt with berries",
    "Chickpea salad with lemon dressing",
    "Oatmeal with banana and peanut butter",
];

/// Used when the identity has no `email` claim.
const UNKNOWN_USER: &str = "unknown";

/// Suggests a dish chosen from the caller's email.
pub struct FoodRecommendationTool;

#[async_trait::async_trait]
impl McpTool for FoodRecommendationTool {
    fn name(&self) -> &'static str {
        "food_recommendation"
    }

    fn description(&self) -> &'static str {
        "Suggests a healthy food option for the authenticated user."
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<ToolOutput> {
        expect_no_arguments(&input)?;

        let Some(auth) = ctx.auth_info().filter(|a| !a.claims.is_empty()) else {
            return Ok(not_authenticated());
        };

        let user = match auth.claims.get("email") {
            Some(Value::String(email)) => email.clone(),
            Some(other) => other.to_string(),
            None => UNKNOWN_USER.to_string(),
        };
        let dish = SUGGESTIONS[suggestion_index(&user, SUGGESTIONS.len())];

        tracing::debug!(user = %user, dish, "Recommending dish");

        let mut out = ToolOutput::new();
        out.insert("user".to_string(), Value::String(user.clone()));
        out.insert("suggested_dish".to_string(), Value::String(dish.to_string()));
        out.insert(
            "message".to_string(),
            Value::String(format!("Suggested dish for {user}: {dish}")),
        );
        Ok(out)
    }
}

/// Stable index into a list of `len` entries.
///
/// SHA-256 of the UTF-8 key, first eight bytes as a big-endian `u64`, modulo
/// `len`. The result does not depend on process, run or platform.
///
/// # Panics
///
/// Panics if `len` is zero.
#[must_use]
pub fn suggestion_index(key: &str, len: usize) -> usize {
    assert!(len > 0, "suggestion list must not be empty");

    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);

    (u64::from_be_bytes(prefix) % len as u64) as usize
}
