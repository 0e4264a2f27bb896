//! Property-based tests for dish selection.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Value, json};

use whoami_mcp::auth::{AuthInfo, Claims};
use whoami_mcp::tools::{
    FoodRecommendationTool, McpTool, SUGGESTIONS, ToolContext, suggestion_index,
};

fn context_with_email(email: &str) -> ToolContext {
    let mut claims = Claims::new();
    claims.insert("sub".to_string(), json!("u1"));
    claims.insert("email".to_string(), json!(email));
    let info = AuthInfo::from_claims("token", "https://idp.example.com/", claims).expect("claims");
    ToolContext::authenticated(Arc::new(info))
}

proptest! {
    /// The index is always within range.
    #[test]
    fn index_in_range(key in ".*", len in 1usize..64) {
        prop_assert!(suggestion_index(&key, len) < len);
    }

    /// The same key always maps to the same index.
    #[test]
    fn index_is_deterministic(key in ".*") {
        prop_assert_eq!(
            suggestion_index(&key, SUGGESTIONS.len()),
            suggestion_index(&key, SUGGESTIONS.len())
        );
    }

    /// The tool's choice is a listed dish and matches the index for the email.
    #[test]
    fn tool_choice_matches_index(email in "[a-z0-9._]{1,20}@[a-z]{1,10}\\.(com|org|io)") {
        let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
        let out = runtime
            .block_on(FoodRecommendationTool.execute(&context_with_email(&email), Value::Null))
            .expect("tool output");

        let dish = out["suggested_dish"].as_str().expect("dish");
        prop_assert!(SUGGESTIONS.contains(&dish));
        prop_assert_eq!(dish, SUGGESTIONS[suggestion_index(&email, SUGGESTIONS.len())]);
        prop_assert_eq!(out["user"].as_str(), Some(email.as_str()));
    }
}

#[test]
fn known_emails_are_pinned() {
    // The mapping must not change between releases.
    assert_eq!(suggestion_index("a@x.com", SUGGESTIONS.len()), 2);
    assert_eq!(suggestion_index("unknown", SUGGESTIONS.len()), 3);
    assert_eq!(suggestion_index("alice@example.com", SUGGESTIONS.len()), 3);
    assert_eq!(suggestion_index("", SUGGESTIONS.len()), 2);
    assert_eq!(SUGGESTIONS[2], "Greek yogurt with berries");
}
