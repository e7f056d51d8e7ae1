//! Narrative payloads: AI readings and single-year analysis

use super::{decode, require};
use crate::error::{DivinationError, DivinationResult};
use crate::gateway::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{success, content}` envelope shared by the narrative endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// A 2xx body with `success: false` means the service declined the request.
pub fn check_success(body: &Value) -> DivinationResult<()> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| body.get("content").and_then(Value::as_str))
            .unwrap_or("service declined the request");
        return Err(GatewayError::rejected(message).into());
    }
    Ok(())
}

/// Decode a narrative body down to its text
pub fn validate_narrative(body: Value) -> DivinationResult<String> {
    check_success(&body)?;
    require(&body, &["content"])?;
    let narrative: Narrative = decode(body, "narrative")?;
    narrative
        .content
        .ok_or_else(|| DivinationError::malformed("missing content"))
}
