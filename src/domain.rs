//! Wire contracts exchanged with the calculation gateway
//!
//! Request builders turn session fields into request payloads and reject
//! incomplete or out-of-range input before anything is dispatched. Response
//! validators check the structure of a 2xx body before it is allowed to
//! become a session result.

mod bazi;
mod calendar;
mod interpret;
mod liuyao;

pub use bazi::*;
pub use calendar::*;
pub use interpret::*;
pub use liuyao::*;


use crate::error::{DivinationError, DivinationResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize a response body, mapping shape errors to `MalformedResponse`
pub fn decode<T: DeserializeOwned>(body: Value, what: &str) -> DivinationResult<T> {
    serde_json::from_value(body).map_err(|e| DivinationError::malformed(format!("{what}: {e}")))
}

/// Look up a dotted path of object keys, treating `null` as absent
fn field<'a>(body: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = body;
    for key in path {
        current = current.get(key)?;
    }
    (!current.is_null()).then_some(current)
}

fn require(body: &Value, path: &[&str]) -> DivinationResult<()> {
    field(body, path)
        .map(|_| ())
        .ok_or_else(|| DivinationError::malformed(format!("missing {}", path.join("."))))
}
