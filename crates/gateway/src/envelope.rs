//! Opaque inbound frame handling.
//!
//! The gateway enforces no schema on inbound payloads beyond "a JSON
//! object carrying a string `type` field". Consumers match on the tag
//! and deserialize the payload into their own message types.

use serde_json::Value;

/// The latest message received over the socket, forwarded verbatim.
///
/// Only the most recent message is retained; consumers observe the
/// latest value, not a queue of every delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Value of the payload's `type` field.
    pub kind: String,
    /// The complete payload, `type` field included.
    pub payload: Value,
}

impl InboundMessage {
    /// Parses one text frame.
    ///
    /// Returns `None` for anything that is not a JSON object with a
    /// string `type` tag; the caller logs and discards those.
    pub fn parse(frame: &str) -> Option<Self> {
        let payload: Value = serde_json::from_str(frame).ok()?;
        let kind = payload.get("type")?.as_str()?.to_string();
        Some(Self { kind, payload })
    }
}
