//! Defines the message protocol between this client and the backend
//! socket.
//!
//! The gateway itself is schema-free: it delivers opaque tagged
//! envelopes. This module is where the chat surface gives those
//! envelopes a type.

use duet_gateway::InboundMessage;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Messages sent from the client to the server.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Initializes or resumes a session. Sent on every (re)connect.
    Init { session_id: Option<Uuid> },
    /// A chat message from the user, typed or transcribed.
    UserMessage { text: String },
    /// Tells the backend whether to produce voice-related events.
    SetVoiceEnabled { enabled: bool },
}

/// Messages received from the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms session initialization.
    Initialized { session_id: Uuid },
    /// A complete assistant reply.
    AssistantMessage { text: String },
    /// Reports a server-side error the UI should surface.
    Error { message: String },
}

impl ServerMessage {
    /// Decodes a gateway envelope. Message kinds this surface does not
    /// understand map to `None` and are skipped.
    pub fn decode(message: &InboundMessage) -> Option<Self> {
        match serde_json::from_value(message.payload.clone()) {
            Ok(decoded) => Some(decoded),
            Err(_) => {
                debug!(kind = %message.kind, "ignoring unhandled message kind");
                None
            }
        }
    }
}
