//! Duet Client Library Crate
//!
//! This library contains the client-side runtime of the Duet assistant:
//! configuration, persisted voice settings, the socket protocol, the
//! REST client, and the session runtime that composes the gateway and
//! voice components. The `client` binary is a thin wrapper around this
//! library.

pub mod api;
pub mod config;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod state;
