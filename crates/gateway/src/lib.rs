//! Duet Gateway
//!
//! Client side of the persistent socket between the Duet UI and its
//! backend. The `ConnectionManager` owns one logical connection, keeps
//! it alive with capped exponential backoff, and publishes the current
//! connection state plus the latest inbound message to any number of
//! read-only observers.

pub mod backoff;
pub mod envelope;
pub mod manager;
pub mod transport;

pub use envelope::InboundMessage;
pub use manager::{ConnectionManager, ConnectionState, GatewayConfig, SendError};
