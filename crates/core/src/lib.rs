//! Duet Core
//!
//! Platform-independent primitives of the Duet client runtime: the
//! speech engine contracts, the voice session state machine, and the
//! request coordinator. Nothing here touches the network or a concrete
//! speech platform; those arrive as trait implementations from the
//! embedding application.

pub mod coordinator;
pub mod engine;
pub mod voice;
