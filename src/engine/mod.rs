//! Engine command protocol: envelopes, correlation, wire types
//!
//! The analysis engine is an out-of-process collaborator speaking a
//! line-oriented JSON protocol. This module owns the client side of that
//! protocol:
//!
//! - **protocol**: envelope types and the [`EngineClient`] command correlator
//! - **types**: command argument and body shapes (1-based coordinates)
//! - **error**: the protocol-level error taxonomy
//! - **testing**: a scripted engine double for tests

pub mod error;
pub mod protocol;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use error::EngineError;
pub use protocol::{CommandEnvelope, EngineClient, EventEnvelope, ResponseEnvelope};
