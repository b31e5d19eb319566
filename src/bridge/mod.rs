//! Bridge layer: editor-facing semantics on top of the engine protocol
//!
//! - **session**: open-document tracking and lifecycle mirroring
//! - **diagnostics**: multi-event reconciliation into single notifications
//! - **capabilities**: request/response language features
//! - **convert**: coordinate and text conversion at the protocol boundary
//! - **error**: the caller-visible error taxonomy

pub mod capabilities;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod session;

pub use diagnostics::{DiagnosticsPublisher, DiagnosticsReconciler};
pub use error::BridgeError;
pub use session::{DocumentSession, SessionManager};
