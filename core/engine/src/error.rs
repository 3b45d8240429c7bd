//! Error types for engine operations.
//!
//! Most failures degrade inside [`crate::reconcile`] instead of surfacing
//! here: resolution failures park the identity state, mutation failures
//! become notices. `EngineError` covers the few genuinely fatal cases at the
//! construction and bootstrap boundary.

use curbside_protocol::ErrorInfo;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The card config cannot be used at all, e.g. a malformed entity id.
    #[error("invalid card configuration: {0}")]
    InvalidConfig(ErrorInfo),

    /// A host call failed where the engine cannot continue without it,
    /// currently only the initial account listing.
    #[error("host call failed: {0}")]
    Host(#[from] ErrorInfo),
}
