use quire_core::DeltaError;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Failures scoped to one document session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Delta(#[from] DeltaError),

    /// No link and no connection attempt in progress, or the outbox is full
    #[error("transport unavailable")]
    TransportUnavailable,

    #[error("session closed")]
    Closed,

    /// The operation needs a loaded document
    #[error("document not loaded yet")]
    NotLive,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("timed out waiting for the server")]
    Timeout,
}
