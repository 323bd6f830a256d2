//! Shared error types for the huddle session layer.

use crate::peer::PeerId;
use thiserror::Error;

/// Top-level error type for the huddle session layer.
#[derive(Error, Debug)]
pub enum HuddleError {
    /// The session is in the wrong lifecycle phase for the requested operation.
    #[error("Session is in phase '{current}' for operation '{operation}'")]
    InvalidPhase {
        /// The current lifecycle phase.
        current: String,
        /// The operation that was attempted.
        operation: String,
    },

    /// The referenced peer is not in the active peer set.
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// A transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A cross-domain channel closed while the session was still running.
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The session is shutting down.
    #[error("Shutdown in progress")]
    ShuttingDown,

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for Result with HuddleError.
pub type HuddleResult<T> = Result<T, HuddleError>;
