//! The transport collaborator boundary.
//!
//! A [`Transport`] implementation performs discovery, session
//! establishment, and byte delivery. The core never looks inside it: it
//! consumes [`TransportEvent`]s from the channel the transport hands over
//! at startup, and drives it through the trait methods. Encryption, link
//! management, and resource transfer mechanics are the transport's
//! problem.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// Errors from the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO failure while touching the link or the filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The handle does not correspond to a currently visible peer.
    #[error("Unknown handle: {0}")]
    UnknownHandle(String),
    /// The peer is visible but no session is established.
    #[error("Peer not connected: {0}")]
    NotConnected(String),
    /// The transport has been shut down.
    #[error("Transport closed")]
    Closed,
    /// Any other transport-specific failure.
    #[error("Transport failure: {0}")]
    Failed(String),
}

/// Opaque reference to a peer at the link layer.
///
/// Owned exclusively by the network agent; never exposed above it. Two
/// handles compare equal exactly when the transport considers them the
/// same peer, regardless of the advertised display name.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    key: u64,
    display_name: String,
}

impl TransportHandle {
    /// Construct a handle. Only transports mint these.
    pub fn new(key: u64, display_name: impl Into<String>) -> Self {
        Self {
            key,
            display_name: display_name.into(),
        }
    }

    /// The display name the peer advertised.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The transport's equality key. Crate-internal: consumers above the
    /// network agent never see handles at all.
    pub(crate) fn key(&self) -> u64 {
        self.key
    }
}

impl PartialEq for TransportHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TransportHandle {}

impl std::hash::Hash for TransportHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl std::fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.display_name, self.key)
    }
}

/// Raw session state as the transport reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Session establishment in progress.
    Connecting,
    /// Session established.
    Connected,
    /// No session.
    NotConnected,
}

/// Which way a completed resource transfer was moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// The resource arrived from the peer.
    Inbound,
    /// The resource was sent to the peer.
    Outbound,
}

/// Events the transport delivers to the network agent.
///
/// Invitation responders are single-owner: the receiver must fire them at
/// most once; dropping one un-fired reads as a decline on the inviting
/// side.
#[derive(Debug)]
pub enum TransportEvent {
    /// A peer appeared in discovery.
    PeerDiscovered {
        /// Link-layer reference to the peer.
        handle: TransportHandle,
        /// Optional advertisement metadata.
        discovery_info: Option<HashMap<String, String>>,
    },
    /// A previously discovered peer disappeared.
    PeerLost {
        /// Link-layer reference to the peer.
        handle: TransportHandle,
    },
    /// Browsing or advertising failed.
    DiscoveryFailed {
        /// Human-readable failure description.
        reason: String,
    },
    /// The session state toward a peer changed.
    LinkStateChanged {
        /// Link-layer reference to the peer.
        handle: TransportHandle,
        /// The new raw state.
        state: LinkState,
    },
    /// A small message arrived.
    DataReceived {
        /// The sending peer.
        handle: TransportHandle,
        /// Payload bytes.
        data: Bytes,
    },
    /// An inbound resource transfer started.
    ResourceStarted {
        /// The sending peer.
        handle: TransportHandle,
        /// Resource name.
        name: String,
        /// Live progress handle in `0.0..=1.0`.
        progress: watch::Receiver<f64>,
    },
    /// A resource transfer finished, in either direction.
    ResourceCompleted {
        /// The peer on the other end.
        handle: TransportHandle,
        /// Resource name.
        name: String,
        /// Transfer direction.
        direction: TransferDirection,
        /// Where the received bytes landed (inbound success only).
        local_path: Option<PathBuf>,
        /// Failure description, if the transfer failed.
        error: Option<String>,
    },
    /// A peer asked to establish a session with us.
    InvitationReceived {
        /// The inviting peer.
        handle: TransportHandle,
        /// Opaque context bytes supplied by the inviter.
        context: Option<Bytes>,
        /// One-shot decision channel; send `true` to accept.
        responder: oneshot::Sender<bool>,
    },
}

/// The peer-to-peer transport the network agent drives.
///
/// All calls are fire-and-forget from the agent's perspective: a returned
/// error means the command could not even be handed to the link layer;
/// asynchronous outcomes arrive later as [`TransportEvent`]s.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hand over the event stream. Called exactly once, by the agent,
    /// before any other method; returns `None` on later calls.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Start advertising this device to nearby peers.
    async fn start_advertising(&mut self) -> Result<(), TransportError>;

    /// Stop advertising.
    async fn stop_advertising(&mut self) -> Result<(), TransportError>;

    /// Start browsing for nearby peers.
    async fn start_discovery(&mut self) -> Result<(), TransportError>;

    /// Stop browsing.
    async fn stop_discovery(&mut self) -> Result<(), TransportError>;

    /// Invite a discovered peer to a session.
    async fn invite(&mut self, handle: &TransportHandle) -> Result<(), TransportError>;

    /// Send a small message with reliable-delivery semantics.
    async fn send(&mut self, handle: &TransportHandle, data: Bytes) -> Result<(), TransportError>;

    /// Start sending a file-like resource; returns a live progress handle.
    async fn send_resource(
        &mut self,
        handle: &TransportHandle,
        path: &Path,
    ) -> Result<watch::Receiver<f64>, TransportError>;

    /// Tear down all sessions.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(handle: &TransportHandle) -> u64 {
        let mut hasher = DefaultHasher::new();
        handle.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_handle_equality_ignores_display_name() {
        let a = TransportHandle::new(7, "before-rename");
        let b = TransportHandle::new(7, "after-rename");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_distinct_keys_are_distinct_handles() {
        let a = TransportHandle::new(1, "same-name");
        let b = TransportHandle::new(2, "same-name");
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_display() {
        let handle = TransportHandle::new(3, "garage-pi");
        assert_eq!(handle.to_string(), "garage-pi#3");
    }
}
