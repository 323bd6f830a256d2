//! Peer identities and per-peer state.
//!
//! A [`PeerIdentity`] is the stable, application-level reference to a
//! nearby device. It is minted once per discovered transport handle and
//! never mutated; transport-level churn never leaks above the network
//! domain.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a peer, stable across connection-state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Create a new random PeerId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable application-level identity of a discovered peer.
///
/// Immutable once created. A lost peer that is rediscovered later receives
/// a *new* identity; identities are never resurrected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Unique ID minted by the identity registry.
    pub id: PeerId,
    /// Display name advertised by the peer at discovery time.
    pub display_name: String,
}

impl PeerIdentity {
    /// Create an identity with a fresh random ID.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: PeerId::new(),
            display_name: display_name.into(),
        }
    }
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Connection state of a peer, keyed by [`PeerId`].
///
/// Any peer with no recorded transition reports [`ConnectionState::NotConnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session, or the session was torn down.
    #[default]
    NotConnected,
    /// Session establishment in progress.
    Connecting,
    /// Fully connected, messages and resources can flow.
    Connected,
}

impl ConnectionState {
    /// Whether messages and resources can be sent to the peer.
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// An in-flight resource transfer, present only while bytes are moving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// The peer on the other end of the transfer.
    pub peer: PeerIdentity,
    /// Fraction completed in `0.0..=1.0`.
    pub fraction_completed: f64,
}
