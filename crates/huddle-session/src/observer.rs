//! Notifications delivered to the UI collaborator.

use huddle_types::PeerIdentity;
use std::collections::HashMap;
use std::path::Path;

/// Callbacks the coordinator fires as the session changes.
///
/// Every method has a no-op default, so an observer implements only what
/// it renders. All calls happen on the presentation domain, in event
/// order; identities are plain values the observer may keep.
pub trait SessionObserver: Send + Sync + 'static {
    /// A peer appeared. Fires once per identity.
    fn peer_found(&self, _peer: &PeerIdentity, _discovery_info: Option<&HashMap<String, String>>) {}

    /// A peer disappeared.
    fn peer_lost(&self, _peer: &PeerIdentity) {}

    /// The peer list was replaced; re-read it from the coordinator.
    fn peers_updated(&self) {}

    /// Some peer's connection state changed; re-read the rows.
    fn peer_state_changed(&self) {}

    /// An invitation is pending. The UI must eventually answer it exactly
    /// once via [`SessionCoordinator::accept_invitation`].
    ///
    /// [`SessionCoordinator::accept_invitation`]: crate::SessionCoordinator::accept_invitation
    fn invitation_received(&self, _from: &PeerIdentity) {}

    /// A content message arrived (acknowledgements are not forwarded).
    fn message_received(&self, _from: &PeerIdentity, _text: &str) {}

    /// A file landed on disk.
    fn file_received(&self, _from: &PeerIdentity, _path: &Path, _name: &str) {}

    /// Transfer progress for a peer; `None` means the transfer finished
    /// (successfully or not) and the entry was cleared.
    fn transfer_progress(&self, _peer: &PeerIdentity, _fraction: Option<f64>) {}
}

/// Observer that ignores everything. Handy for headless tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}
