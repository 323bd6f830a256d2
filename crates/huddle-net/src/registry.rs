//! Peer identity registry — handle ↔ identity mapping.
//!
//! The registry is the single source of truth for identity stability: no
//! other component mints a [`PeerIdentity`]. It is owned outright by the
//! network agent and mutated only inside the agent's task, so it needs no
//! locking; the serialized event loop is what keeps the bidirectional
//! mapping consistent.

use crate::transport::TransportHandle;
use chrono::{DateTime, Utc};
use huddle_types::{PeerId, PeerIdentity};
use std::collections::HashMap;

/// A registered peer: stable identity plus the live link-layer handle.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// The stable application-level identity.
    pub identity: PeerIdentity,
    /// The transport's reference to the peer.
    pub handle: TransportHandle,
    /// When the peer was first resolved.
    pub discovered_at: DateTime<Utc>,
}

/// Bidirectional mapping between transport handles and stable identities.
///
/// `id → handle` and `handle → id` are kept as each other's inverse: at
/// most one record per distinct handle and per distinct id at any time.
/// Iteration order is discovery order.
#[derive(Debug, Default)]
pub struct PeerIdentityRegistry {
    ids_by_handle: HashMap<TransportHandle, PeerId>,
    records: HashMap<PeerId, PeerRecord>,
    order: Vec<PeerId>,
}

impl PeerIdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the identity for a handle, minting one on first sight.
    ///
    /// Two resolutions of handles that compare equal, without an
    /// intervening [`forget`](Self::forget), return the same identity.
    /// Never fails.
    pub fn resolve(&mut self, handle: &TransportHandle) -> PeerIdentity {
        if let Some(id) = self.ids_by_handle.get(handle) {
            if let Some(record) = self.records.get(id) {
                return record.identity.clone();
            }
        }

        let identity = PeerIdentity::new(handle.display_name());
        let record = PeerRecord {
            identity: identity.clone(),
            handle: handle.clone(),
            discovered_at: Utc::now(),
        };

        self.ids_by_handle.insert(handle.clone(), identity.id);
        self.records.insert(identity.id, record);
        self.order.push(identity.id);

        identity
    }

    /// Retire the record for a handle, returning its identity.
    ///
    /// Unknown handles return `None`; a lost-peer event for a handle that
    /// was never registered is a no-op, not an error. A handle
    /// rediscovered after `forget` mints a fresh identity.
    pub fn forget(&mut self, handle: &TransportHandle) -> Option<PeerIdentity> {
        let id = self.ids_by_handle.remove(handle)?;
        self.order.retain(|known| *known != id);
        self.records.remove(&id).map(|record| record.identity)
    }

    /// Reverse lookup: the live handle for an identity, or `None` if the
    /// peer has been lost since.
    pub fn handle_for(&self, id: PeerId) -> Option<&TransportHandle> {
        self.records.get(&id).map(|record| &record.handle)
    }

    /// The identity for an id, if still registered.
    pub fn identity(&self, id: PeerId) -> Option<&PeerIdentity> {
        self.records.get(&id).map(|record| &record.identity)
    }

    /// All registered identities in discovery order.
    pub fn identities(&self) -> Vec<PeerIdentity> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|record| record.identity.clone())
            .collect()
    }

    /// Whether a handle is currently registered.
    pub fn contains(&self, handle: &TransportHandle) -> bool {
        self.ids_by_handle.contains_key(handle)
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record. Used when the session is reset.
    pub fn clear(&mut self) {
        self.ids_by_handle.clear();
        self.records.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(key: u64, name: &str) -> TransportHandle {
        TransportHandle::new(key, name)
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut registry = PeerIdentityRegistry::new();
        let h = handle(1, "sofa-phone");
        let first = registry.resolve(&h);
        let second = registry.resolve(&h);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_handles_never_alias() {
        let mut registry = PeerIdentityRegistry::new();
        let a = registry.resolve(&handle(1, "a"));
        let b = registry.resolve(&handle(2, "b"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_forget_returns_identity() {
        let mut registry = PeerIdentityRegistry::new();
        let h = handle(1, "sofa-phone");
        let identity = registry.resolve(&h);
        let forgotten = registry.forget(&h).unwrap();
        assert_eq!(forgotten, identity);
        assert!(registry.is_empty());
        assert!(registry.handle_for(identity.id).is_none());
    }

    #[test]
    fn test_forget_unknown_handle_is_noop() {
        let mut registry = PeerIdentityRegistry::new();
        assert!(registry.forget(&handle(9, "ghost")).is_none());
    }

    #[test]
    fn test_rediscovery_mints_new_identity() {
        // Lost peers are not rediscovered under their old identity.
        let mut registry = PeerIdentityRegistry::new();
        let h = handle(1, "sofa-phone");
        let first = registry.resolve(&h);
        registry.forget(&h);
        let second = registry.resolve(&h);
        assert_ne!(first.id, second.id);
        assert_eq!(second.display_name, "sofa-phone");
    }

    #[test]
    fn test_mapping_is_inverse() {
        let mut registry = PeerIdentityRegistry::new();
        let h = handle(4, "den-laptop");
        let identity = registry.resolve(&h);
        assert_eq!(registry.handle_for(identity.id), Some(&h));
        assert_eq!(registry.identity(identity.id), Some(&identity));
    }

    #[test]
    fn test_identities_in_discovery_order() {
        let mut registry = PeerIdentityRegistry::new();
        let first = registry.resolve(&handle(1, "first"));
        let second = registry.resolve(&handle(2, "second"));
        let third = registry.resolve(&handle(3, "third"));

        registry.forget(&handle(2, "second"));
        let fourth = registry.resolve(&handle(2, "second"));

        let names: Vec<_> = registry
            .identities()
            .into_iter()
            .map(|identity| identity.id)
            .collect();
        assert_eq!(names, vec![first.id, third.id, fourth.id]);
        assert_ne!(second.id, fourth.id);
    }

    #[test]
    fn test_clear() {
        let mut registry = PeerIdentityRegistry::new();
        registry.resolve(&handle(1, "a"));
        registry.resolve(&handle(2, "b"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.identities().is_empty());
    }
}
