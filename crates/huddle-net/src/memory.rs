//! In-process loopback transport.
//!
//! [`MemoryHub`] wires any number of [`MemoryTransport`] endpoints
//! together inside one process: discovery, invitations, small messages,
//! and simulated resource transfers all work without touching a real
//! link layer. The demo binary and the end-to-end tests run on it.
//!
//! The hub mirrors the constraints of a real local transport: small
//! sends require an established session, and an invitation that nobody
//! answers within [`INVITE_TIMEOUT`] counts as declined.

use crate::transport::{
    LinkState, TransferDirection, Transport, TransportError, TransportEvent, TransportHandle,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// How long an invitation may sit unanswered before it counts as declined.
pub const INVITE_TIMEOUT: Duration = Duration::from_secs(20);

/// Capacity of each endpoint's event channel.
const EVENT_CAPACITY: usize = 64;

/// Simulated transfer progress steps.
const PROGRESS_STEPS: [f64; 4] = [0.25, 0.5, 0.75, 1.0];

struct Endpoint {
    display_name: String,
    events: mpsc::Sender<TransportEvent>,
    advertising: bool,
    discovering: bool,
    connected: HashSet<u64>,
    incoming_dir: PathBuf,
}

#[derive(Default)]
struct HubState {
    next_key: u64,
    endpoints: HashMap<u64, Endpoint>,
}

impl HubState {
    fn handle_of(&self, key: u64) -> Option<TransportHandle> {
        self.endpoints
            .get(&key)
            .map(|endpoint| TransportHandle::new(key, endpoint.display_name.clone()))
    }

    fn deliver(&self, key: u64, event: TransportEvent) {
        if let Some(endpoint) = self.endpoints.get(&key) {
            if endpoint.events.try_send(event).is_err() {
                warn!(key, "Memory hub dropped an event (receiver full or gone)");
            }
        }
    }

    fn connected(&self, a: u64, b: u64) -> bool {
        self.endpoints
            .get(&a)
            .map(|endpoint| endpoint.connected.contains(&b))
            .unwrap_or(false)
    }

    fn link(&mut self, a: u64, b: u64) {
        if let Some(endpoint) = self.endpoints.get_mut(&a) {
            endpoint.connected.insert(b);
        }
        if let Some(endpoint) = self.endpoints.get_mut(&b) {
            endpoint.connected.insert(a);
        }
    }

    fn sever(&mut self, a: u64, b: u64) {
        if let Some(endpoint) = self.endpoints.get_mut(&a) {
            endpoint.connected.remove(&b);
        }
        if let Some(endpoint) = self.endpoints.get_mut(&b) {
            endpoint.connected.remove(&a);
        }
    }
}

/// An in-process switchboard connecting [`MemoryTransport`] endpoints.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new endpoint under the given display name.
    pub fn endpoint(&self, display_name: impl Into<String>) -> MemoryTransport {
        let display_name = display_name.into();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        let mut hub = lock(&self.inner);
        let key = hub.next_key;
        hub.next_key += 1;

        let incoming_dir =
            std::env::temp_dir().join(format!("huddle-incoming-{key}-{}", uuid::Uuid::new_v4()));

        hub.endpoints.insert(
            key,
            Endpoint {
                display_name: display_name.clone(),
                events: events_tx,
                advertising: false,
                discovering: false,
                connected: HashSet::new(),
                incoming_dir,
            },
        );

        MemoryTransport {
            hub: Arc::clone(&self.inner),
            key,
            display_name,
            events: Some(events_rx),
        }
    }
}

fn lock(hub: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    hub.lock().unwrap_or_else(|e| e.into_inner())
}

/// One endpoint on a [`MemoryHub`].
pub struct MemoryTransport {
    hub: Arc<Mutex<HubState>>,
    key: u64,
    display_name: String,
    events: Option<mpsc::Receiver<TransportEvent>>,
}

impl MemoryTransport {
    /// The handle other endpoints see for this one.
    pub fn local_handle(&self) -> TransportHandle {
        TransportHandle::new(self.key, self.display_name.clone())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    async fn start_advertising(&mut self) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        let me = hub.handle_of(self.key).ok_or(TransportError::Closed)?;
        hub.endpoints
            .get_mut(&self.key)
            .ok_or(TransportError::Closed)?
            .advertising = true;
        for (key, endpoint) in hub.endpoints.iter() {
            if *key != self.key && endpoint.discovering {
                hub.deliver(
                    *key,
                    TransportEvent::PeerDiscovered {
                        handle: me.clone(),
                        discovery_info: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        let me = hub.handle_of(self.key).ok_or(TransportError::Closed)?;
        if let Some(endpoint) = hub.endpoints.get_mut(&self.key) {
            endpoint.advertising = false;
        }
        for (key, endpoint) in hub.endpoints.iter() {
            if *key != self.key && endpoint.discovering {
                hub.deliver(*key, TransportEvent::PeerLost { handle: me.clone() });
            }
        }
        Ok(())
    }

    async fn start_discovery(&mut self) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        hub.endpoints
            .get_mut(&self.key)
            .ok_or(TransportError::Closed)?
            .discovering = true;
        let visible: Vec<TransportHandle> = hub
            .endpoints
            .iter()
            .filter(|(key, endpoint)| **key != self.key && endpoint.advertising)
            .map(|(key, endpoint)| TransportHandle::new(*key, endpoint.display_name.clone()))
            .collect();
        for handle in visible {
            hub.deliver(
                self.key,
                TransportEvent::PeerDiscovered {
                    handle,
                    discovery_info: None,
                },
            );
        }
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        if let Some(endpoint) = hub.endpoints.get_mut(&self.key) {
            endpoint.discovering = false;
        }
        Ok(())
    }

    async fn invite(&mut self, handle: &TransportHandle) -> Result<(), TransportError> {
        let target = handle.key();
        let (responder, decision) = oneshot::channel();

        {
            let hub = lock(&self.hub);
            let me = hub.handle_of(self.key).ok_or(TransportError::Closed)?;
            if !hub.endpoints.contains_key(&target) {
                return Err(TransportError::UnknownHandle(handle.to_string()));
            }
            hub.deliver(
                target,
                TransportEvent::InvitationReceived {
                    handle: me,
                    context: None,
                    responder,
                },
            );
            hub.deliver(
                self.key,
                TransportEvent::LinkStateChanged {
                    handle: handle.clone(),
                    state: LinkState::Connecting,
                },
            );
        }

        let hub = Arc::clone(&self.hub);
        let inviter = self.key;
        tokio::spawn(async move {
            let accepted = matches!(
                tokio::time::timeout(INVITE_TIMEOUT, decision).await,
                Ok(Ok(true))
            );
            let mut hub = lock(&hub);
            let (Some(inviter_handle), Some(target_handle)) =
                (hub.handle_of(inviter), hub.handle_of(target))
            else {
                return;
            };
            if accepted {
                debug!(%inviter_handle, %target_handle, "Invitation accepted");
                hub.link(inviter, target);
                hub.deliver(
                    target,
                    TransportEvent::LinkStateChanged {
                        handle: inviter_handle.clone(),
                        state: LinkState::Connecting,
                    },
                );
                hub.deliver(
                    inviter,
                    TransportEvent::LinkStateChanged {
                        handle: target_handle,
                        state: LinkState::Connected,
                    },
                );
                hub.deliver(
                    target,
                    TransportEvent::LinkStateChanged {
                        handle: inviter_handle,
                        state: LinkState::Connected,
                    },
                );
            } else {
                debug!(%inviter_handle, "Invitation declined or timed out");
                hub.deliver(
                    inviter,
                    TransportEvent::LinkStateChanged {
                        handle: target_handle,
                        state: LinkState::NotConnected,
                    },
                );
            }
        });

        Ok(())
    }

    async fn send(&mut self, handle: &TransportHandle, data: Bytes) -> Result<(), TransportError> {
        let target = handle.key();
        let hub = lock(&self.hub);
        if !hub.endpoints.contains_key(&target) {
            return Err(TransportError::UnknownHandle(handle.to_string()));
        }
        // Small sends require an established session.
        if !hub.connected(self.key, target) {
            return Err(TransportError::NotConnected(handle.to_string()));
        }
        let me = hub.handle_of(self.key).ok_or(TransportError::Closed)?;
        hub.deliver(target, TransportEvent::DataReceived { handle: me, data });
        Ok(())
    }

    async fn send_resource(
        &mut self,
        handle: &TransportHandle,
        path: &Path,
    ) -> Result<watch::Receiver<f64>, TransportError> {
        let target = handle.key();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resource".to_string());

        let (outbound_tx, outbound_rx) = watch::channel(0.0);
        let (inbound_tx, inbound_rx) = watch::channel(0.0);

        let incoming_dir = {
            let hub = lock(&self.hub);
            if !hub.connected(self.key, target) {
                return Err(TransportError::NotConnected(handle.to_string()));
            }
            let me = hub.handle_of(self.key).ok_or(TransportError::Closed)?;
            let incoming_dir = hub
                .endpoints
                .get(&target)
                .map(|endpoint| endpoint.incoming_dir.clone())
                .ok_or_else(|| TransportError::UnknownHandle(handle.to_string()))?;
            hub.deliver(
                target,
                TransportEvent::ResourceStarted {
                    handle: me,
                    name: name.clone(),
                    progress: inbound_rx,
                },
            );
            incoming_dir
        };

        let hub = Arc::clone(&self.hub);
        let sender = self.key;
        let path = path.to_path_buf();
        tokio::spawn(async move {
            let outcome = transfer(&path, &incoming_dir, &name, &outbound_tx, &inbound_tx).await;
            let hub = lock(&hub);
            let (Some(sender_handle), Some(target_handle)) =
                (hub.handle_of(sender), hub.handle_of(target))
            else {
                return;
            };
            let (local_path, error) = match outcome {
                Ok(dest) => (Some(dest), None),
                Err(e) => (None, Some(e.to_string())),
            };
            hub.deliver(
                target,
                TransportEvent::ResourceCompleted {
                    handle: sender_handle,
                    name: name.clone(),
                    direction: TransferDirection::Inbound,
                    local_path,
                    error: error.clone(),
                },
            );
            hub.deliver(
                sender,
                TransportEvent::ResourceCompleted {
                    handle: target_handle,
                    name,
                    direction: TransferDirection::Outbound,
                    local_path: None,
                    error,
                },
            );
        });

        Ok(outbound_rx)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        let Some(me) = hub.handle_of(self.key) else {
            return Ok(());
        };
        let connected: Vec<u64> = hub
            .endpoints
            .get(&self.key)
            .map(|endpoint| endpoint.connected.iter().copied().collect())
            .unwrap_or_default();
        for other in connected {
            if let Some(other_handle) = hub.handle_of(other) {
                hub.deliver(
                    self.key,
                    TransportEvent::LinkStateChanged {
                        handle: other_handle,
                        state: LinkState::NotConnected,
                    },
                );
                hub.deliver(
                    other,
                    TransportEvent::LinkStateChanged {
                        handle: me.clone(),
                        state: LinkState::NotConnected,
                    },
                );
            }
            hub.sever(self.key, other);
        }
        Ok(())
    }
}

/// Simulate moving the bytes: read, step the progress handles, land the
/// file in the receiver's incoming directory.
async fn transfer(
    path: &Path,
    incoming_dir: &Path,
    name: &str,
    outbound: &watch::Sender<f64>,
    inbound: &watch::Sender<f64>,
) -> std::io::Result<PathBuf> {
    let contents = tokio::fs::read(path).await?;
    for step in PROGRESS_STEPS {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _ = outbound.send(step);
        let _ = inbound.send(step);
    }
    tokio::fs::create_dir_all(incoming_dir).await?;
    let dest = incoming_dir.join(format!("{}-{name}", uuid::Uuid::new_v4()));
    tokio::fs::write(&dest, contents).await?;
    Ok(dest)
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let mut hub = lock(&self.hub);
        let me = hub.handle_of(self.key);
        let removed = hub.endpoints.remove(&self.key);
        let (Some(me), Some(endpoint)) = (me, removed) else {
            return;
        };
        for other in endpoint.connected {
            if let Some(peer) = hub.endpoints.get_mut(&other) {
                peer.connected.remove(&self.key);
            }
            hub.deliver(
                other,
                TransportEvent::LinkStateChanged {
                    handle: me.clone(),
                    state: LinkState::NotConnected,
                },
            );
        }
        if endpoint.advertising {
            let discovering: Vec<u64> = hub
                .endpoints
                .iter()
                .filter(|(_, peer)| peer.discovering)
                .map(|(key, _)| *key)
                .collect();
            for key in discovering {
                hub.deliver(key, TransportEvent::PeerLost { handle: me.clone() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    /// Two endpoints, both advertising and discovering.
    async fn wired_pair() -> (
        MemoryTransport,
        mpsc::Receiver<TransportEvent>,
        MemoryTransport,
        mpsc::Receiver<TransportEvent>,
    ) {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let mut bob = hub.endpoint("bob");
        let alice_events = alice.take_events().unwrap();
        let bob_events = bob.take_events().unwrap();
        alice.start_advertising().await.unwrap();
        alice.start_discovery().await.unwrap();
        bob.start_advertising().await.unwrap();
        bob.start_discovery().await.unwrap();
        (alice, alice_events, bob, bob_events)
    }

    /// Drive an invite through acceptance and drain the state events.
    async fn connect(
        alice: &mut MemoryTransport,
        alice_events: &mut mpsc::Receiver<TransportEvent>,
        bob: &MemoryTransport,
        bob_events: &mut mpsc::Receiver<TransportEvent>,
    ) {
        alice.invite(&bob.local_handle()).await.unwrap();
        match next(alice_events).await {
            TransportEvent::LinkStateChanged { state, .. } => {
                assert_eq!(state, LinkState::Connecting);
            }
            other => panic!("Expected Connecting, got {other:?}"),
        }
        match next(bob_events).await {
            TransportEvent::InvitationReceived { responder, .. } => {
                responder.send(true).unwrap();
            }
            other => panic!("Expected InvitationReceived, got {other:?}"),
        }
        match next(alice_events).await {
            TransportEvent::LinkStateChanged { state, .. } => {
                assert_eq!(state, LinkState::Connected);
            }
            other => panic!("Expected Connected, got {other:?}"),
        }
        // Invitee side: Connecting then Connected.
        match next(bob_events).await {
            TransportEvent::LinkStateChanged { state, .. } => {
                assert_eq!(state, LinkState::Connecting);
            }
            other => panic!("Expected Connecting, got {other:?}"),
        }
        match next(bob_events).await {
            TransportEvent::LinkStateChanged { state, .. } => {
                assert_eq!(state, LinkState::Connected);
            }
            other => panic!("Expected Connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discovery_both_ways() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let mut bob = hub.endpoint("bob");
        let mut alice_events = alice.take_events().unwrap();
        let mut bob_events = bob.take_events().unwrap();

        alice.start_advertising().await.unwrap();
        alice.start_discovery().await.unwrap();
        bob.start_advertising().await.unwrap();
        bob.start_discovery().await.unwrap();

        // Alice was discovering before bob advertised; bob finds alice at
        // start_discovery time.
        match next(&mut alice_events).await {
            TransportEvent::PeerDiscovered { handle, .. } => {
                assert_eq!(handle.display_name(), "bob");
            }
            other => panic!("Expected PeerDiscovered, got {other:?}"),
        }
        match next(&mut bob_events).await {
            TransportEvent::PeerDiscovered { handle, .. } => {
                assert_eq!(handle.display_name(), "alice");
            }
            other => panic!("Expected PeerDiscovered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_requires_session() {
        let (mut alice, _alice_events, bob, _bob_events) = wired_pair().await;
        // No session established yet.
        let result = alice
            .send(&bob.local_handle(), Bytes::from_static(b"hi"))
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_invite_accept_send() {
        let (mut alice, mut alice_events, mut bob, mut bob_events) = wired_pair().await;
        // Drain discovery events.
        next(&mut alice_events).await;
        next(&mut bob_events).await;

        connect(&mut alice, &mut alice_events, &bob, &mut bob_events).await;

        alice
            .send(&bob.local_handle(), Bytes::from_static(b"hello"))
            .await
            .unwrap();
        match next(&mut bob_events).await {
            TransportEvent::DataReceived { handle, data } => {
                assert_eq!(handle.display_name(), "alice");
                assert_eq!(&data[..], b"hello");
            }
            other => panic!("Expected DataReceived, got {other:?}"),
        }

        // Reply flows the other way over the same session.
        bob.send(&alice.local_handle(), Bytes::from_static(b"ACK"))
            .await
            .unwrap();
        match next(&mut alice_events).await {
            TransportEvent::DataReceived { data, .. } => {
                assert_eq!(&data[..], b"ACK");
            }
            other => panic!("Expected DataReceived, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_declined_invitation_reports_not_connected() {
        let (mut alice, mut alice_events, bob, mut bob_events) = wired_pair().await;
        next(&mut alice_events).await;
        next(&mut bob_events).await;

        alice.invite(&bob.local_handle()).await.unwrap();
        match next(&mut alice_events).await {
            TransportEvent::LinkStateChanged { state, .. } => {
                assert_eq!(state, LinkState::Connecting);
            }
            other => panic!("Expected Connecting, got {other:?}"),
        }
        match next(&mut bob_events).await {
            TransportEvent::InvitationReceived { responder, .. } => {
                responder.send(false).unwrap();
            }
            other => panic!("Expected InvitationReceived, got {other:?}"),
        }
        match next(&mut alice_events).await {
            TransportEvent::LinkStateChanged { state, .. } => {
                assert_eq!(state, LinkState::NotConnected);
            }
            other => panic!("Expected NotConnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_responder_counts_as_decline() {
        let (mut alice, mut alice_events, bob, mut bob_events) = wired_pair().await;
        next(&mut alice_events).await;
        next(&mut bob_events).await;

        alice.invite(&bob.local_handle()).await.unwrap();
        next(&mut alice_events).await; // Connecting
        match next(&mut bob_events).await {
            TransportEvent::InvitationReceived { responder, .. } => drop(responder),
            other => panic!("Expected InvitationReceived, got {other:?}"),
        }
        match next(&mut alice_events).await {
            TransportEvent::LinkStateChanged { state, .. } => {
                assert_eq!(state, LinkState::NotConnected);
            }
            other => panic!("Expected NotConnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resource_transfer_lands_bytes() {
        let (mut alice, mut alice_events, bob, mut bob_events) = wired_pair().await;
        next(&mut alice_events).await;
        next(&mut bob_events).await;
        connect(&mut alice, &mut alice_events, &bob, &mut bob_events).await;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        tokio::fs::write(&source, b"meeting at noon").await.unwrap();

        let mut progress = alice
            .send_resource(&bob.local_handle(), &source)
            .await
            .unwrap();

        match next(&mut bob_events).await {
            TransportEvent::ResourceStarted { name, .. } => assert_eq!(name, "notes.txt"),
            other => panic!("Expected ResourceStarted, got {other:?}"),
        }

        // The sender-side progress handle reaches completion.
        let mut last = 0.0;
        while progress.changed().await.is_ok() {
            last = *progress.borrow_and_update();
        }
        assert!((last - 1.0).abs() < f64::EPSILON);

        match next(&mut bob_events).await {
            TransportEvent::ResourceCompleted {
                direction,
                local_path,
                error,
                ..
            } => {
                assert_eq!(direction, TransferDirection::Inbound);
                assert!(error.is_none());
                let landed = tokio::fs::read(local_path.unwrap()).await.unwrap();
                assert_eq!(landed, b"meeting at noon");
            }
            other => panic!("Expected ResourceCompleted, got {other:?}"),
        }
        match next(&mut alice_events).await {
            TransportEvent::ResourceCompleted {
                direction, error, ..
            } => {
                assert_eq!(direction, TransferDirection::Outbound);
                assert!(error.is_none());
            }
            other => panic!("Expected ResourceCompleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_reports_error_both_sides() {
        let (mut alice, mut alice_events, bob, mut bob_events) = wired_pair().await;
        next(&mut alice_events).await;
        next(&mut bob_events).await;
        connect(&mut alice, &mut alice_events, &bob, &mut bob_events).await;

        alice
            .send_resource(&bob.local_handle(), Path::new("/no/such/file.bin"))
            .await
            .unwrap();

        match next(&mut bob_events).await {
            TransportEvent::ResourceStarted { .. } => {}
            other => panic!("Expected ResourceStarted, got {other:?}"),
        }
        match next(&mut bob_events).await {
            TransportEvent::ResourceCompleted {
                local_path, error, ..
            } => {
                assert!(local_path.is_none());
                assert!(error.is_some());
            }
            other => panic!("Expected ResourceCompleted, got {other:?}"),
        }
        match next(&mut alice_events).await {
            TransportEvent::ResourceCompleted { error, .. } => assert!(error.is_some()),
            other => panic!("Expected ResourceCompleted, got {other:?}"),
        }
    }
}
