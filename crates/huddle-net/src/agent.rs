//! NetworkAgent — the single-writer owner of the network domain.
//!
//! The agent task owns the [`PeerIdentityRegistry`] and the live
//! [`Transport`] binding. It is the only component that ever touches a
//! [`TransportHandle`]: inbound transport events are translated into
//! [`AgentEvent`]s keyed by stable [`PeerIdentity`] values before they
//! cross to the presentation domain, and [`AgentCommand`]s coming back
//! are translated from identities to handles at the last moment.
//!
//! The agent never raises a fatal error. Transport failures surface as
//! events or log lines, and a command for a peer whose handle has gone
//! stale is dropped silently: the peer set may have changed while the
//! command was in flight.

use crate::registry::PeerIdentityRegistry;
use crate::transport::{
    LinkState, TransferDirection, Transport, TransportEvent, TransportHandle,
};
use bytes::Bytes;
use huddle_types::{ConnectionState, HuddleError, HuddleResult, PeerId, PeerIdentity};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events the agent delivers to the presentation domain.
///
/// Every peer reference is a stable [`PeerIdentity`]; transport handles
/// never appear here.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A peer was discovered (first sight of its handle).
    PeerFound {
        /// The newly resolved identity.
        identity: PeerIdentity,
        /// Advertisement metadata, if the peer supplied any.
        discovery_info: Option<HashMap<String, String>>,
    },
    /// A peer disappeared from discovery.
    PeerLost {
        /// The retired identity.
        identity: PeerIdentity,
    },
    /// The full active peer set, in discovery order.
    PeersChanged {
        /// Every currently registered identity.
        peers: Vec<PeerIdentity>,
    },
    /// A peer's connection state changed.
    StateChanged {
        /// The peer whose state changed.
        id: PeerId,
        /// The new state.
        state: ConnectionState,
    },
    /// A peer asked to establish a session.
    InvitationReceived {
        /// The inviting peer.
        from: PeerIdentity,
    },
    /// A small message arrived.
    MessageReceived {
        /// The sending peer.
        from: PeerIdentity,
        /// Raw payload; the coordinator decodes it.
        data: Bytes,
    },
    /// An inbound resource transfer finished.
    FileReceived {
        /// The sending peer.
        from: PeerIdentity,
        /// Resource name.
        name: String,
        /// Where the bytes landed on success.
        path: Option<PathBuf>,
        /// Failure description on error.
        error: Option<String>,
    },
    /// A resource transfer started, in either direction.
    ResourceStarted {
        /// The peer on the other end.
        peer: PeerIdentity,
        /// Resource name.
        name: String,
    },
    /// Progress for an in-flight resource transfer.
    TransferProgress {
        /// The peer on the other end.
        peer: PeerIdentity,
        /// Fraction completed in `0.0..=1.0`.
        fraction: f64,
    },
    /// An outbound resource transfer finished.
    ResourceCompleted {
        /// The peer the resource was sent to.
        peer: PeerIdentity,
        /// Failure description on error.
        error: Option<String>,
    },
    /// Browsing or advertising failed.
    DiscoveryFailed {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Commands the presentation domain sends to the agent.
#[derive(Debug)]
pub enum AgentCommand {
    /// Invite a peer to a session.
    Invite {
        /// The peer to invite.
        id: PeerId,
    },
    /// Send a small message.
    Send {
        /// The destination peer.
        id: PeerId,
        /// Encoded payload.
        data: Bytes,
    },
    /// Send a file-like resource.
    SendResource {
        /// The destination peer.
        id: PeerId,
        /// Path of the resource on disk.
        path: PathBuf,
    },
    /// Answer the pending inbound invitation.
    RespondInvitation {
        /// `true` to accept.
        accept: bool,
    },
    /// Tear down and re-establish the transport bindings.
    Reset,
    /// Stop the agent for good.
    Shutdown,
}

/// The network-domain task. Constructed and consumed by [`spawn`](Self::spawn).
pub struct NetworkAgent {
    transport: Box<dyn Transport>,
    registry: PeerIdentityRegistry,
    /// Responder for the at-most-one pending inbound invitation.
    /// Single-owner: consumed when the decision arrives, dropped when a
    /// newer invitation supersedes it.
    pending_responder: Option<oneshot::Sender<bool>>,
    events: mpsc::Sender<AgentEvent>,
}

impl NetworkAgent {
    /// Spawn the agent task over a transport.
    ///
    /// Returns the command sender, the event receiver, and the task
    /// handle. The agent starts advertising and discovery immediately;
    /// startup failures surface as [`AgentEvent::DiscoveryFailed`], not
    /// as errors here.
    pub fn spawn(
        mut transport: Box<dyn Transport>,
        event_buffer: usize,
        command_buffer: usize,
    ) -> HuddleResult<(
        mpsc::Sender<AgentCommand>,
        mpsc::Receiver<AgentEvent>,
        JoinHandle<()>,
    )> {
        let transport_events = transport
            .take_events()
            .ok_or_else(|| HuddleError::Transport("transport event stream already taken".into()))?;

        let (events_tx, events_rx) = mpsc::channel(event_buffer);
        let (commands_tx, commands_rx) = mpsc::channel(command_buffer);

        let agent = Self {
            transport,
            registry: PeerIdentityRegistry::new(),
            pending_responder: None,
            events: events_tx,
        };

        let task = tokio::spawn(agent.run(transport_events, commands_rx));

        Ok((commands_tx, events_rx, task))
    }

    async fn run(
        mut self,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        mut commands: mpsc::Receiver<AgentCommand>,
    ) {
        self.start_transport().await;
        info!("Network agent started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(AgentCommand::Shutdown) | None => {
                        // Channel closure means the presentation domain is
                        // gone; either way, release in dependency order.
                        self.stop_transport().await;
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        warn!("Transport event stream closed, stopping agent");
                        break;
                    }
                },
            }
        }

        info!("Network agent stopped");
    }

    /// Start advertising and discovery. Failures are events, not errors.
    async fn start_transport(&mut self) {
        if let Err(e) = self.transport.start_advertising().await {
            warn!(error = %e, "Failed to start advertising");
            self.emit(AgentEvent::DiscoveryFailed {
                reason: e.to_string(),
            })
            .await;
        }
        if let Err(e) = self.transport.start_discovery().await {
            warn!(error = %e, "Failed to start discovery");
            self.emit(AgentEvent::DiscoveryFailed {
                reason: e.to_string(),
            })
            .await;
        }
    }

    /// Release the transport in dependency order: stop discovery, stop
    /// advertising, then disconnect sessions.
    async fn stop_transport(&mut self) {
        if let Err(e) = self.transport.stop_discovery().await {
            warn!(error = %e, "Failed to stop discovery");
        }
        if let Err(e) = self.transport.stop_advertising().await {
            warn!(error = %e, "Failed to stop advertising");
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Failed to disconnect");
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerDiscovered {
                handle,
                discovery_info,
            } => {
                let identity = self.registry.resolve(&handle);
                debug!(peer = %identity, "Peer discovered");
                self.emit(AgentEvent::PeerFound {
                    identity,
                    discovery_info,
                })
                .await;
                self.emit_peers_changed().await;
            }
            TransportEvent::PeerLost { handle } => {
                match self.registry.forget(&handle) {
                    Some(identity) => {
                        debug!(peer = %identity, "Peer lost");
                        self.emit(AgentEvent::PeerLost { identity }).await;
                        self.emit_peers_changed().await;
                    }
                    // Lost-peer for a handle we never registered.
                    None => debug!(%handle, "Ignoring loss of unknown handle"),
                }
            }
            TransportEvent::DiscoveryFailed { reason } => {
                warn!(%reason, "Discovery failed");
                self.emit(AgentEvent::DiscoveryFailed { reason }).await;
            }
            TransportEvent::LinkStateChanged { handle, state } => {
                // Peer not yet registered: drop the event rather than
                // minting an identity for a peer discovery hasn't reported.
                if !self.registry.contains(&handle) {
                    debug!(%handle, "Dropping state change for unknown handle");
                    return;
                }
                let identity = self.registry.resolve(&handle);
                self.emit(AgentEvent::StateChanged {
                    id: identity.id,
                    state: map_link_state(state),
                })
                .await;
            }
            TransportEvent::DataReceived { handle, data } => {
                let from = self.registry.resolve(&handle);
                self.emit(AgentEvent::MessageReceived { from, data }).await;
            }
            TransportEvent::ResourceStarted {
                handle,
                name,
                progress,
            } => {
                let peer = self.registry.resolve(&handle);
                self.emit(AgentEvent::ResourceStarted {
                    peer: peer.clone(),
                    name,
                })
                .await;
                self.watch_progress(peer, progress);
            }
            TransportEvent::ResourceCompleted {
                handle,
                name,
                direction,
                local_path,
                error,
            } => {
                let peer = self.registry.resolve(&handle);
                match direction {
                    TransferDirection::Inbound => {
                        self.emit(AgentEvent::FileReceived {
                            from: peer,
                            name,
                            path: local_path,
                            error,
                        })
                        .await;
                    }
                    TransferDirection::Outbound => {
                        self.emit(AgentEvent::ResourceCompleted { peer, error }).await;
                    }
                }
            }
            TransportEvent::InvitationReceived {
                handle,
                context: _,
                responder,
            } => {
                let from = self.registry.resolve(&handle);
                if self.pending_responder.replace(responder).is_some() {
                    // Last-writer-wins: the superseded responder is dropped
                    // un-invoked, which the transport reads as a decline.
                    warn!(peer = %from, "New invitation supersedes a pending one");
                }
                self.emit(AgentEvent::InvitationReceived { from }).await;
            }
        }
    }

    async fn handle_command(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::Invite { id } => {
                let Some(handle) = self.registry.handle_for(id).cloned() else {
                    debug!(%id, "Dropping invite for stale peer");
                    return;
                };
                if let Err(e) = self.transport.invite(&handle).await {
                    warn!(%handle, error = %e, "Invite failed");
                }
            }
            AgentCommand::Send { id, data } => {
                let Some(handle) = self.registry.handle_for(id).cloned() else {
                    debug!(%id, "Dropping send for stale peer");
                    return;
                };
                if let Err(e) = self.transport.send(&handle, data).await {
                    warn!(%handle, error = %e, "Send failed");
                }
            }
            AgentCommand::SendResource { id, path } => {
                let Some(handle) = self.registry.handle_for(id).cloned() else {
                    debug!(%id, "Dropping resource send for stale peer");
                    return;
                };
                let Some(peer) = self.registry.identity(id).cloned() else {
                    return;
                };
                match self.transport.send_resource(&handle, &path).await {
                    Ok(progress) => {
                        let name = path
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string());
                        self.emit(AgentEvent::ResourceStarted {
                            peer: peer.clone(),
                            name,
                        })
                        .await;
                        self.watch_progress(peer, progress);
                    }
                    Err(e) => warn!(%handle, error = %e, "Resource send failed"),
                }
            }
            AgentCommand::RespondInvitation { accept } => match self.pending_responder.take() {
                Some(responder) => {
                    if responder.send(accept).is_err() {
                        debug!("Invitation responder dropped by transport");
                    }
                }
                None => debug!("No pending invitation to respond to"),
            },
            AgentCommand::Reset => {
                info!("Resetting network agent");
                self.stop_transport().await;
                self.registry.clear();
                self.pending_responder = None;
                self.emit_peers_changed().await;
                self.start_transport().await;
            }
            // Shutdown is intercepted by the run loop.
            AgentCommand::Shutdown => {}
        }
    }

    /// Forward a transfer's progress stream into the event channel until
    /// the transport drops its end.
    fn watch_progress(&self, peer: PeerIdentity, mut progress: watch::Receiver<f64>) {
        let events = self.events.clone();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let fraction = *progress.borrow_and_update();
                let event = AgentEvent::TransferProgress {
                    peer: peer.clone(),
                    fraction,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });
    }

    async fn emit_peers_changed(&self) {
        self.emit(AgentEvent::PeersChanged {
            peers: self.registry.identities(),
        })
        .await;
    }

    async fn emit(&self, event: AgentEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Presentation domain dropped the event channel");
        }
    }
}

/// Map the transport's raw session state onto the application-level enum.
fn map_link_state(state: LinkState) -> ConnectionState {
    match state {
        LinkState::Connecting => ConnectionState::Connecting,
        LinkState::Connected => ConnectionState::Connected,
        LinkState::NotConnected => ConnectionState::NotConnected,
    }
}
