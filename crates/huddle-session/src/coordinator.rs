//! SessionCoordinator — the authoritative UI-facing session state.
//!
//! The coordinator lives on the presentation domain. It is single-writer:
//! the owner feeds it [`AgentEvent`]s from the receiver returned by
//! [`SessionCoordinator::start`] and calls action methods on behalf of
//! the UI; both go through `&mut self`, so re-entrancy is impossible by
//! construction. No network-domain state is ever touched directly;
//! everything crosses over the two channels.
//!
//! Lifecycle: `new` (uninitialized) → `start` (ready) → `reset` /
//! `shutdown`. Every UI-facing operation is guarded by the phase tag and
//! returns a typed error instead of silently doing nothing when the
//! session is not ready.

use crate::observer::SessionObserver;
use huddle_net::agent::{AgentCommand, AgentEvent, NetworkAgent};
use huddle_net::protocol::{self, WirePayload};
use huddle_net::Transport;
use huddle_types::{
    ConnectionState, HuddleError, HuddleResult, PeerId, PeerIdentity, SessionConfig,
    TransferProgress,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, no network agent yet.
    Uninitialized,
    /// Agent running, operations accepted.
    Ready,
    /// Tearing down; operations are rejected.
    ShuttingDown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Ready => "ready",
            Phase::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}

/// One row of the UI peer list.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRow {
    /// The peer's stable identity.
    pub identity: PeerIdentity,
    /// Its current connection state.
    pub state: ConnectionState,
}

impl PeerRow {
    /// Whether message/file actions toward this peer should be enabled.
    pub fn can_message(&self) -> bool {
        self.state.is_connected()
    }
}

/// UI-facing session state and command surface.
pub struct SessionCoordinator {
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    phase: Phase,
    /// Active peers in discovery order.
    peers: Vec<PeerIdentity>,
    /// Recorded connection-state transitions. Peers with no entry are
    /// NotConnected.
    states: HashMap<PeerId, ConnectionState>,
    /// At most one pending inbound invitation; the responder itself stays
    /// in the network domain.
    pending_invitation: Option<PeerIdentity>,
    /// Fractions of in-flight resource transfers.
    progress: HashMap<PeerId, f64>,
    administrator: Option<PeerIdentity>,
    commands: Option<mpsc::Sender<AgentCommand>>,
    agent_task: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    /// Construct an uninitialized coordinator.
    pub fn new(config: SessionConfig, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            config,
            observer,
            phase: Phase::Uninitialized,
            peers: Vec::new(),
            states: HashMap::new(),
            pending_invitation: None,
            progress: HashMap::new(),
            administrator: None,
            commands: None,
            agent_task: None,
        }
    }

    /// Spawn the network agent over a transport and become ready.
    ///
    /// Returns the event receiver the owner must drain into
    /// [`handle_event`](Self::handle_event).
    pub fn start(
        &mut self,
        transport: Box<dyn Transport>,
    ) -> HuddleResult<mpsc::Receiver<AgentEvent>> {
        match self.phase {
            Phase::Uninitialized => {}
            Phase::Ready => {
                return Err(HuddleError::InvalidPhase {
                    current: self.phase.to_string(),
                    operation: "start".into(),
                })
            }
            Phase::ShuttingDown => return Err(HuddleError::ShuttingDown),
        }

        let (commands, events, task) =
            NetworkAgent::spawn(transport, self.config.event_buffer, self.config.command_buffer)?;
        self.commands = Some(commands);
        self.agent_task = Some(task);
        self.phase = Phase::Ready;
        info!(
            display_name = %self.config.display_name,
            service = %self.config.service_name,
            "Session started"
        );
        Ok(events)
    }

    // ---- Event handling (network → presentation) ----

    /// Apply one agent event to the session state and notify the observer.
    pub async fn handle_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::PeerFound {
                identity,
                discovery_info,
            } => {
                if self.contains(identity.id) {
                    return;
                }
                self.peers.push(identity.clone());
                self.observer.peer_found(&identity, discovery_info.as_ref());
            }
            AgentEvent::PeerLost { identity } => {
                self.peers.retain(|peer| peer.id != identity.id);
                self.states.remove(&identity.id);
                if self.progress.remove(&identity.id).is_some() {
                    self.observer.transfer_progress(&identity, None);
                }
                if self
                    .administrator
                    .as_ref()
                    .is_some_and(|admin| admin.id == identity.id)
                {
                    // The administrator must stay a subset of the active set.
                    self.administrator = None;
                }
                self.observer.peer_lost(&identity);
            }
            AgentEvent::PeersChanged { peers } => {
                self.peers = peers;
                let active: HashSet<PeerId> = self.peers.iter().map(|peer| peer.id).collect();
                self.states.retain(|id, _| active.contains(id));
                self.progress.retain(|id, _| active.contains(id));
                if self
                    .administrator
                    .as_ref()
                    .is_some_and(|admin| !active.contains(&admin.id))
                {
                    self.administrator = None;
                }
                self.observer.peers_updated();
            }
            AgentEvent::StateChanged { id, state } => {
                // No state transition for identities outside the active set.
                if !self.contains(id) {
                    debug!(%id, "Dropping state change for inactive peer");
                    return;
                }
                self.states.insert(id, state);
                self.observer.peer_state_changed();
            }
            AgentEvent::InvitationReceived { from } => {
                if let Some(previous) = self.pending_invitation.replace(from.clone()) {
                    // Last-writer-wins; the first inviter is never told.
                    warn!(superseded = %previous, "Pending invitation overwritten");
                }
                self.observer.invitation_received(&from);
            }
            AgentEvent::MessageReceived { from, data } => match protocol::decode(&data) {
                WirePayload::Ack => {
                    info!(peer = %from, "ACK received");
                }
                WirePayload::Text(text) => {
                    self.observer.message_received(&from, &text);
                    self.acknowledge(&from).await;
                }
            },
            AgentEvent::FileReceived {
                from,
                name,
                path,
                error,
            } => {
                if self.progress.remove(&from.id).is_some() {
                    self.observer.transfer_progress(&from, None);
                }
                match (path, error) {
                    (Some(path), None) => {
                        self.observer.file_received(&from, &path, &name);
                        self.acknowledge(&from).await;
                    }
                    (_, error) => {
                        warn!(peer = %from, %name, ?error, "File receive failed");
                    }
                }
            }
            AgentEvent::ResourceStarted { peer, name } => {
                debug!(peer = %peer, %name, "Resource transfer started");
                self.progress.insert(peer.id, 0.0);
                self.observer.transfer_progress(&peer, Some(0.0));
            }
            AgentEvent::TransferProgress { peer, fraction } => {
                // Progress is only meaningful between start and completion;
                // a late update racing the completion event is dropped.
                if let Some(entry) = self.progress.get_mut(&peer.id) {
                    *entry = fraction;
                    self.observer.transfer_progress(&peer, Some(fraction));
                }
            }
            AgentEvent::ResourceCompleted { peer, error } => {
                if let Some(error) = &error {
                    warn!(peer = %peer, %error, "Resource send failed");
                }
                if self.progress.remove(&peer.id).is_some() {
                    self.observer.transfer_progress(&peer, None);
                }
            }
            AgentEvent::DiscoveryFailed { reason } => {
                warn!(%reason, "Discovery failed");
            }
        }
    }

    // ---- Actions (UI → network) ----

    /// Send a text message to a peer.
    pub async fn send_message(&mut self, text: &str, to: PeerId) -> HuddleResult<()> {
        self.ensure_ready("send_message")?;
        self.send_command(AgentCommand::Send {
            id: to,
            data: protocol::encode_text(text),
        })
        .await
    }

    /// Send a file to a peer.
    pub async fn send_file(&mut self, path: impl Into<PathBuf>, to: PeerId) -> HuddleResult<()> {
        self.ensure_ready("send_file")?;
        self.send_command(AgentCommand::SendResource {
            id: to,
            path: path.into(),
        })
        .await
    }

    /// Invite a peer to a session.
    pub async fn invite(&mut self, to: PeerId) -> HuddleResult<()> {
        self.ensure_ready("invite")?;
        self.send_command(AgentCommand::Invite { id: to }).await
    }

    /// Answer the pending invitation. With no invitation pending this is
    /// a no-op.
    pub async fn accept_invitation(&mut self, accept: bool) -> HuddleResult<()> {
        self.ensure_ready("accept_invitation")?;
        match self.pending_invitation.take() {
            Some(from) => {
                info!(peer = %from, accept, "Answering invitation");
                self.send_command(AgentCommand::RespondInvitation { accept })
                    .await
            }
            None => {
                debug!("accept_invitation called with no pending invitation");
                Ok(())
            }
        }
    }

    /// Designate a peer as administrator. Peers outside the active set
    /// are ignored.
    pub fn assign_administrator(&mut self, id: PeerId) -> HuddleResult<()> {
        self.ensure_ready("assign_administrator")?;
        match self.peers.iter().find(|peer| peer.id == id) {
            Some(identity) => {
                info!(peer = %identity, "Administrator assigned");
                self.administrator = Some(identity.clone());
            }
            None => debug!(%id, "Ignoring administrator assignment for inactive peer"),
        }
        Ok(())
    }

    /// Clear the administrator designation.
    pub fn clear_administrator(&mut self) -> HuddleResult<()> {
        self.ensure_ready("clear_administrator")?;
        self.administrator = None;
        Ok(())
    }

    /// Tear down and re-establish the transport bindings, clearing all
    /// session state.
    pub async fn reset(&mut self) -> HuddleResult<()> {
        self.ensure_ready("reset")?;
        info!("Resetting session");
        self.clear_tables();
        self.observer.peers_updated();
        self.send_command(AgentCommand::Reset).await
    }

    /// Stop the session for good. Idempotent; safe to call from any phase.
    pub async fn shutdown(&mut self) -> HuddleResult<()> {
        if self.phase != Phase::Ready {
            return Ok(());
        }
        self.phase = Phase::ShuttingDown;
        info!("Shutting down session");
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(AgentCommand::Shutdown).await;
        }
        if let Some(task) = self.agent_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Agent task ended abnormally");
            }
        }
        self.clear_tables();
        Ok(())
    }

    // ---- Queries ----

    /// Active peers in discovery order.
    pub fn peers(&self) -> &[PeerIdentity] {
        &self.peers
    }

    /// Peer list joined with connection states, for rendering.
    pub fn peer_rows(&self) -> Vec<PeerRow> {
        self.peers
            .iter()
            .map(|identity| PeerRow {
                identity: identity.clone(),
                state: self.connection_state(identity.id),
            })
            .collect()
    }

    /// Connection state for a peer. Identities outside the active set
    /// report NotConnected.
    pub fn connection_state(&self, id: PeerId) -> ConnectionState {
        if !self.contains(id) {
            return ConnectionState::NotConnected;
        }
        self.states.get(&id).copied().unwrap_or_default()
    }

    /// The current administrator, if one is designated.
    pub fn administrator(&self) -> Option<&PeerIdentity> {
        self.administrator.as_ref()
    }

    /// The peer whose invitation is awaiting an answer.
    pub fn pending_invitation(&self) -> Option<&PeerIdentity> {
        self.pending_invitation.as_ref()
    }

    /// Progress of the in-flight transfer with a peer, if any.
    pub fn transfer_progress(&self, id: PeerId) -> Option<TransferProgress> {
        let fraction = *self.progress.get(&id)?;
        let peer = self.peers.iter().find(|peer| peer.id == id)?;
        Some(TransferProgress {
            peer: peer.clone(),
            fraction_completed: fraction,
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    // ---- Internals ----

    fn contains(&self, id: PeerId) -> bool {
        self.peers.iter().any(|peer| peer.id == id)
    }

    fn clear_tables(&mut self) {
        self.peers.clear();
        self.states.clear();
        self.pending_invitation = None;
        self.progress.clear();
        self.administrator = None;
    }

    fn ensure_ready(&self, operation: &str) -> HuddleResult<()> {
        match self.phase {
            Phase::Ready => Ok(()),
            phase => Err(HuddleError::InvalidPhase {
                current: phase.to_string(),
                operation: operation.into(),
            }),
        }
    }

    /// Send exactly one acknowledgement back to a content sender.
    async fn acknowledge(&mut self, to: &PeerIdentity) {
        debug!(peer = %to, "Sending ACK");
        if let Err(e) = self
            .send_command(AgentCommand::Send {
                id: to.id,
                data: protocol::encode_ack(),
            })
            .await
        {
            warn!(peer = %to, error = %e, "Failed to queue ACK");
        }
    }

    async fn send_command(&self, command: AgentCommand) -> HuddleResult<()> {
        let Some(commands) = &self.commands else {
            return Err(HuddleError::ChannelClosed("agent command channel"));
        };
        commands
            .send(command)
            .await
            .map_err(|_| HuddleError::ChannelClosed("agent command channel"))
    }
}
