//! Loopback demo: two sessions on one [`MemoryHub`].

use anyhow::{bail, Context, Result};
use huddle_net::{AgentEvent, MemoryHub};
use huddle_session::{SessionCoordinator, SessionObserver};
use huddle_types::{PeerIdentity, SessionConfig};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::info;

/// Observer that logs notifications and counts the interesting ones.
#[derive(Default)]
struct DemoObserver {
    side: String,
    messages: AtomicUsize,
    files: AtomicUsize,
    transfers_done: AtomicUsize,
}

impl DemoObserver {
    fn new(side: &str) -> Self {
        Self {
            side: side.to_string(),
            ..Self::default()
        }
    }
}

impl SessionObserver for DemoObserver {
    fn peer_found(&self, peer: &PeerIdentity, _info: Option<&HashMap<String, String>>) {
        info!(side = %self.side, peer = %peer.display_name, "Peer found");
    }

    fn peer_lost(&self, peer: &PeerIdentity) {
        info!(side = %self.side, peer = %peer.display_name, "Peer lost");
    }

    fn invitation_received(&self, from: &PeerIdentity) {
        info!(side = %self.side, from = %from.display_name, "Invitation received");
    }

    fn peer_state_changed(&self) {
        info!(side = %self.side, "Peer state changed");
    }

    fn message_received(&self, from: &PeerIdentity, text: &str) {
        info!(side = %self.side, from = %from.display_name, %text, "Message received");
        self.messages.fetch_add(1, Ordering::SeqCst);
    }

    fn file_received(&self, from: &PeerIdentity, path: &Path, name: &str) {
        info!(
            side = %self.side,
            from = %from.display_name,
            %name,
            path = %path.display(),
            "File received"
        );
        self.files.fetch_add(1, Ordering::SeqCst);
    }

    fn transfer_progress(&self, peer: &PeerIdentity, fraction: Option<f64>) {
        match fraction {
            Some(fraction) => {
                info!(side = %self.side, peer = %peer.display_name, fraction, "Transfer progress");
            }
            None => {
                info!(side = %self.side, peer = %peer.display_name, "Transfer finished");
                self.transfers_done.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

struct Side {
    coordinator: SessionCoordinator,
    events: mpsc::Receiver<AgentEvent>,
    observer: Arc<DemoObserver>,
}

impl Side {
    fn start(hub: &MemoryHub, config: SessionConfig) -> Result<Self> {
        let observer = Arc::new(DemoObserver::new(&config.display_name));
        let name = config.display_name.clone();
        let mut coordinator = SessionCoordinator::new(config, observer.clone());
        let events = coordinator
            .start(Box::new(hub.endpoint(name)))
            .context("starting session")?;
        Ok(Self {
            coordinator,
            events,
            observer,
        })
    }

    /// Pump agent events until the predicate holds.
    async fn wait(
        &mut self,
        what: &str,
        predicate: impl Fn(&SessionCoordinator, &DemoObserver) -> bool,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !predicate(&self.coordinator, &self.observer) {
            let remaining = deadline - tokio::time::Instant::now();
            let Ok(event) = timeout(remaining, self.events.recv()).await else {
                bail!("timed out waiting for: {what}");
            };
            let Some(event) = event else {
                bail!("network agent stopped while waiting for: {what}");
            };
            self.coordinator.handle_event(event).await;
        }
        Ok(())
    }
}

/// Run the demo: discovery, invitation, a message with its ACK, a file
/// transfer with progress, and a clean teardown.
pub async fn run(config: SessionConfig) -> Result<()> {
    let hub = MemoryHub::new();
    let host_name = config.display_name.clone();

    let mut host = Side::start(&hub, config.clone())?;
    let mut visitor = Side::start(
        &hub,
        SessionConfig {
            display_name: "visitor".into(),
            ..config
        },
    )?;

    host.wait("discovery", |c, _| c.peers().len() == 1).await?;
    visitor
        .wait("discovery", |c, _| c.peers().len() == 1)
        .await?;
    let visitor_peer = host.coordinator.peers()[0].clone();
    let host_peer = visitor.coordinator.peers()[0].clone();

    host.coordinator.invite(visitor_peer.id).await?;
    visitor
        .wait("invitation", |c, _| c.pending_invitation().is_some())
        .await?;
    visitor.coordinator.accept_invitation(true).await?;

    host.wait("session", |c, _| {
        c.connection_state(visitor_peer.id).is_connected()
    })
    .await?;
    visitor
        .wait("session", |c, _| {
            c.connection_state(host_peer.id).is_connected()
        })
        .await?;

    host.coordinator
        .send_message(&format!("hello from {host_name}"), visitor_peer.id)
        .await?;
    visitor
        .wait("message", |_, o| o.messages.load(Ordering::SeqCst) == 1)
        .await?;

    let dir = tempfile::tempdir()?;
    let source = dir.path().join("huddle-demo.txt");
    tokio::fs::write(&source, b"shared over the loopback transport\n").await?;
    host.coordinator.send_file(&source, visitor_peer.id).await?;
    visitor
        .wait("file", |_, o| o.files.load(Ordering::SeqCst) == 1)
        .await?;
    host.wait("transfer teardown", |c, o| {
        c.transfer_progress(visitor_peer.id).is_none() && o.transfers_done.load(Ordering::SeqCst) >= 1
    })
    .await?;

    visitor.coordinator.shutdown().await?;
    host.wait("peer loss", |c, _| c.peers().is_empty()).await?;
    host.coordinator.shutdown().await?;

    info!("Demo finished");
    Ok(())
}
