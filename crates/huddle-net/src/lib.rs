//! huddle network domain — transport boundary, identity registry, agent.
//!
//! Everything that touches transport-level peer handles lives in this
//! crate, behind the [`NetworkAgent`] task. The agent owns the
//! [`PeerIdentityRegistry`] and the live [`Transport`] binding; it
//! translates raw transport events into identity-keyed [`AgentEvent`]s
//! for the presentation domain, and [`AgentCommand`]s back into transport
//! calls. No transport handle ever crosses the agent boundary.
//!
//! ## Architecture
//!
//! - **Transport**: trait boundary to the peer-to-peer framework
//! - **PeerIdentityRegistry**: handle ↔ identity mapping, sole identity minter
//! - **NetworkAgent**: single-writer task bridging the two domains
//! - **protocol**: the small-message wire convention (text + ACK token)
//! - **MemoryTransport**: in-process loopback transport for tests and demos

pub mod agent;
pub mod memory;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use agent::{AgentCommand, AgentEvent, NetworkAgent};
pub use memory::{MemoryHub, MemoryTransport};
pub use protocol::WirePayload;
pub use registry::PeerIdentityRegistry;
pub use transport::{
    LinkState, TransferDirection, Transport, TransportError, TransportEvent, TransportHandle,
};
