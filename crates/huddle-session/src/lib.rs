//! huddle presentation domain.
//!
//! The [`SessionCoordinator`] owns the UI-safe view of nearby peers:
//! the active peer list, per-peer connection states, the at-most-one
//! pending invitation, per-peer transfer progress, and the optional
//! administrator designation. It receives [`AgentEvent`]s from the
//! network agent and issues [`AgentCommand`]s back; the UI collaborator
//! calls its methods and observes it through [`SessionObserver`].
//!
//! [`AgentEvent`]: huddle_net::AgentEvent
//! [`AgentCommand`]: huddle_net::AgentCommand

pub mod config;
pub mod coordinator;
pub mod observer;

pub use config::load_config;
pub use coordinator::{PeerRow, Phase, SessionCoordinator};
pub use observer::{NullObserver, SessionObserver};
