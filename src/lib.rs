//! SWIM Cluster Membership Library
//!
//! A decentralized membership service: every node keeps an eventually
//! consistent view of which peers are alive, suspected or faulty, using
//! randomized probing and gossip piggybacked on the probe traffic.
//!
//! ## Architecture Modules
//! The protocol core is four tightly coupled state machines:
//!
//! - **`membership`**: The local view. Member records, the round-robin probe
//!   cursor with periodic reshuffle, and change signals for the node runtime.
//! - **`dissemination`**: The gossip queue and the only authority on accepting
//!   claims about members (incarnation-number conflict resolution, bounded
//!   retransmission, expiry of seen updates).
//! - **`failure`**: The probe cycle (PING, PING-REQ, ACK) and its escalation to
//!   SUSPECT.
//! - **`join`**: The bootstrap handshake with the seed hosts.
//!
//! Around it:
//!
//! - **`net`**: Wire messages, bincode codec and the UDP transport.
//! - **`metadata`**: A best-effort key/value side-channel between members.
//! - **`node`**: [`SwimNode`], which wires everything together, owns the
//!   socket, timers and background loops, and publishes [`SwimEvent`]s.
//! - **`config`**, **`error`**, **`effect`**, **`event`**: shared types.

pub mod config;
pub mod dissemination;
pub mod effect;
pub mod error;
pub mod event;
pub mod failure;
pub mod join;
pub mod membership;
pub mod metadata;
pub mod net;
pub mod node;

pub use config::SwimConfig;
pub use error::{Result, SwimError};
pub use event::SwimEvent;
pub use membership::{Member, MemberState, NodeAddr};
pub use metadata::{MetaEntry, NodeMetadata};
pub use node::{NodeStatus, SwimNode, WhoAmI};
