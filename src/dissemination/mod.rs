//! Dissemination Engine
//!
//! Owns the outbound gossip queue and is the only component allowed to accept,
//! reject or propagate claims about member state.
//!
//! ## Core Mechanisms
//! - **Piggybacking**: every outbound PING, PING-REQ and ACK carries the least
//!   gossiped updates, up to `updates_max_size` of them.
//! - **Bounded redundancy**: an update is retransmitted at most
//!   `ceil(dissemination_factor * log10(N + 1))` times, then evicted.
//! - **Incarnation numbers**: higher incarnation wins; a node always refutes
//!   SUSPECT/FAULTY claims about itself by raising its own.
//! - **Expiry sets**: evicted uuids and freshly FAULTY nodes are remembered for a
//!   short while, so late duplicates and stale ALIVE claims are dropped.

pub mod engine;
pub mod types;

pub use engine::DisseminationEngine;
pub use types::Update;
