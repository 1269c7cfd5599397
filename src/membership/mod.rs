//! Membership Table
//!
//! The authoritative local view of the cluster. Holds one record per known node
//! (ALIVE or SUSPECT; FAULTY nodes are removed, never stored) and serves the
//! probe-target queries of the failure detector.
//!
//! ## Core Mechanisms
//! - **Random insertion**: new members land at a random position so the probe
//!   order carries no bias towards join order.
//! - **Round-robin selection**: a persistent cursor walks the table; when it
//!   wraps, the table is reshuffled. Every member is probed at least once per pass.
//! - **Change signals**: mutations queue [`TableEvent`]s that the node drains and
//!   turns into peer up/down notifications and suspicion timers.

pub mod table;
pub mod types;

pub use table::{MembershipTable, TableEvent};
pub use types::{Member, MemberState, NodeAddr};
