//! Join protocol
//!
//! A new node sends JOIN to every seed and adopts the membership snapshot of
//! the first JOIN-ACK. The sponsor side answers any JOIN with its own table.

pub mod protocol;

pub use protocol::{JoinProtocol, JoinState};
