//! Wire protocol and UDP transport.
//!
//! - **`message`**: the tagged union of every datagram exchanged between nodes.
//! - **`codec`**: bincode encoding with a hard cap at one UDP payload.
//! - **`transport`**: a thin wrapper over `tokio::net::UdpSocket`.

pub mod codec;
pub mod message;
pub mod transport;

pub use codec::{MAX_DATAGRAM_SIZE, decode, encode};
pub use message::{Message, ProbeRequest};
pub use transport::Transport;

#[cfg(test)]
mod tests;
