//! Failure detector
//!
//! Drives the SWIM probe cycle:
//! - every interval, PING the next member from the round-robin cursor;
//! - no ACK within `ping_timeout` → PING-REQ a group of other members;
//! - no relayed ACK within `ping_req_timeout` → mark the target SUSPECT.
//!
//! It also answers PINGs and serves as a relay for other nodes' PING-REQs.

pub mod detector;

pub use detector::FailureDetector;

#[cfg(test)]
mod tests;
