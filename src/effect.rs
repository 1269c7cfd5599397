//! Side effects requested by the protocol state machines.
//!
//! The membership table, dissemination engine, failure detector and join
//! protocol never touch sockets or clocks. They return [`Effect`]s and the node
//! runtime carries them out.

use std::time::Duration;

use crate::event::SwimEvent;
use crate::membership::NodeAddr;
use crate::net::Message;

/// Identifies an armed timer. At most one timer exists per key; arming an
/// already armed key replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Waiting for the direct ACK of a PING.
    Ping(NodeAddr),
    /// Waiting for any relayed ACK after PING-REQs.
    PingReq(NodeAddr),
    /// Grace period before a SUSPECT member is declared FAULTY.
    Suspect(NodeAddr),
    /// Waiting for the first JOIN-ACK.
    Join,
}

#[derive(Debug, Clone)]
pub enum Effect {
    /// Send `message`; pending gossip is piggybacked when it is encoded.
    Send { to: NodeAddr, message: Message },
    Arm { timer: TimerKey, after: Duration },
    Disarm(TimerKey),
    Emit(SwimEvent),
}
