use serde::{Deserialize, Serialize};

use crate::dissemination::Update;
use crate::membership::{Member, NodeAddr};
use crate::metadata::NodeMetadata;

/// Identifies an indirect probe: who should be probed, and on whose behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeRequest {
    pub target: NodeAddr,
    pub requester: NodeAddr,
}

/// Every datagram exchanged between nodes.
///
/// `destination` is the address the sender used to reach us. A node that does
/// not yet know its own externally visible host learns it from there.
///
/// - `Join/JoinAck`: bootstrap handshake; the ack carries the sponsor's full table.
/// - `Ping/PingReq/Ack`: the probe cycle. All three piggyback gossip updates.
/// - `Meta/AllMeta`: best-effort metadata side-channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    Join {
        destination: NodeAddr,
    },

    JoinAck {
        destination: NodeAddr,
        members: Vec<Member>,
    },

    Ping {
        destination: NodeAddr,
        updates: Vec<Update>,
    },

    PingReq {
        destination: NodeAddr,
        request: ProbeRequest,
        updates: Vec<Update>,
    },

    /// `request` is set only when acking on behalf of a PING-REQ relay.
    Ack {
        destination: NodeAddr,
        request: Option<ProbeRequest>,
        updates: Vec<Update>,
    },

    Meta {
        metadata: Vec<NodeMetadata>,
    },

    AllMeta {
        destination: NodeAddr,
    },
}

impl Message {
    pub fn ping(destination: NodeAddr) -> Self {
        Message::Ping {
            destination,
            updates: Vec::new(),
        }
    }

    pub fn ping_req(destination: NodeAddr, request: ProbeRequest) -> Self {
        Message::PingReq {
            destination,
            request,
            updates: Vec::new(),
        }
    }

    pub fn ack(destination: NodeAddr, request: Option<ProbeRequest>) -> Self {
        Message::Ack {
            destination,
            request,
            updates: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join { .. } => "JOIN",
            Message::JoinAck { .. } => "JOIN_ACK",
            Message::Ping { .. } => "PING",
            Message::PingReq { .. } => "PING_REQ",
            Message::Ack { .. } => "ACK",
            Message::Meta { .. } => "META",
            Message::AllMeta { .. } => "ALL_META",
        }
    }

    /// The piggyback slot, for the kinds that carry one.
    pub fn updates_mut(&mut self) -> Option<&mut Vec<Update>> {
        match self {
            Message::Ping { updates, .. }
            | Message::PingReq { updates, .. }
            | Message::Ack { updates, .. } => Some(updates),
            _ => None,
        }
    }

    pub fn take_updates(&mut self) -> Vec<Update> {
        self.updates_mut().map(std::mem::take).unwrap_or_default()
    }
}
