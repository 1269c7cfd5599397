use std::sync::Arc;

use crate::error::SwimError;
use crate::membership::NodeAddr;
use crate::metadata::NodeMetadata;

/// Observable events of a running node, delivered over a broadcast channel
/// (see [`SwimNode::subscribe`](crate::node::SwimNode::subscribe)).
#[derive(Debug, Clone)]
pub enum SwimEvent {
    /// The UDP socket is bound to this port.
    Up(u16),
    /// The first JOIN-ACK was received and the membership table initialised.
    Joined,
    /// No JOIN-ACK arrived within the join timeout. Carries a
    /// [`SwimError::JoinTimeout`] naming the seeds that were tried.
    JoinTimeout(Arc<SwimError>),
    /// The membership table was replaced as a whole.
    UpdatedMembers(Vec<NodeAddr>),
    PeerUp(NodeAddr),
    PeerSuspected(NodeAddr),
    /// A peer was confirmed FAULTY and removed.
    PeerDown(NodeAddr),
    NewMetadata(Vec<NodeMetadata>),
    Error(Arc<SwimError>),
}
