use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::membership::{MemberState, NodeAddr};

/// One gossiped assertion about a node's state.
///
/// `uuid` identifies the assertion itself, independently of the member it is
/// about, so a duplicate can be recognised even after the table moved on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Update {
    pub node: NodeAddr,
    pub set_by: NodeAddr,
    pub state: MemberState,
    pub incarnation: u64,
    pub uuid: Uuid,

    /// Local retransmission counter. Not sent on the wire.
    #[serde(skip)]
    pub gossip_count: u32,
}

impl Update {
    pub fn new(node: NodeAddr, set_by: NodeAddr, state: MemberState, incarnation: u64) -> Self {
        Self {
            node,
            set_by,
            state,
            incarnation,
            uuid: Uuid::new_v4(),
            gossip_count: 0,
        }
    }

    /// Same claim about the same node, regardless of who made it or its uuid.
    pub fn is_equivalent(&self, node: &NodeAddr, state: MemberState, incarnation: u64) -> bool {
        &self.node == node && self.state == state && self.incarnation == incarnation
    }
}
