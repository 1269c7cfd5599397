use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    Stopped,
    /// Bound and probing, but not (yet) part of a joined cluster.
    Started,
    Joined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhoAmI {
    /// `None` until our externally visible host is known.
    pub host: Option<String>,
    pub port: u16,
    pub status: NodeStatus,
}
