use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::SwimError;

/// Identity of a cluster participant.
///
/// Two identities are equal iff host and port match exactly; `"127.0.0.1"` and
/// `"localhost"` are different nodes as far as the protocol is concerned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<SocketAddr> for NodeAddr {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = SwimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| SwimError::InvalidConfig(format!("expected host:port, got `{}`", s)))?;

        if host.is_empty() {
            return Err(SwimError::InvalidConfig(format!("missing host in `{}`", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| SwimError::InvalidConfig(format!("bad port in `{}`: {}", s, e)))?;

        Ok(Self::new(host, port))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MemberState {
    Alive,
    Suspect,
    Faulty,
}

/// A single entry of the membership table.
///
/// `incarnation` is only ever raised by the node it describes and orders
/// conflicting claims about that node. `set_by` records who asserted the
/// current state and plays no part in conflict resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub node: NodeAddr,
    pub state: MemberState,
    pub set_by: NodeAddr,
    pub incarnation: u64,
}
