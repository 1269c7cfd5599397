//! Error types

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::membership::NodeAddr;

/// Result type for membership operations
pub type Result<T> = std::result::Result<T, SwimError>;

#[derive(Debug, Error)]
pub enum SwimError {
    // ==================== Transport Errors ====================
    #[error("failed to bind UDP socket at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    // ==================== Codec Errors ====================
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("datagram too large: {size} bytes (max {max})")]
    DatagramTooLarge { size: usize, max: usize },

    // ==================== Protocol Errors ====================
    #[error("timeout triggered in joining with {}", format_seeds(.seeds))]
    JoinTimeout { seeds: Vec<NodeAddr> },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    // ==================== Lifecycle Errors ====================
    #[error("node is already running")]
    AlreadyRunning,

    #[error("node is not running")]
    NotRunning,

    // ==================== Configuration Errors ====================
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

fn format_seeds(seeds: &[NodeAddr]) -> String {
    let seeds: Vec<String> = seeds.iter().map(|s| s.to_string()).collect();
    format!("[{}]", seeds.join(", "))
}
