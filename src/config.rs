//! Node configuration.
//!
//! Every protocol tunable lives in [`SwimConfig`]. Durations are kept in
//! milliseconds so the struct maps one-to-one onto a JSON file; use the accessor
//! methods to get [`Duration`]s.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SwimError};
use crate::membership::NodeAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwimConfig {
    /// Externally visible host of this node. When unset it is taken from a
    /// concrete `bind_ip`, or learnt from the destination field of the first
    /// JOIN / JOIN-ACK this node receives.
    pub host: Option<String>,

    pub bind_ip: IpAddr,

    /// UDP port to listen on. 0 lets the OS pick one.
    pub port: u16,

    /// Seed hosts contacted by the join protocol. Empty means this node starts
    /// a new cluster.
    pub seeds: Vec<NodeAddr>,

    /// How long to wait for the first JOIN-ACK before giving up.
    pub join_timeout_ms: u64,

    /// Period of the probe cycle. Lower values detect failures sooner at the
    /// price of more traffic.
    pub interval_ms: u64,

    /// How long to wait for the direct ACK of a PING before probing indirectly.
    /// Should sit around the 99th percentile RTT of the network.
    pub ping_timeout_ms: u64,

    /// How long to wait for a relayed ACK after sending PING-REQs.
    pub ping_req_timeout_ms: u64,

    /// Number of members asked to probe an unresponsive target on our behalf.
    pub ping_req_group_size: usize,

    /// Grace period a member stays SUSPECT before it is declared FAULTY.
    pub suspect_timeout_ms: u64,

    /// Maximum number of updates piggybacked on a single message.
    pub updates_max_size: usize,

    /// Multiplier of the per-update retransmission limit:
    ///
    ///   limit = ceil(dissemination_factor * log10(N + 1))
    ///
    /// so redundancy grows with the cluster size.
    pub dissemination_factor: f64,

    /// How long the uuid of an evicted update is remembered so late duplicates
    /// are dropped. Defaults to 10 x `suspect_timeout_ms`.
    pub expired_retention_ms: Option<u64>,

    /// How long a freshly FAULTY node suppresses stale ALIVE claims about it.
    /// Defaults to 2 x `suspect_timeout_ms`.
    pub faulty_retention_ms: Option<u64>,

    /// Period of the metadata push to one random member.
    pub metadata_interval_ms: u64,

    /// Period of the expiry-set cleanup. Defaults to `suspect_timeout_ms`.
    pub cleanup_interval_ms: Option<u64>,
}

impl Default for SwimConfig {
    /// Conservative LAN settings.
    fn default() -> Self {
        Self {
            host: None,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 11000,
            seeds: Vec::new(),
            join_timeout_ms: 5000,
            interval_ms: 100,
            ping_timeout_ms: 20,
            ping_req_timeout_ms: 60,
            ping_req_group_size: 3,
            suspect_timeout_ms: 1000,
            updates_max_size: 50,
            dissemination_factor: 15.0,
            expired_retention_ms: None,
            faulty_retention_ms: None,
            metadata_interval_ms: 1000,
            cleanup_interval_ms: None,
        }
    }
}

impl SwimConfig {
    /// Like `default`, tuned for a loopback environment: binds 127.0.0.1 on an
    /// OS-assigned port and gives up joining sooner.
    pub fn local() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            join_timeout_ms: 2000,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SwimConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_seeds(mut self, seeds: Vec<NodeAddr>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_suspect_timeout(mut self, timeout: Duration) -> Self {
        self.suspect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("interval_ms", self.interval_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("ping_req_timeout_ms", self.ping_req_timeout_ms),
            ("suspect_timeout_ms", self.suspect_timeout_ms),
            ("join_timeout_ms", self.join_timeout_ms),
            ("metadata_interval_ms", self.metadata_interval_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SwimError::InvalidConfig(format!("{} must be positive", name)));
            }
        }

        if self.updates_max_size == 0 {
            return Err(SwimError::InvalidConfig(
                "updates_max_size must be positive".to_string(),
            ));
        }

        if !self.dissemination_factor.is_finite() || self.dissemination_factor <= 0.0 {
            return Err(SwimError::InvalidConfig(format!(
                "dissemination_factor must be a positive number, got {}",
                self.dissemination_factor
            )));
        }

        if self.cleanup_interval_ms == Some(0) {
            return Err(SwimError::InvalidConfig(
                "cleanup_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn ping_req_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_req_timeout_ms)
    }

    pub fn suspect_timeout(&self) -> Duration {
        Duration::from_millis(self.suspect_timeout_ms)
    }

    pub fn expired_retention(&self) -> Duration {
        Duration::from_millis(
            self.expired_retention_ms
                .unwrap_or(self.suspect_timeout_ms.saturating_mul(10)),
        )
    }

    pub fn faulty_retention(&self) -> Duration {
        Duration::from_millis(
            self.faulty_retention_ms
                .unwrap_or(self.suspect_timeout_ms.saturating_mul(2)),
        )
    }

    pub fn metadata_interval(&self) -> Duration {
        Duration::from_millis(self.metadata_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.unwrap_or(self.suspect_timeout_ms))
    }

    /// The host we know ourselves by before any JOIN traffic: the configured
    /// host, else the bind IP when it is a concrete address.
    pub fn initial_host(&self) -> Option<String> {
        if let Some(host) = &self.host {
            return Some(host.clone());
        }
        if self.bind_ip.is_unspecified() {
            None
        } else {
            Some(self.bind_ip.to_string())
        }
    }
}
