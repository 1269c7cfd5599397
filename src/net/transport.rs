use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;

use super::codec;
use super::message::Message;
use crate::error::{Result, SwimError};
use crate::membership::NodeAddr;

#[derive(Clone)]
pub struct Transport {
    socket: Arc<UdpSocket>,
    port: u16,
}

impl Transport {
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let addr = SocketAddr::new(ip, port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| SwimError::Bind { addr, source })?;
        let port = socket.local_addr()?.port();

        tracing::debug!("UDP socket bound to {}:{}", ip, port);

        Ok(Self {
            socket: Arc::new(socket),
            port,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.port
    }

    pub async fn send(&self, to: &NodeAddr, bytes: &[u8]) -> Result<()> {
        self.socket.send_to(bytes, (to.host.as_str(), to.port)).await?;
        Ok(())
    }

    /// Waits for the next well-formed message. Datagrams that fail to decode
    /// are logged and dropped.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(NodeAddr, Message)> {
        loop {
            let (len, src) = self.socket.recv_from(buf).await?;
            let sender = NodeAddr::from(src);

            match codec::decode(&buf[..len]) {
                Ok(message) => return Ok((sender, message)),
                Err(e) => tracing::warn!("Failed to decode datagram from {}: {}", sender, e),
            }
        }
    }
}
