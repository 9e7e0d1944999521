use super::Transport;
use crate::error::{ConfigError, ExportError};
use crate::wire::{encode_emit_batch, Batch};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use socket2::SockRef;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::net::{lookup_host, UdpSocket};

/// Default datagram ceiling, matching what the Jaeger agent accepts
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65000;

/// Sends each batch as a single compact-encoded `emitBatch` datagram to a Jaeger agent.
///
/// A batch whose encoding exceeds `max_packet_size` is rejected whole; nothing is written.
#[derive(Debug)]
pub struct AgentTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    max_packet_size: usize,
    seq_id: AtomicI32,
}

impl AgentTransport {
    /// Resolves `endpoint` (`host:port`) and opens a connected UDP socket to it.
    ///
    /// A `max_packet_size` of 0 selects [`DEFAULT_MAX_PACKET_SIZE`]. The socket's send buffer
    /// is sized to hold one full datagram.
    pub async fn connect(endpoint: &str, max_packet_size: usize) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::AgentEndpoint {
            endpoint: endpoint.to_string(),
            source,
        };

        let peer = lookup_host(endpoint).await.map_err(io_err)?.next().ok_or_else(|| {
            io_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses resolved",
            ))
        })?;

        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let max_packet_size = if max_packet_size == 0 {
            DEFAULT_MAX_PACKET_SIZE
        } else {
            max_packet_size
        };

        let socket = UdpSocket::bind(local).await.map_err(io_err)?;
        SockRef::from(&socket)
            .set_send_buffer_size(max_packet_size)
            .map_err(io_err)?;
        socket.connect(peer).await.map_err(io_err)?;

        tracing::debug!(%peer, max_packet_size, "connected Jaeger agent transport");
        Ok(Self {
            socket,
            peer,
            max_packet_size,
            seq_id: AtomicI32::new(0),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

impl Transport for AgentTransport {
    async fn emit_batch(&self, batch: &Batch) -> Result<(), ExportError> {
        // a sequence id is only used up by a datagram that fits
        let payload = loop {
            let current = self.seq_id.load(Ordering::Relaxed);
            let seq_id = current.wrapping_add(1);
            let payload = encode_emit_batch(batch, seq_id)?;
            if payload.len() > self.max_packet_size {
                return Err(ExportError::BatchTooLarge {
                    size: payload.len(),
                    max: self.max_packet_size,
                    spans: batch.len(),
                });
            }
            if self
                .seq_id
                .compare_exchange(current, seq_id, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break payload;
            }
        };

        let written = self.socket.send(&payload).await?;
        if written != payload.len() {
            return Err(ExportError::ShortWrite {
                written,
                size: payload.len(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "agent"
    }
}
