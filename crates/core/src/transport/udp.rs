use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use crate::error::{Result, RtspError};

/// First port probed when allocating session RTP ports.
pub const DEFAULT_RTP_PORT_START: u16 = 30000;

/// How many consecutive ports to probe before giving up.
const PORT_PROBE_WINDOW: u16 = 100;

/// Bind a UDP socket on the first available port at or after `start`.
///
/// Probes up to 100 consecutive ports and returns the bound socket together
/// with its port — the socket is kept rather than closed and re-bound, so a
/// concurrent allocator cannot steal the port between probe and use.
pub fn bind_udp_port_from(start: u16) -> Result<(u16, UdpSocket)> {
    let end = start.saturating_add(PORT_PROBE_WINDOW);
    for port in start..end {
        match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(socket) => {
                tracing::trace!(port, "UDP port bound");
                return Ok((port, socket));
            }
            Err(_) => continue,
        }
    }
    tracing::warn!(start, "UDP port probe window exhausted");
    Err(RtspError::PortRangeExhausted { start })
}

/// A session's server-side RTP/RTCP socket pair.
///
/// Both sockets are owned here and close when the pair is dropped. The RTCP
/// socket is bound so the advertised `server_port` pair is real, but nothing
/// is ever read from or written to it (no RTCP processing).
#[derive(Debug)]
pub struct UdpPair {
    pub rtp_port: u16,
    pub rtcp_port: u16,
    rtp_socket: UdpSocket,
    _rtcp_socket: UdpSocket,
}

impl UdpPair {
    /// Bind an RTP socket at the first free port from `start` and an RTCP
    /// socket starting at the port after it.
    pub fn allocate(start: u16) -> Result<Self> {
        let (rtp_port, rtp_socket) = bind_udp_port_from(start)?;
        let (rtcp_port, rtcp_socket) = bind_udp_port_from(rtp_port.saturating_add(1))?;

        tracing::debug!(rtp_port, rtcp_port, "UDP transport allocated");

        Ok(Self {
            rtp_port,
            rtcp_port,
            rtp_socket,
            _rtcp_socket: rtcp_socket,
        })
    }

    /// Send one RTP packet to the client address. A short datagram write is
    /// reported as an error.
    pub fn send_rtp(&self, packet: &[u8], addr: SocketAddr) -> std::io::Result<()> {
        let written = self.rtp_socket.send_to(packet, addr)?;
        if written != packet.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short UDP write",
            ));
        }
        Ok(())
    }
}
