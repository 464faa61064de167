use std::net::SocketAddr;

use crate::transport::UdpPair;

/// Interleaved channel carrying RTP on the control socket (RFC 2326 §10.12).
pub const RTP_CHANNEL: u8 = 0;
/// Interleaved channel reserved for RTCP.
pub const RTCP_CHANNEL: u8 = 1;

/// Parsed client-side `Transport` header (RFC 2326 §12.39).
///
/// ## Wire format examples
///
/// ```text
/// Transport: RTP/AVP/UDP;unicast;client_port=5000-5001
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// ```
///
/// The lower protocol is TCP iff the value names `RTP/AVP/TCP`; everything
/// else is treated as UDP. The delivery mode defaults to `unicast`.
#[derive(Debug, Clone)]
pub struct TransportSpec {
    /// `unicast` or `multicast`.
    pub mode: String,
    /// Whether the client asked for TCP interleaved delivery.
    pub is_tcp: bool,
    /// Client's RTP receive port (0 when absent).
    pub client_rtp_port: u16,
    /// Client's RTCP receive port (0 when absent).
    pub client_rtcp_port: u16,
    /// Server RTP port echoed by a client (0 when absent).
    pub server_rtp_port: u16,
    /// Server RTCP port echoed by a client (0 when absent).
    pub server_rtcp_port: u16,
}

impl TransportSpec {
    /// Parse a `Transport` header value. Unknown parameters are ignored.
    pub fn parse(header: &str) -> Self {
        let is_tcp = header.contains("RTP/AVP/TCP");

        let mut mode = "unicast".to_string();
        let mut client_ports = (0, 0);
        let mut server_ports = (0, 0);

        for part in header.split(';').skip(1) {
            let part = part.trim();
            if part == "unicast" || part == "multicast" {
                mode = part.to_string();
            } else if let Some(ports) = part.strip_prefix("client_port=") {
                client_ports = parse_port_pair(ports);
            } else if let Some(ports) = part.strip_prefix("server_port=") {
                server_ports = parse_port_pair(ports);
            }
        }

        Self {
            mode,
            is_tcp,
            client_rtp_port: client_ports.0,
            client_rtcp_port: client_ports.1,
            server_rtp_port: server_ports.0,
            server_rtcp_port: server_ports.1,
        }
    }
}

/// `a-b` port pair; missing or unparsable halves come back as 0.
fn parse_port_pair(value: &str) -> (u16, u16) {
    let mut parts = value.split('-');
    let first = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let second = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (first, second)
}

/// Negotiated media delivery for one session.
///
/// UDP delivery owns the server socket pair; the client address is filled in
/// during SETUP (DESCRIBE allocates the pair early so the SDP can advertise
/// the real server RTP port). Interleaved delivery needs no sockets of its
/// own — packets ride the control connection.
#[derive(Debug)]
pub enum MediaTransport {
    Udp {
        pair: UdpPair,
        /// `client_ip:client_rtp_port`, known after SETUP.
        client_addr: Option<SocketAddr>,
        client_rtp_port: u16,
        client_rtcp_port: u16,
    },
    Interleaved {
        rtp_channel: u8,
        rtcp_channel: u8,
    },
}

impl MediaTransport {
    /// Fresh UDP transport with no client endpoint yet.
    pub fn udp(pair: UdpPair) -> Self {
        Self::Udp {
            pair,
            client_addr: None,
            client_rtp_port: 0,
            client_rtcp_port: 0,
        }
    }

    /// Interleaved transport on the standard channel pair.
    pub fn interleaved() -> Self {
        Self::Interleaved {
            rtp_channel: RTP_CHANNEL,
            rtcp_channel: RTCP_CHANNEL,
        }
    }

    /// Server RTP port advertised in SDP and Transport echoes (0 for
    /// interleaved delivery).
    pub fn server_rtp_port(&self) -> u16 {
        match self {
            Self::Udp { pair, .. } => pair.rtp_port,
            Self::Interleaved { .. } => 0,
        }
    }
}
