//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses:
//!
//! ```text
//! v=0                               ← protocol version
//! o=- 0 0 IN IP4 0.0.0.0           ← origin
//! s=H265 Video Stream               ← session name
//! c=IN IP4 0.0.0.0                  ← connection address
//! t=0 0                             ← timing (live stream)
//! m=video <port> RTP/AVP <pt>       ← media description
//! a=rtpmap:<pt> H265/90000          ← codec/clock rate (RFC 7798 §7.1)
//! a=control:streamid=<session-id>   ← SETUP control URL suffix
//! ```
//!
//! The control attribute is how a client's SETUP request identifies the
//! session created at DESCRIBE time — the id travels in the URL, not the
//! `Session` header.

use crate::stream::H265_CLOCK_RATE;

/// Generate an SDP session description for one viewer session.
///
/// `server_rtp_port` is 0 when UDP delivery is disabled (the port is then
/// negotiated as interleaved channels during SETUP).
pub fn generate_sdp(server_rtp_port: u16, payload_type: u8, session_id: &str) -> String {
    let sdp = [
        "v=0".to_string(),
        "o=- 0 0 IN IP4 0.0.0.0".to_string(),
        "s=H265 Video Stream".to_string(),
        "c=IN IP4 0.0.0.0".to_string(),
        "t=0 0".to_string(),
        format!("m=video {} RTP/AVP {}", server_rtp_port, payload_type),
        format!("a=rtpmap:{} H265/{}", payload_type, H265_CLOCK_RATE),
        format!("a=control:streamid={}", session_id),
    ];

    tracing::debug!(session_id, server_rtp_port, "SDP generated");

    format!("{}\r\n", sdp.join("\r\n"))
}
