//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol — parsing
//! requests, building responses, routing methods, and generating SDP.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/live RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: sessions persist across requests (RFC 2326 §3).
//! - Different methods: OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN, ANNOUNCE,
//!   RECORD.
//! - Here the session id travels inside the URL (`streamid=<id>`, handed out
//!   by the DESCRIBE SDP) rather than being minted at SETUP — see
//!   [`request`].
//!
//! ## Supported methods
//!
//! | Method | Purpose |
//! |--------|---------|
//! | OPTIONS | Capability discovery |
//! | DESCRIBE | Create a session, return its SDP |
//! | SETUP | Negotiate transport (UDP port pair or interleaved) |
//! | PLAY | Start media delivery |
//! | TEARDOWN | Destroy the session |
//! | ANNOUNCE | Acknowledged, body discarded |
//! | RECORD | State advanced, no ingest |

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::MethodHandler;
pub use request::RtspRequest;
pub use response::RtspResponse;
