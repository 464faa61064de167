//! # hevc-rtsp — RTSP server library for live H.265 streaming
//!
//! A Rust library for publishing live H.265 (HEVC) elementary streams over
//! the Real-Time Streaming Protocol. A publisher pushes Annex-B buffers for
//! a named path; viewers connect with any RTSP client, negotiate UDP or
//! interleaved TCP transport, and receive RTP packets carrying the stream.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation, interleaved framing |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP | Packet header format, SSRC generation, sequence/timestamp semantics |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Session description generation for DESCRIBE responses |
//! | [RFC 7798](https://tools.ietf.org/html/rfc7798) | H.265 RTP payload | NAL unit packetization, FU fragmentation |
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  Publisher (in-process producer)          │
//! ├───────────────────────────────────────────┤
//! │  Server         — public API, fan-out     │
//! │  StreamRegistry — paths, parameter cache  │
//! ├───────────────────────────────────────────┤
//! │  Protocol       — RTSP parsing, SDP       │
//! │  Session        — state machine, transport│
//! ├───────────────────────────────────────────┤
//! │  Transport      — TCP signaling, UDP data │
//! │  Media          — RTP header, packetizer  │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use hevc_rtsp::{Server, ServerConfig};
//!
//! let mut server = Server::new(ServerConfig::default());
//! server.start().unwrap();
//! server.add_stream("live");
//!
//! // Push Annex-B H.265 buffers — the server splits NAL units, replays
//! // parameter sets ahead of key frames, packetizes per RFC 7798, and
//! // delivers to every playing viewer.
//! // server.push_frame("live", &annex_b, timestamp).unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — High-level [`Server`] orchestrator, [`ServerConfig`], and
//!   the publisher facade.
//! - [`stream`] — [`Stream`](stream::Stream) (publishable path with
//!   parameter-set cache) and [`StreamRegistry`](stream::StreamRegistry).
//! - [`protocol`] — RTSP request/response parsing, method handling, SDP.
//! - [`session`] — viewer session state machine and negotiated transport.
//! - [`transport`] — TCP listener/connection loop, UDP port allocation.
//! - [`media`] — RTP header builder and the H.265 packetizer.
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;

pub use error::{Result, RtspError};
pub use media::H265Packetizer;
pub use server::{OverflowStrategy, Server, ServerConfig};
pub use session::{Session, SessionManager, SessionState};
pub use stream::{Stream, StreamRegistry};
