//! RTP media layer: generic header construction and H.265 packetization.
//!
//! [`rtp::RtpHeader`] owns the per-stream sequence/SSRC state and serializes
//! the 12-byte fixed header. [`h265::H265Packetizer`] composes it to turn
//! HEVC NAL units into wire-ready packets per RFC 7798.

pub mod h265;
pub mod rtp;

pub use h265::H265Packetizer;
pub use rtp::RtpHeader;
