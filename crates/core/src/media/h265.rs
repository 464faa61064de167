//! H.265 (HEVC) RTP packetizer — RFC 7798.
//!
//! Key differences from H.264 (RFC 6184):
//!
//! - **2-byte NAL unit header** (vs 1-byte in H.264).
//!   The NAL type is in bits 1..6 of the first byte.
//!
//! - **FU prefix is 3 bytes**: a 2-byte PayloadHdr with type 49 followed by
//!   a 1-byte FU header carrying S/E flags and the original 6-bit type.

use super::rtp::RtpHeader;

/// Default MTU budget per RTP packet, leaving room for IP/UDP headers.
pub const DEFAULT_MTU: usize = 1400;

/// Size of the RTP fixed header.
const RTP_HEADER_SIZE: usize = 12;

/// PayloadHdr (2 bytes) + FU header (1 byte), RFC 7798 §4.4.3.
const FU_PREFIX_SIZE: usize = 3;

/// NAL unit type used for fragmentation units (RFC 7798 §4.4.3).
const FU_NAL_TYPE: u8 = 49;

/// HEVC NAL unit type constants (ITU-T H.265 §7.4.2.2).
pub mod nal {
    /// Video parameter set.
    pub const VPS: u8 = 32;
    /// Sequence parameter set.
    pub const SPS: u8 = 33;
    /// Picture parameter set.
    pub const PPS: u8 = 34;
    /// First IRAP slice type (BLA_W_LP).
    pub const IRAP_FIRST: u8 = 19;
    /// Last IRAP slice type handled here (CRA_NUT).
    pub const IRAP_LAST: u8 = 21;
}

/// The 6-bit NAL unit type from the first byte of a 2-byte HEVC NAL header.
pub fn nal_unit_type(nalu: &[u8]) -> u8 {
    (nalu[0] >> 1) & 0x3F
}

/// Whether the type is a VPS, SPS, or PPS.
pub fn is_parameter_set(nal_type: u8) -> bool {
    matches!(nal_type, nal::VPS | nal::SPS | nal::PPS)
}

/// Whether the type is an IRAP (key-frame) slice.
pub fn is_irap(nal_type: u8) -> bool {
    (nal::IRAP_FIRST..=nal::IRAP_LAST).contains(&nal_type)
}

/// Clear the marker bit on an already-built RTP packet.
///
/// Packetization sets the marker on the final packet of every NAL; when that
/// NAL is not the last of its frame the caller turns it back off.
pub fn clear_marker(packet: &mut [u8]) {
    if packet.len() > 1 {
        packet[1] &= 0x7F;
    }
}

/// Split an Annex-B byte stream into NAL units.
///
/// Handles both 4-byte (`00 00 00 01`) and 3-byte (`00 00 01`) start codes.
/// Consecutive start codes produce empty units, which are skipped. Bytes
/// before the first start code and after the last one form units of their
/// own, so a buffer holding a bare NAL (no start code) passes through whole.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    if data.is_empty() {
        return units;
    }

    let mut start = 0usize;
    let mut i = 0usize;
    while i + 3 <= data.len() {
        if data[i] != 0 {
            i += 1;
            continue;
        }
        if data[i + 1] == 0 && data[i + 2] == 1 {
            if i > start {
                units.push(&data[start..i]);
            }
            start = i + 3;
            i += 3;
        } else if i + 4 <= data.len() && data[i + 1] == 0 && data[i + 2] == 0 && data[i + 3] == 1 {
            if i > start {
                units.push(&data[start..i]);
            }
            start = i + 4;
            i += 4;
        } else {
            i += 1;
        }
    }

    if start < data.len() {
        units.push(&data[start..]);
    }

    units
}

/// H.265 RTP packetizer (RFC 7798).
///
/// Supports single NAL unit mode and FU fragmentation. One instance per
/// stream path; its [`RtpHeader`] is the single source of sequence numbers
/// for every viewer of that path.
#[derive(Debug)]
pub struct H265Packetizer {
    header: RtpHeader,
    mtu: usize,
}

impl H265Packetizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            mtu: DEFAULT_MTU,
        }
    }

    /// Override the MTU budget (tests and constrained links).
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu;
    }

    pub fn payload_type(&self) -> u8 {
        self.header.pt
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    /// Sequence number the next emitted packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    /// Packetize a single NAL unit (2-byte header included, no start code)
    /// into one or more wire-ready RTP packets.
    ///
    /// NALs of fewer than 2 bytes produce nothing. The final packet carries
    /// marker=1; callers clear it when the NAL is not the last of its frame
    /// (see [`clear_marker`]).
    pub fn packetize_nal(&mut self, nalu: &[u8], timestamp: u32) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();

        if nalu.len() < 2 {
            return packets;
        }

        if nalu.len() <= self.mtu - RTP_HEADER_SIZE {
            let hdr = self.header.write(true, timestamp);
            let mut packet = Vec::with_capacity(RTP_HEADER_SIZE + nalu.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(nalu);
            packets.push(packet);
        } else {
            packets = self.fragment_nal(nalu, timestamp);
        }

        packets
    }

    /// FU fragmentation (RFC 7798 §4.4.3).
    ///
    /// The original 2-byte NAL header is stripped from the payload and
    /// reconstructed in the PayloadHdr: byte 1 keeps the F bit and the high
    /// LayerId bit while forcing type 49, byte 2 is copied verbatim. The FU
    /// header carries S on the first fragment, E on the last, and the
    /// original type in its low 6 bits.
    fn fragment_nal(&mut self, nalu: &[u8], timestamp: u32) -> Vec<Vec<u8>> {
        let nal_type = nal_unit_type(nalu);
        let payload_hdr_1 = (nalu[0] & 0x81) | (FU_NAL_TYPE << 1);
        let payload_hdr_2 = nalu[1];

        let payload = &nalu[2..];
        let max_fragment = self.mtu - RTP_HEADER_SIZE - FU_PREFIX_SIZE;

        let mut packets = Vec::new();
        let mut offset = 0usize;

        while offset < payload.len() {
            let remaining = payload.len() - offset;
            let chunk_size = max_fragment.min(remaining);
            let chunk = &payload[offset..offset + chunk_size];

            let first = offset == 0;
            let last = remaining == chunk_size;

            let mut fu_header = nal_type;
            if first {
                fu_header |= 0x80;
            }
            if last {
                fu_header |= 0x40;
            }

            let hdr = self.header.write(last, timestamp);
            let mut packet = Vec::with_capacity(RTP_HEADER_SIZE + FU_PREFIX_SIZE + chunk.len());
            packet.extend_from_slice(&hdr);
            packet.push(payload_hdr_1);
            packet.push(payload_hdr_2);
            packet.push(fu_header);
            packet.extend_from_slice(chunk);
            packets.push(packet);

            offset += chunk_size;
        }

        tracing::trace!(
            nal_type,
            nal_size = nalu.len(),
            fragments = packets.len(),
            "FU fragmented NAL unit"
        );

        packets
    }
}
