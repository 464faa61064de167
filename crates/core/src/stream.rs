//! Publishable streams: per-path packetizer, parameter-set cache, and
//! key-frame compensation.
//!
//! A [`Stream`] is a named endpoint the publisher pushes Annex-B buffers to.
//! Each stream owns its [`H265Packetizer`], so all viewers of one path see
//! the same RTP sequence series, and caches the most recent VPS/SPS/PPS so
//! they can be replayed ahead of every key frame — a viewer that joined
//! after the parameter sets were first published can still start decoding at
//! the next IRAP.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::media::h265::{self, H265Packetizer, nal};

/// Default RTP payload type for dynamic video (RFC 3551 §6).
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// RTP clock rate for H.265 (RFC 7798 §7.1).
pub const H265_CLOCK_RATE: u32 = 90_000;

/// A named stream endpoint (e.g. `live`, `cam/front`).
pub struct Stream {
    path: String,
    state: Mutex<StreamState>,
}

/// Everything a `push_frame` call mutates, behind one lock so frame
/// processing is atomic per stream.
struct StreamState {
    packetizer: H265Packetizer,
    vps: Option<Vec<u8>>,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl Stream {
    pub fn new(path: &str, payload_type: u8) -> Self {
        Self {
            path: path.to_string(),
            state: Mutex::new(StreamState {
                packetizer: H265Packetizer::with_random_ssrc(payload_type),
                vps: None,
                sps: None,
                pps: None,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn payload_type(&self) -> u8 {
        self.state.lock().packetizer.payload_type()
    }

    /// Turn one Annex-B buffer into the ordered wire-ready packet list.
    ///
    /// - Parameter sets (VPS/SPS/PPS) replace the cached copies.
    /// - IRAP slices are preceded by the cached VPS, SPS, PPS (in that
    ///   order, marker off, same timestamp) unless the set was already
    ///   emitted from this same buffer.
    /// - Only the last packet of the last NAL keeps marker=1.
    pub fn packetize_frame(&self, data: &[u8], timestamp: u32) -> Vec<Vec<u8>> {
        let mut guard = self.state.lock();
        let st = &mut *guard;

        let nalus = h265::split_annex_b(data);
        let mut packets: Vec<Vec<u8>> = Vec::new();

        let mut emitted_vps = false;
        let mut emitted_sps = false;
        let mut emitted_pps = false;

        for nalu in &nalus {
            if nalu.len() < 2 {
                continue;
            }
            let nal_type = h265::nal_unit_type(nalu);

            match nal_type {
                nal::VPS => {
                    st.vps = Some(nalu.to_vec());
                    emitted_vps = true;
                }
                nal::SPS => {
                    st.sps = Some(nalu.to_vec());
                    emitted_sps = true;
                }
                nal::PPS => {
                    st.pps = Some(nalu.to_vec());
                    emitted_pps = true;
                }
                _ => {}
            }

            if h265::is_irap(nal_type) {
                if !emitted_vps {
                    if let Some(vps) = &st.vps {
                        packets.extend(st.packetizer.packetize_nal(vps, timestamp));
                        emitted_vps = true;
                    }
                }
                if !emitted_sps {
                    if let Some(sps) = &st.sps {
                        packets.extend(st.packetizer.packetize_nal(sps, timestamp));
                        emitted_sps = true;
                    }
                }
                if !emitted_pps {
                    if let Some(pps) = &st.pps {
                        packets.extend(st.packetizer.packetize_nal(pps, timestamp));
                        emitted_pps = true;
                    }
                }
                tracing::trace!(path = %self.path, nal_type, "key frame, parameter sets replayed");
            }

            packets.extend(st.packetizer.packetize_nal(nalu, timestamp));
        }

        // The packetizer marks the final packet of every NAL; only the last
        // packet of the whole buffer keeps it.
        if let Some((last, rest)) = packets.split_last_mut() {
            for pkt in rest {
                h265::clear_marker(pkt);
            }
            debug_assert_ne!(last[1] & 0x80, 0);
        }

        tracing::trace!(
            path = %self.path,
            nal_count = nalus.len(),
            rtp_packets = packets.len(),
            frame_bytes = data.len(),
            timestamp,
            "frame packetized"
        );

        packets
    }
}

/// Registry of publishable stream paths.
///
/// Re-adding an existing path is a no-op that preserves the original
/// packetizer and parameter-set cache, so sequence numbering survives a
/// redundant `add_stream`. Sessions already attached to a removed path stay
/// alive until their own teardown; only lookups stop resolving.
#[derive(Clone)]
pub struct StreamRegistry {
    streams: Arc<RwLock<HashMap<String, Arc<Stream>>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a path. Returns the (possibly pre-existing) stream.
    pub fn add(&self, path: &str, payload_type: u8) -> Arc<Stream> {
        let mut streams = self.streams.write();
        if let Some(existing) = streams.get(path) {
            tracing::warn!(path, "stream already exists");
            return existing.clone();
        }
        let stream = Arc::new(Stream::new(path, payload_type));
        streams.insert(path.to_string(), stream.clone());
        tracing::info!(path, "stream added");
        stream
    }

    /// Unregister a path. Idempotent.
    pub fn remove(&self, path: &str) -> bool {
        let removed = self.streams.write().remove(path).is_some();
        if removed {
            tracing::info!(path, "stream removed");
        }
        removed
    }

    pub fn get(&self, path: &str) -> Option<Arc<Stream>> {
        self.streams.read().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
