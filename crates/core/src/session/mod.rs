//! RTSP session management.
//!
//! A session is the server-side state for one viewer. It is created during
//! DESCRIBE (so the SDP can hand out a `streamid` control attribute),
//! promoted by SETUP and PLAY, and destroyed by TEARDOWN, connection loss,
//! or the idle reaper. It tracks:
//!
//! - A 128-bit random session id (32 hex chars, returned in the `Session`
//!   header and embedded in SETUP URLs as `streamid=<id>`).
//! - The stream path it was created for, fixed for its whole life.
//! - The delivery state: Init → Ready → Playing / Recording → Closed.
//! - Negotiated transport: an owned UDP socket pair, or interleaved
//!   channels on the control connection.
//! - A `last_active` timestamp and a deferred-close flag.
//!
//! ## Lifecycle
//!
//! ```text
//! DESCRIBE       -> Init      (registered, SDP handed out)
//! SETUP          -> Ready     (transport bound)
//! PLAY           -> Playing   (media fan-out delivers packets)
//! RECORD         -> Recording (acknowledged only)
//! TEARDOWN       -> Closed    (removed)
//! TCP disconnect -> Closed    (removed via connection cleanup)
//! ```
//!
//! State changes come only from the owning connection's request loop or
//! from admission control (via the `needs_close` flag); the media fan-out
//! reads state but never mutates it.

pub mod transport;

use std::collections::HashMap;
use std::io::Write;
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;

use crate::error::Result;
use crate::transport::udp::{DEFAULT_RTP_PORT_START, UdpPair};
use crate::transport::tcp::interleaved_frame;
pub use transport::{MediaTransport, TransportSpec};

/// Session timeout advertised in the `Session` response header
/// (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Viewer delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created by DESCRIBE, transport not yet negotiated.
    Init,
    /// SETUP completed, transport bound.
    Ready,
    /// Media is being delivered.
    Playing,
    /// RECORD acknowledged (no ingest is performed).
    Recording,
    /// Torn down; kept only until removal from the table.
    Closed,
}

/// A single viewer session.
///
/// Interior mutability via `RwLock` allows shared references across the
/// connection thread, the publisher's fan-out, and the reaper.
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier (32-char hex string).
    pub id: String,
    /// Stream path this session was created for.
    pub path: String,
    state: RwLock<SessionState>,
    transport: RwLock<Option<MediaTransport>>,
    /// Clone of the control socket, shared with the connection's request
    /// loop. Whichever side acts last shuts it down.
    control: RwLock<Option<TcpStream>>,
    last_active: RwLock<Instant>,
    needs_close: AtomicBool,
}

impl Session {
    pub fn new(path: &str) -> Self {
        Session {
            id: generate_session_id(),
            path: path.to_string(),
            state: RwLock::new(SessionState::Init),
            transport: RwLock::new(None),
            control: RwLock::new(None),
            last_active: RwLock::new(Instant::now()),
            needs_close: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: SessionState) {
        tracing::debug!(
            session_id = %self.id,
            old_state = ?*self.state.read(),
            new_state = ?state,
            "state transition"
        );
        *self.state.write() = state;
    }

    pub fn is_playing(&self) -> bool {
        *self.state.read() == SessionState::Playing
    }

    /// Refresh the activity timestamp (called on SETUP, PLAY, RECORD).
    pub fn touch(&self) {
        *self.last_active.write() = Instant::now();
    }

    pub fn last_active(&self) -> Instant {
        *self.last_active.read()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.read().elapsed()
    }

    /// Flag this session for deferred close. The fan-out path shuts the
    /// control socket on the next cycle; the owning connection loop then
    /// notices the dead socket and cleans up.
    pub fn mark_needs_close(&self) {
        self.needs_close.store(true, Ordering::SeqCst);
    }

    pub fn needs_close(&self) -> bool {
        self.needs_close.load(Ordering::SeqCst)
    }

    /// Install a transport (DESCRIBE pre-allocates UDP here).
    pub fn set_transport(&self, transport: MediaTransport) {
        *self.transport.write() = Some(transport);
    }

    /// Server RTP port for SDP and Transport echoes (0 when none).
    pub fn server_rtp_port(&self) -> u16 {
        self.transport
            .read()
            .as_ref()
            .map(|t| t.server_rtp_port())
            .unwrap_or(0)
    }

    /// Negotiate UDP delivery: reuse the pair allocated at DESCRIBE when
    /// present, otherwise bind a fresh one, and record the client endpoint.
    /// Returns the `(server_rtp, server_rtcp)` ports for the Transport echo.
    pub fn setup_udp(
        &self,
        client_ip: IpAddr,
        client_rtp_port: u16,
        client_rtcp_port: u16,
    ) -> Result<(u16, u16)> {
        let mut slot = self.transport.write();
        let pair = match slot.take() {
            Some(MediaTransport::Udp { pair, .. }) => pair,
            _ => UdpPair::allocate(DEFAULT_RTP_PORT_START)?,
        };
        let server_ports = (pair.rtp_port, pair.rtcp_port);

        *slot = Some(MediaTransport::Udp {
            pair,
            client_addr: Some(SocketAddr::new(client_ip, client_rtp_port)),
            client_rtp_port,
            client_rtcp_port,
        });

        tracing::info!(
            session_id = %self.id,
            client_ip = %client_ip,
            client_rtp_port,
            server_rtp_port = server_ports.0,
            server_rtcp_port = server_ports.1,
            "UDP transport setup"
        );
        Ok(server_ports)
    }

    /// Negotiate interleaved delivery over the control connection. Any UDP
    /// pair allocated at DESCRIBE is dropped (and its ports released).
    pub fn setup_interleaved(&self) {
        *self.transport.write() = Some(MediaTransport::interleaved());
        tracing::info!(session_id = %self.id, "TCP interleaved transport setup");
    }

    /// Store a clone of the control socket (called during SETUP).
    pub fn attach_control(&self, stream: TcpStream) {
        *self.control.write() = Some(stream);
    }

    /// Write one wire-ready RTP packet to this session's transport.
    ///
    /// UDP goes out the session's own socket to the client RTP address;
    /// interleaved delivery frames the packet with `$ <channel> <len>` and
    /// writes it to the control socket. A short write is an error.
    pub fn send_packet(&self, packet: &[u8]) -> std::io::Result<()> {
        let transport = self.transport.read();
        match &*transport {
            Some(MediaTransport::Udp {
                pair,
                client_addr: Some(addr),
                ..
            }) => pair.send_rtp(packet, *addr),
            Some(MediaTransport::Interleaved { rtp_channel, .. }) => {
                let frame = interleaved_frame(*rtp_channel, packet);
                let control = self.control.read();
                match &*control {
                    Some(stream) => (&*stream).write_all(&frame),
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "no control socket",
                    )),
                }
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no negotiated transport",
            )),
        }
    }

    /// Shut the control socket so the owning connection loop exits.
    pub fn shutdown_control(&self) {
        if let Some(stream) = &*self.control.read() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Release transports and mark the session Closed. Idempotent.
    ///
    /// The control socket itself is left alone — after TEARDOWN the client
    /// may keep using the connection. Deferred closes (`needs_close`) shut
    /// it explicitly via [`shutdown_control`](Self::shutdown_control).
    pub fn close(&self) {
        *self.transport.write() = None;
        *self.control.write() = None;
        self.set_state(SessionState::Closed);
        tracing::debug!(session_id = %self.id, "session closed");
    }

    /// Format the `Session` response header value per RFC 2326 §12.37.
    ///
    /// Example: `"a3f9…;timeout=60"`
    pub fn session_header_value(&self) -> String {
        format!("{};timeout={}", self.id, DEFAULT_SESSION_TIMEOUT_SECS)
    }
}

/// 128-bit random hex session id.
fn generate_session_id() -> String {
    format!("{:032x}", rand::rng().random::<u128>())
}

/// Thread-safe registry of active sessions with authoritative per-path
/// admission counters.
///
/// The counters live under the same write lock as the table, so admission
/// decisions never race session registration or removal. Lookups happen on
/// every fan-out cycle, hence `parking_lot::RwLock` for fast reads.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    sessions: HashMap<String, Arc<Session>>,
    path_counts: HashMap<String, usize>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            inner: Arc::new(RwLock::new(Inner {
                sessions: HashMap::new(),
                path_counts: HashMap::new(),
            })),
        }
    }

    /// Register a session and bump its path's admission counter.
    pub fn register(&self, session: Arc<Session>) {
        let mut inner = self.inner.write();
        *inner.path_counts.entry(session.path.clone()).or_insert(0) += 1;
        inner.sessions.insert(session.id.clone(), session.clone());
        tracing::debug!(
            session_id = %session.id,
            path = %session.path,
            total_sessions = inner.sessions.len(),
            "session registered"
        );
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.read().sessions.get(id).cloned()
    }

    /// Remove a session and decrement its path's counter.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let mut inner = self.inner.write();
        let removed = inner.sessions.remove(id);
        if let Some(session) = &removed {
            if let Some(count) = inner.path_counts.get_mut(&session.path) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    inner.path_counts.remove(&session.path);
                }
            }
            tracing::debug!(
                session_id = %id,
                remaining = inner.sessions.len(),
                "session removed"
            );
        }
        removed
    }

    /// Remove multiple sessions at once (connection disconnect cleanup).
    pub fn remove_many(&self, ids: &[String]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.remove(id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Admission counter for a path.
    pub fn count_for_path(&self, path: &str) -> usize {
        self.inner
            .read()
            .path_counts
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// The session on `path` with the earliest activity timestamp
    /// (kick-oldest admission).
    pub fn oldest_for_path(&self, path: &str) -> Option<Arc<Session>> {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| s.path == path)
            .min_by_key(|s| s.last_active())
            .cloned()
    }

    /// Playing sessions whose path starts with the given stream path
    /// (media fan-out).
    pub fn playing_for_prefix(&self, prefix: &str) -> Vec<Arc<Session>> {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| s.path.starts_with(prefix) && s.is_playing())
            .cloned()
            .collect()
    }

    /// Sessions that never reached (or left) active delivery and have been
    /// idle past the timeout — DESCRIBE/SETUP leftovers the reaper collects.
    pub fn idle_candidates(&self, timeout: Duration) -> Vec<Arc<Session>> {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| {
                !matches!(s.state(), SessionState::Playing | SessionState::Recording)
                    && s.idle_for() > timeout
            })
            .cloned()
            .collect()
    }

    /// Close and drop every session (server shutdown). Control sockets are
    /// shut so blocked connection loops exit.
    pub fn close_all(&self) {
        let mut inner = self.inner.write();
        for session in inner.sessions.values() {
            session.shutdown_control();
            session.close();
        }
        inner.sessions.clear();
        inner.path_counts.clear();
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
