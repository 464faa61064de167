use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::session::{DEFAULT_SESSION_TIMEOUT_SECS, SessionManager};
use crate::stream::{DEFAULT_PAYLOAD_TYPE, StreamRegistry};
use crate::transport::tcp;

/// How often the reaper scans for idle sessions.
const REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// What DESCRIBE does when a path is already at its viewer limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Respond 404 Not Found to the new viewer.
    Reject,
    /// Flag the path's least-recently-active session for close and admit
    /// the new viewer.
    KickOldest,
    /// Admit the new viewer past the limit.
    Ignore,
}

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// RTSP control port the TCP listener binds.
    pub port: u16,
    /// Allow UDP media delivery.
    pub udp_enable: bool,
    /// Allow interleaved TCP media delivery.
    pub tcp_enable: bool,
    /// Log full request/response text at debug level.
    pub protocol_log: bool,
    /// Maximum concurrent sessions per stream path.
    pub max_clients_per_path: usize,
    /// Behavior when a path reaches its limit.
    pub overflow_strategy: OverflowStrategy,
    /// Value of the `Server:` header on every response.
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8554,
            udp_enable: true,
            tcp_enable: true,
            protocol_log: false,
            max_clients_per_path: 100,
            overflow_strategy: OverflowStrategy::Reject,
            server_name: "hevc-rtsp/0.1".to_string(),
        }
    }
}

/// High-level RTSP server orchestrator and publisher entry point.
///
/// Owns the stream registry and session table. Control connections are
/// handled by [`crate::transport::tcp`]; media packets fan out from the
/// publisher's thread to every playing session of a path.
///
/// # Usage
///
/// ```no_run
/// use hevc_rtsp::{Server, ServerConfig};
///
/// let mut server = Server::new(ServerConfig::default());
/// server.start().unwrap();
/// server.add_stream("live");
/// // Push H.265 Annex-B buffers with 90 kHz timestamps:
/// // server.push_frame("live", &annex_b, 3000).unwrap();
/// ```
pub struct Server {
    config: Arc<ServerConfig>,
    session_manager: SessionManager,
    registry: StreamRegistry,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            session_manager: SessionManager::new(),
            registry: StreamRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validate configuration, bind the control listener, and spawn the
    /// accept loop and session reaper.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        if self.config.port == 0 {
            return Err(RtspError::InvalidConfig(
                "port must be explicit (non-zero)".to_string(),
            ));
        }
        if !self.config.udp_enable && !self.config.tcp_enable {
            return Err(RtspError::InvalidConfig(
                "both TCP and UDP transports disabled".to_string(),
            ));
        }

        let listener = TcpListener::bind(("0.0.0.0", self.config.port))?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let session_manager = self.session_manager.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        thread::spawn(move || {
            tcp::accept_loop(listener, session_manager, registry, config, running);
        });

        self.spawn_reaper();

        tracing::info!(port = self.config.port, "RTSP server listening");
        Ok(())
    }

    /// Background thread collecting sessions that never reached active
    /// delivery (DESCRIBE/SETUP leftovers) once they pass the advertised
    /// timeout.
    fn spawn_reaper(&self) {
        let session_manager = self.session_manager.clone();
        let running = self.running.clone();
        let timeout = Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS);

        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(REAPER_INTERVAL);
                for session in session_manager.idle_candidates(timeout) {
                    tracing::info!(
                        session_id = %session.id,
                        path = %session.path,
                        "reaping idle session"
                    );
                    session.close();
                    session_manager.remove(&session.id);
                }
            }
            tracing::debug!("session reaper exited");
        });
    }

    /// Stop accepting connections and close every session.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.session_manager.close_all();
        tracing::info!("RTSP server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a publishable path. Re-adding an existing path preserves its
    /// packetizer and parameter-set cache.
    pub fn add_stream(&self, path: &str) {
        self.registry.add(path, DEFAULT_PAYLOAD_TYPE);
    }

    /// Unregister a path. Sessions already viewing it stay alive until their
    /// own teardown; subsequent DESCRIBEs and pushes fail.
    pub fn remove_stream(&self, path: &str) {
        self.registry.remove(path);
    }

    /// Push one Annex-B buffer (one or more NAL units) for a path.
    ///
    /// The buffer is split, parameter sets are cached, key frames are
    /// preceded by the cached VPS/SPS/PPS, and the resulting RTP packets are
    /// delivered synchronously to every playing session of the path. Send
    /// failures never fail the publisher call — the offending session is
    /// flagged and closed on this same fan-out cycle.
    pub fn push_frame(&self, path: &str, data: &[u8], timestamp: u32) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RtspError::NotStarted);
        }
        let stream = self
            .registry
            .get(path)
            .ok_or_else(|| RtspError::StreamNotFound(path.to_string()))?;

        let packets = stream.packetize_frame(data, timestamp);
        for packet in &packets {
            self.fanout_packet(path, packet);
        }
        Ok(())
    }

    /// Deliver one wire-ready packet to every playing session whose path
    /// starts with the stream path, in registration-independent order.
    fn fanout_packet(&self, path: &str, packet: &[u8]) {
        for session in self.session_manager.playing_for_prefix(path) {
            if let Err(e) = session.send_packet(packet) {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "failed to send RTP packet"
                );
                session.mark_needs_close();
            }
            if session.needs_close() {
                tracing::info!(session_id = %session.id, "closing flagged session");
                session.shutdown_control();
            }
        }
    }

    /// Registered stream paths.
    pub fn stream_paths(&self) -> Vec<String> {
        self.registry.paths()
    }

    /// Admission counter for one path.
    pub fn session_count(&self, path: &str) -> usize {
        self.session_manager.count_for_path(path)
    }

    /// Sessions across all paths.
    pub fn total_session_count(&self) -> usize {
        self.session_manager.total()
    }
}
