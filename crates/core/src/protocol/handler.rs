use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::request::{RtspRequest, extract_stream_path};
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::server::{OverflowStrategy, ServerConfig};
use crate::session::{MediaTransport, Session, SessionManager, SessionState, TransportSpec};
use crate::stream::StreamRegistry;
use crate::transport::udp::{DEFAULT_RTP_PORT_START, UdpPair};

/// Methods advertised in the OPTIONS response.
const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, ANNOUNCE, RECORD";

/// Handles RTSP method requests for a single TCP connection.
///
/// Tracks the session bound to this connection (set by SETUP) and every
/// session id created here, so the connection can clean them all up when it
/// drops. Admission control runs in DESCRIBE; OPTIONS and TEARDOWN are never
/// refused.
pub struct MethodHandler {
    session_manager: SessionManager,
    registry: StreamRegistry,
    config: Arc<ServerConfig>,
    client_addr: SocketAddr,
    /// Control socket; a clone is handed to each session at SETUP so the
    /// fan-out can deliver interleaved packets and force-close viewers.
    control: TcpStream,
    /// Session negotiated on this connection (SETUP onwards).
    bound: Option<Arc<Session>>,
    /// Session IDs created during this connection, for cleanup on disconnect.
    created_ids: Vec<String>,
}

impl MethodHandler {
    pub fn new(
        session_manager: SessionManager,
        registry: StreamRegistry,
        config: Arc<ServerConfig>,
        client_addr: SocketAddr,
        control: TcpStream,
    ) -> Self {
        MethodHandler {
            session_manager,
            registry,
            config,
            client_addr,
            control,
            bound: None,
            created_ids: Vec::new(),
        }
    }

    /// Session IDs owned by this connection (for cleanup on disconnect).
    pub fn created_session_ids(&self) -> &[String] {
        &self.created_ids
    }

    /// Dispatch one request. `Err` means a protocol violation — the caller
    /// closes the connection without responding.
    pub fn handle(&mut self, request: &RtspRequest) -> Result<RtspResponse> {
        let cseq = request.cseq().unwrap_or("0").to_string();

        match request.method.as_str() {
            "OPTIONS" => Ok(self.handle_options(&cseq)),
            "DESCRIBE" => Ok(self.handle_describe(&cseq, &request.url)),
            "SETUP" => self.handle_setup(&cseq, request),
            "PLAY" => Ok(self.handle_play(&cseq)),
            "TEARDOWN" => Ok(self.handle_teardown(&cseq)),
            "ANNOUNCE" => Ok(self.handle_announce(&cseq)),
            "RECORD" => Ok(self.handle_record(&cseq)),
            other => {
                tracing::warn!(method = %other, %cseq, "unsupported RTSP method");
                Ok(self.respond(RtspResponse::method_not_allowed(), &cseq))
            }
        }
    }

    /// Attach the headers every response carries.
    fn respond(&self, response: RtspResponse, cseq: &str) -> RtspResponse {
        response
            .add_header("CSeq", cseq)
            .add_header("Server", &self.config.server_name)
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        self.respond(RtspResponse::ok(), cseq)
            .add_header("Public", PUBLIC_METHODS)
    }

    fn handle_describe(&mut self, cseq: &str, url: &str) -> RtspResponse {
        tracing::debug!(%cseq, url, "DESCRIBE");

        let path = extract_stream_path(url);
        let Some(stream) = self.registry.get(path) else {
            tracing::warn!(path, "DESCRIBE for unknown stream");
            return self.respond(RtspResponse::not_found(), cseq);
        };

        if self.session_manager.count_for_path(path) >= self.config.max_clients_per_path {
            tracing::warn!(
                path,
                limit = self.config.max_clients_per_path,
                "path at viewer limit"
            );
            match self.config.overflow_strategy {
                OverflowStrategy::Reject => {
                    return self.respond(RtspResponse::not_found(), cseq);
                }
                OverflowStrategy::Ignore => {
                    tracing::info!(path, "viewer admitted past the limit");
                }
                OverflowStrategy::KickOldest => {
                    if let Some(oldest) = self.session_manager.oldest_for_path(path) {
                        tracing::info!(session_id = %oldest.id, "kicking oldest viewer");
                        oldest.mark_needs_close();
                    }
                }
            }
        }

        let session = Arc::new(Session::new(path));

        // Allocate the server socket pair now so the SDP advertises the real
        // RTP port. SETUP reuses the pair (or replaces it for interleaved).
        if self.config.udp_enable {
            match UdpPair::allocate(DEFAULT_RTP_PORT_START) {
                Ok(pair) => session.set_transport(MediaTransport::udp(pair)),
                Err(e) => {
                    tracing::error!(error = %e, "UDP transport allocation failed");
                    return self.respond(RtspResponse::internal_error(), cseq);
                }
            }
        }

        let sdp = sdp::generate_sdp(
            session.server_rtp_port(),
            stream.payload_type(),
            &session.id,
        );

        tracing::debug!(session_id = %session.id, path, "session created for DESCRIBE");
        self.created_ids.push(session.id.clone());
        self.session_manager.register(session);

        self.respond(RtspResponse::ok(), cseq)
            .add_header("Content-Base", &format!("{}/", url))
            .add_header("Content-Type", "application/sdp")
            .with_body(sdp)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> Result<RtspResponse> {
        let Some(session_id) = request.session_id() else {
            tracing::warn!(%cseq, url = %request.url, "SETUP without streamid in URL");
            return Ok(self.respond(RtspResponse::session_not_found(), cseq));
        };
        let Some(session) = self.session_manager.get(session_id) else {
            let err = RtspError::SessionNotFound(session_id.to_string());
            tracing::warn!(%err, "SETUP rejected");
            return Ok(self.respond(RtspResponse::session_not_found(), cseq));
        };

        let header = request.get_header("Transport").ok_or(RtspError::Parse {
            kind: ParseErrorKind::MissingTransport,
        })?;
        let spec = TransportSpec::parse(header);

        if spec.is_tcp && !self.config.tcp_enable {
            let err = RtspError::TransportUnsupported("interleaved TCP");
            tracing::warn!(session_id, %err, "SETUP rejected");
            return Ok(self.respond(RtspResponse::method_not_allowed(), cseq));
        }
        if !spec.is_tcp && !self.config.udp_enable {
            let err = RtspError::TransportUnsupported("UDP");
            tracing::warn!(session_id, %err, "SETUP rejected");
            return Ok(self.respond(RtspResponse::method_not_allowed(), cseq));
        }

        let transport_echo = if spec.is_tcp {
            session.setup_interleaved();
            "RTP/AVP/TCP;interleaved=0-1".to_string()
        } else {
            if spec.mode != "unicast" {
                tracing::warn!(session_id, mode = %spec.mode, "unsupported delivery mode");
                return Ok(self.respond(RtspResponse::method_not_allowed(), cseq));
            }
            let (server_rtp, server_rtcp) = match session.setup_udp(
                self.client_addr.ip(),
                spec.client_rtp_port,
                spec.client_rtcp_port,
            ) {
                Ok(ports) => ports,
                Err(e) => {
                    tracing::error!(session_id, error = %e, "UDP transport setup failed");
                    return Ok(self.respond(RtspResponse::internal_error(), cseq));
                }
            };
            format!(
                "RTP/AVP/UDP;unicast;client_port={}-{};server_port={}-{}",
                spec.client_rtp_port, spec.client_rtcp_port, server_rtp, server_rtcp
            )
        };

        session.attach_control(self.control.try_clone()?);
        session.set_state(SessionState::Ready);
        session.touch();

        tracing::info!(
            session_id = %session.id,
            path = %session.path,
            interleaved = spec.is_tcp,
            "session ready via SETUP"
        );

        let response = self
            .respond(RtspResponse::ok(), cseq)
            .add_header("Session", &session.session_header_value())
            .add_header("Transport", &transport_echo);
        self.bound = Some(session);
        Ok(response)
    }

    fn handle_play(&mut self, cseq: &str) -> RtspResponse {
        let Some(session) = &self.bound else {
            tracing::warn!(%cseq, "PLAY without a negotiated session");
            return self.respond(RtspResponse::session_not_found(), cseq);
        };

        session.set_state(SessionState::Playing);
        session.touch();
        tracing::info!(session_id = %session.id, "session playing");

        self.respond(RtspResponse::ok(), cseq)
            .add_header("Session", &session.id)
            .add_header("Range", "npt=0.000-")
    }

    fn handle_teardown(&mut self, cseq: &str) -> RtspResponse {
        if let Some(session) = self.bound.take() {
            session.close();
            self.session_manager.remove(&session.id);
            self.created_ids.retain(|id| id != &session.id);
            tracing::info!(session_id = %session.id, "session terminated via TEARDOWN");
        }
        self.respond(RtspResponse::ok(), cseq)
    }

    /// ANNOUNCE is acknowledged but its SDP body is not ingested; the
    /// connection loop has already drained it.
    fn handle_announce(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "ANNOUNCE acknowledged");
        self.respond(RtspResponse::ok(), cseq)
    }

    /// RECORD advances the session state but no client-to-server media
    /// ingest is performed.
    fn handle_record(&mut self, cseq: &str) -> RtspResponse {
        let Some(session) = &self.bound else {
            tracing::warn!(%cseq, "RECORD without a negotiated session");
            return self.respond(RtspResponse::session_not_found(), cseq);
        };

        session.set_state(SessionState::Recording);
        session.touch();
        tracing::info!(session_id = %session.id, "session recording (ack only)");

        self.respond(RtspResponse::ok(), cseq)
            .add_header("Session", &session.id)
    }
}
